pub mod graph;
pub mod io;
pub mod ir;
pub mod passes;
pub mod util;

pub use graph::{NodeId, VidarGraph, VidarNode};
pub use ir::{VidarAggOp, VidarBinOp, VidarOp, VidarShape, VidarUnOp};
