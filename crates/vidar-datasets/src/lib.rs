pub mod error;
pub mod manager;
pub mod synthetic;

pub use error::DatasetError;
pub use manager::{ByteMatrix, DataManager};
pub use synthetic::{Blobs, synthetic_blobs};
