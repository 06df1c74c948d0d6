use std::{any::Any, sync::Arc};

use thiserror::Error;
use vidar_ir::{graph::NodeId, graph::VidarGraph};

use crate::platforms::VidarPlatform;

pub trait VidarPlanCompiler {
    // `graph` has already been through the graph passes
    fn compile_plan(
        &mut self,
        graph: &VidarGraph,
        outputs: &[NodeId],
    ) -> Result<Arc<dyn VidarPlatformPlan>, VidarPlanCompilationError>;
}

#[derive(Error, Debug, Clone)]
pub enum VidarPlanCompilationError {
    #[error("Plan compilation error: {0}")]
    Generic(String),

    #[error("Plan compilation requires a verified graph")]
    UnverifiedGraph,
}

pub trait VidarPlatformPlan: Send + Sync {
    fn plan(&self) -> &dyn Any; // whatever the backend executes

    fn platform(&self) -> VidarPlatform;

    // number of host arrays the plan expects, in `Input` node order
    fn num_inputs(&self) -> usize;

    // number of constants the plan expects, in `Fill` node order
    fn num_params(&self) -> usize;
}
