use std::{
    collections::HashMap,
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
};

use thiserror::Error;
use vidar_ir::{
    graph::{NodeId, VidarGraph},
    ir::{VidarOp, VidarShape},
    passes::{GraphPassSettings, graph_pass},
    util::error::MultiPassError,
};

use crate::{
    generic::{
        array::{VidarArrayError, VidarBuffer},
        compiler::{VidarPlanCompilationError, VidarPlanCompiler, VidarPlatformPlan},
        device::VidarDevice,
    },
    platforms::VidarPlatform,
};

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct PlanCacheKey {
    graph_hash: u64,
    outputs_hash: u64,
}

impl PlanCacheKey {
    pub fn new(graph: &VidarGraph, outputs: &[NodeId]) -> Self {
        let mut s = DefaultHasher::new();
        outputs.hash(&mut s);
        let outputs_hash = s.finish();

        Self {
            graph_hash: graph.structural_hash(),
            outputs_hash,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecuteSettings {
    pub passes: GraphPassSettings,
    pub use_plan_cache: bool,
}

impl Default for ExecuteSettings {
    fn default() -> Self {
        Self {
            passes: GraphPassSettings::default(),
            use_plan_cache: true,
        }
    }
}

pub trait VidarRuntime {
    fn platform(&self) -> VidarPlatform;

    fn new_plan_compiler(&self) -> Box<dyn VidarPlanCompiler>;

    // `inputs` are ordered like the `Input` nodes of the compiled graph and
    // `params` like its `Fill` nodes
    fn execute_plan(
        &self,
        device: &(dyn VidarDevice + Send + Sync),
        plan: Arc<dyn VidarPlatformPlan>,
        inputs: &[VidarBuffer],
        params: &[f64],
    ) -> Result<Vec<VidarBuffer>, VidarExecutionError>;

    /// Runs the graph passes, then executes a cached or freshly compiled plan
    /// for `outputs`. `arrays` maps `Input` array ids to device buffers.
    fn execute_graph(
        &self,
        device: &(dyn VidarDevice + Send + Sync),
        graph: &VidarGraph,
        outputs: &[NodeId],
        arrays: &HashMap<u64, VidarBuffer>,
        settings: ExecuteSettings,
    ) -> Result<Vec<VidarBuffer>, VidarExecutionError> {
        let (graph, outputs) = graph_pass(graph, outputs, settings.passes)?;

        if !graph.is_verified() {
            return Err(VidarExecutionError::UnverifiedGraph);
        }

        let key = PlanCacheKey::new(&graph, &outputs);
        let cached = if settings.use_plan_cache {
            self.get_plan(&key)?
        } else {
            None
        };

        let plan = match cached {
            Some(plan) => {
                log::trace!("Using cached plan for {} nodes", graph.len());
                plan
            }
            None => {
                let mut compiler = self.new_plan_compiler();
                let plan = compiler.compile_plan(&graph, &outputs)?;
                log::debug!(
                    "Compiled a plan for {} nodes and {} output(s)",
                    graph.len(),
                    outputs.len()
                );
                if settings.use_plan_cache {
                    self.insert_plan(key, plan.clone())?;
                }
                plan
            }
        };

        let mut inputs = vec![];
        for node in &graph.nodes {
            if let VidarOp::Input { array, shape } = node.op {
                let buffer = arrays
                    .get(&array)
                    .ok_or(VidarExecutionError::MissingInput(array))?;
                if buffer.shape() != shape {
                    return Err(VidarExecutionError::InputShapeMismatch(
                        array,
                        shape,
                        buffer.shape(),
                    ));
                }
                inputs.push(buffer.clone());
            }
        }

        if inputs.len() != plan.num_inputs() {
            return Err(VidarExecutionError::InputCountMismatch(
                plan.num_inputs(),
                inputs.len(),
            ));
        }

        let params = graph.fill_values();
        if params.len() != plan.num_params() {
            return Err(VidarExecutionError::ParamCountMismatch(
                plan.num_params(),
                params.len(),
            ));
        }

        self.execute_plan(device, plan, &inputs, &params)
    }

    fn get_plan(
        &self,
        key: &PlanCacheKey,
    ) -> Result<Option<Arc<dyn VidarPlatformPlan>>, VidarExecutionError>;

    fn insert_plan(
        &self,
        key: PlanCacheKey,
        plan: Arc<dyn VidarPlatformPlan>,
    ) -> Result<(), VidarExecutionError>;
}

#[derive(Error, Debug)]
pub enum VidarExecutionError {
    #[error("Execution error: {0}")]
    Generic(String),

    #[error("Plan compilation error during execution:\n{0}")]
    PlanCompilation(#[from] VidarPlanCompilationError),

    #[error("Graph pass error during execution:\n{0}")]
    MultiPass(#[from] MultiPassError),

    #[error("Array error during execution: {0}")]
    Array(#[from] VidarArrayError),

    #[error("No buffer was supplied for input array `{0}`")]
    MissingInput(u64),

    #[error("The plan expects {0} input buffer(s), {1} were supplied")]
    InputCountMismatch(usize, usize),

    #[error("The plan expects {0} constant(s), the graph holds {1}")]
    ParamCountMismatch(usize, usize),

    #[error("Input array `{0}` is bound to a `{1}` node but holds a `{2}` matrix")]
    InputShapeMismatch(u64, VidarShape, VidarShape),

    #[error("Expected a plan that casts to this backend's plan type")]
    InappropriatePlan,

    #[error("Graph is unverified and not to be trusted")]
    UnverifiedGraph,
}

#[macro_export]
macro_rules! exec_gen_err {
    ($($arg:tt)*) => {
        $crate::generic::runtime::VidarExecutionError::Generic(format!($($arg)*))
    };
}
