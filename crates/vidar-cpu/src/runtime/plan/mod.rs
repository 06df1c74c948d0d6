use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use vidar_ir::{
    graph::{NodeId, VidarGraph},
    ir::{VidarAggOp, VidarBinOp, VidarOp, VidarShape, VidarUnOp},
};
use vidar_runtime::{
    exec_gen_err,
    generic::{
        array::VidarBuffer,
        compiler::{VidarPlanCompilationError, VidarPlanCompiler, VidarPlatformPlan},
        device::{VidarDevice, VidarDeviceManager},
        runtime::{PlanCacheKey, VidarExecutionError, VidarRuntime},
    },
    platforms::VidarPlatform,
};

use crate::{
    array::VidarCpuArray,
    cpu_platform_device::VidarCpuDevice,
    kernels::{elementwise, matmul, reduce, reshape},
    runtime::{VidarCpuRuntime, error::CpuError},
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CpuKernel {
    // index into the plan's input buffers
    Load(usize),
    // index into the plan's constants
    Fill(usize),
    Seq(i64, i64),
    Unary(VidarUnOp),
    Binary(VidarBinOp),
    MatMul,
    // t(A) %*% B, reading A directly
    MatMulTn,
    Transpose,
    Agg(VidarAggOp),
    Cbind,
    Slice {
        rows: (usize, usize),
        cols: (usize, usize),
    },
    Table,
    ReplaceNaN(f64),
    Diag,
}

#[derive(Debug, Clone)]
pub(crate) struct CpuStep {
    pub(crate) kernel: CpuKernel,
    pub(crate) inputs: Vec<usize>,
    pub(crate) input_shapes: Vec<VidarShape>,
    pub(crate) out: usize,
    pub(crate) shape: VidarShape,
    // slots whose last reader is this step
    pub(crate) frees: Vec<usize>,
}

/// A linear schedule over the slots of a graph. Each slot holds the value of
/// one graph node and is released right after its last reader ran.
#[derive(Debug, Clone)]
pub struct CpuPlan {
    pub(crate) steps: Vec<CpuStep>,
    pub(crate) outputs: Vec<(usize, VidarShape)>,
    pub(crate) num_inputs: usize,
    pub(crate) num_params: usize,
    pub(crate) num_slots: usize,
}

type Slot = Option<Arc<Vec<f64>>>;

fn read(slots: &[Slot], idx: usize) -> Result<&[f64], CpuError> {
    slots[idx]
        .as_deref()
        .map(|v| v.as_slice())
        .ok_or(CpuError::FreedSlot(idx))
}

impl CpuPlan {
    pub(crate) fn run(
        &self,
        inputs: &[Arc<Vec<f64>>],
        params: &[f64],
    ) -> Result<Vec<(VidarShape, Arc<Vec<f64>>)>, CpuError> {
        let mut slots: Vec<Slot> = vec![None; self.num_slots];

        for step in &self.steps {
            let value = Self::run_step(step, &slots, inputs, params)?;
            slots[step.out] = Some(value);
            for idx in &step.frees {
                slots[*idx] = None;
            }
        }

        self.outputs
            .iter()
            .map(|(slot, shape)| {
                slots[*slot]
                    .clone()
                    .map(|data| (*shape, data))
                    .ok_or(CpuError::FreedSlot(*slot))
            })
            .collect()
    }

    fn run_step(
        step: &CpuStep,
        slots: &[Slot],
        inputs: &[Arc<Vec<f64>>],
        params: &[f64],
    ) -> Result<Arc<Vec<f64>>, CpuError> {
        let arg = |i: usize| read(slots, step.inputs[i]);
        let arg_shape = |i: usize| step.input_shapes[i];

        let data = match &step.kernel {
            CpuKernel::Load(idx) => {
                let data = inputs
                    .get(*idx)
                    .ok_or_else(|| CpuError::Generic(format!("missing plan input `{idx}`")))?;
                if data.len() != step.shape.len() {
                    return Err(CpuError::Generic(format!(
                        "plan input `{idx}` holds {} values, expected a `{}` matrix",
                        data.len(),
                        step.shape
                    )));
                }
                return Ok(data.clone());
            }
            CpuKernel::Fill(idx) => {
                let value = params
                    .get(*idx)
                    .ok_or_else(|| CpuError::Generic(format!("missing plan constant `{idx}`")))?;
                vec![*value; step.shape.len()]
            }
            CpuKernel::Seq(from, to) => reshape::seq(*from, *to),
            CpuKernel::Unary(op) => elementwise::unary(*op, arg(0)?),
            CpuKernel::ReplaceNaN(value) => elementwise::replace_nan(arg(0)?, *value),
            CpuKernel::Binary(op) => elementwise::binary(
                *op,
                arg(0)?,
                arg_shape(0),
                arg(1)?,
                arg_shape(1),
                step.shape,
            ),
            CpuKernel::MatMul => matmul::matmul(arg(0)?, arg_shape(0), arg(1)?, arg_shape(1)),
            CpuKernel::MatMulTn => {
                matmul::matmul_tn(arg(0)?, arg_shape(0), arg(1)?, arg_shape(1))
            }
            CpuKernel::Transpose => reshape::transpose(arg(0)?, arg_shape(0)),
            CpuKernel::Agg(op) => reduce::aggregate(*op, arg(0)?, arg_shape(0)),
            CpuKernel::Cbind => reshape::cbind(arg(0)?, arg_shape(0), arg(1)?, arg_shape(1)),
            CpuKernel::Slice { rows, cols } => reshape::slice(arg(0)?, arg_shape(0), *rows, *cols),
            CpuKernel::Table => reshape::table(arg(0)?, arg(1)?, step.shape)?,
            CpuKernel::Diag => reshape::diag(arg(0)?),
        };

        Ok(Arc::new(data))
    }
}

impl VidarPlatformPlan for CpuPlan {
    fn plan(&self) -> &dyn std::any::Any {
        self
    }

    fn platform(&self) -> VidarPlatform {
        VidarPlatform::Cpu
    }

    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_params(&self) -> usize {
        self.num_params
    }
}

pub struct VidarCpuPlanCompiler {
    compiled: Arc<AtomicUsize>,
}

impl VidarCpuPlanCompiler {
    pub(crate) fn compile(
        graph: &VidarGraph,
        outputs: &[NodeId],
    ) -> Result<CpuPlan, VidarPlanCompilationError> {
        if !graph.is_verified() {
            return Err(VidarPlanCompilationError::UnverifiedGraph);
        }

        let n = graph.len();
        let mut consumers = vec![0usize; n];
        for node in &graph.nodes {
            for input in &node.inputs {
                consumers[*input as usize] += 1;
            }
        }

        let mut is_output = vec![false; n];
        for output in outputs {
            let idx = *output as usize;
            if idx >= n {
                return Err(VidarPlanCompilationError::Generic(format!(
                    "output `{output}` is not a node of the graph"
                )));
            }
            is_output[idx] = true;
        }

        // transposes that only feed the left side of a matmul are never materialized
        let mut fused = vec![false; n];
        for node in &graph.nodes {
            if node.op == VidarOp::MatMul {
                let lhs = node.inputs[0] as usize;
                if graph.nodes[lhs].op == VidarOp::Transpose && consumers[lhs] == 1 && !is_output[lhs]
                {
                    fused[lhs] = true;
                }
            }
        }

        let mut steps: Vec<CpuStep> = Vec::with_capacity(n);
        let mut step_of: Vec<Option<usize>> = vec![None; n];
        let mut last_use: Vec<Option<usize>> = vec![None; n];
        let mut num_inputs = 0;
        let mut num_params = 0;

        for (idx, node) in graph.nodes.iter().enumerate() {
            if fused[idx] {
                continue;
            }
            let inputs = node.inputs.iter().map(|i| *i as usize).collect::<Vec<_>>();

            let (kernel, inputs) = match &node.op {
                VidarOp::Input { .. } => {
                    num_inputs += 1;
                    (CpuKernel::Load(num_inputs - 1), vec![])
                }
                VidarOp::Fill { .. } => {
                    num_params += 1;
                    (CpuKernel::Fill(num_params - 1), vec![])
                }
                VidarOp::Seq { from, to } => (CpuKernel::Seq(*from, *to), vec![]),
                VidarOp::Unary(op) => (CpuKernel::Unary(*op), inputs),
                VidarOp::Binary(op) => (CpuKernel::Binary(*op), inputs),
                VidarOp::MatMul if fused[inputs[0]] => {
                    let source = graph.nodes[inputs[0]].inputs[0] as usize;
                    (CpuKernel::MatMulTn, vec![source, inputs[1]])
                }
                VidarOp::MatMul => (CpuKernel::MatMul, inputs),
                VidarOp::Transpose => (CpuKernel::Transpose, inputs),
                VidarOp::Agg(op) => (CpuKernel::Agg(*op), inputs),
                VidarOp::Cbind => (CpuKernel::Cbind, inputs),
                VidarOp::Slice { rows, cols } => (
                    CpuKernel::Slice {
                        rows: *rows,
                        cols: *cols,
                    },
                    inputs,
                ),
                VidarOp::Table { .. } => (CpuKernel::Table, inputs),
                VidarOp::ReplaceNaN { value } => {
                    (CpuKernel::ReplaceNaN(f64::from_bits(*value)), inputs)
                }
                VidarOp::Diag => (CpuKernel::Diag, inputs),
            };

            let step_idx = steps.len();
            for input in &inputs {
                last_use[*input] = Some(step_idx);
            }
            step_of[idx] = Some(step_idx);

            steps.push(CpuStep {
                input_shapes: inputs.iter().map(|i| graph.nodes[*i].shape).collect(),
                kernel,
                inputs,
                out: idx,
                shape: node.shape,
                frees: vec![],
            });
        }

        for slot in 0..n {
            if is_output[slot] {
                continue;
            }
            // unread values go right after they are produced
            if let Some(step) = last_use[slot].or(step_of[slot]) {
                steps[step].frees.push(slot);
            }
        }

        Ok(CpuPlan {
            steps,
            outputs: outputs
                .iter()
                .map(|o| (*o as usize, graph.nodes[*o as usize].shape))
                .collect(),
            num_inputs,
            num_params,
            num_slots: n,
        })
    }
}

impl VidarPlanCompiler for VidarCpuPlanCompiler {
    fn compile_plan(
        &mut self,
        graph: &VidarGraph,
        outputs: &[NodeId],
    ) -> Result<Arc<dyn VidarPlatformPlan>, VidarPlanCompilationError> {
        let plan = Self::compile(graph, outputs)?;
        self.compiled.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(plan))
    }
}

impl VidarRuntime for VidarCpuRuntime {
    fn platform(&self) -> VidarPlatform {
        VidarPlatform::Cpu
    }

    fn new_plan_compiler(&self) -> Box<dyn VidarPlanCompiler> {
        Box::new(VidarCpuPlanCompiler {
            compiled: self.compiled_plans.clone(),
        })
    }

    fn execute_plan(
        &self,
        device: &(dyn VidarDevice + Send + Sync),
        plan: Arc<dyn VidarPlatformPlan>,
        inputs: &[VidarBuffer],
        params: &[f64],
    ) -> Result<Vec<VidarBuffer>, VidarExecutionError> {
        let cpu_device = if VidarPlatform::Cpu == device.platform() {
            let binding = device.as_platform_device();
            match binding.downcast_ref::<VidarCpuDevice>() {
                Some(d) => Arc::new(d.clone()),
                None => return Err(CpuError::DeviceDowncast.into()),
            }
        } else {
            return Err(exec_gen_err!(
                "`{:?}` is an invalid platform device for the Vidar CPU backend",
                device.platform()
            ));
        };

        let cpu_plan = plan
            .plan()
            .downcast_ref::<CpuPlan>()
            .ok_or(VidarExecutionError::InappropriatePlan)?;

        let storages = inputs
            .iter()
            .map(VidarCpuArray::storage)
            .collect::<Result<Vec<_>, _>>()?;

        let results = cpu_device.install(|| cpu_plan.run(&storages, params))?;

        Ok(results
            .into_iter()
            .map(|(shape, data)| {
                let arr: VidarBuffer =
                    Arc::new(VidarCpuArray::from_data(cpu_device.clone(), shape, data));
                arr
            })
            .collect())
    }

    fn get_plan(
        &self,
        key: &PlanCacheKey,
    ) -> Result<Option<Arc<dyn VidarPlatformPlan>>, VidarExecutionError> {
        Ok(self.plans.lock().get(key).cloned())
    }

    fn insert_plan(
        &self,
        key: PlanCacheKey,
        plan: Arc<dyn VidarPlatformPlan>,
    ) -> Result<(), VidarExecutionError> {
        self.plans.lock().insert(key, plan);
        Ok(())
    }
}

impl VidarDeviceManager for VidarCpuRuntime {
    fn get_device(&self, idx: usize) -> Option<&(dyn VidarDevice + Send + Sync)> {
        self.platform_devices
            .devices
            .get(idx)
            .map(|d| d as &(dyn VidarDevice + Send + Sync))
    }

    fn num_devices(&self) -> usize {
        self.platform_devices.devices.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use vidar_runtime::generic::{array::VidarArrayFactory, runtime::ExecuteSettings};

    use super::*;
    use crate::array::VIDAR_CPU_ARR_FACTORY;

    fn runtime() -> VidarCpuRuntime {
        VidarCpuRuntime::init_err(Some(2)).unwrap()
    }

    #[test]
    fn transposed_matmul_is_fused_and_freed() {
        let mut g = VidarGraph::new();
        let shape = VidarShape::new(4, 2);
        let x = g.push(VidarOp::Input { array: 0, shape }, vec![]).unwrap();
        let xt = g.push(VidarOp::Transpose, vec![x]).unwrap();
        let xtx = g.push(VidarOp::MatMul, vec![xt, x]).unwrap();

        let plan = VidarCpuPlanCompiler::compile(&g, &[xtx]).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].kernel, CpuKernel::MatMulTn);
        assert_eq!(plan.steps[1].frees, vec![x as usize]);
        assert_eq!(plan.num_inputs, 1);
    }

    #[test]
    fn executes_and_caches_plans() {
        let rt = runtime();
        let device = rt.get_device(0).unwrap();
        let shape = VidarShape::new(3, 2);

        let build = |array| {
            let mut g = VidarGraph::new();
            let x = g.push(VidarOp::Input { array, shape }, vec![]).unwrap();
            let s = g.push(VidarOp::Agg(VidarAggOp::ColSums), vec![x]).unwrap();
            (g, s)
        };

        let mut arrays = HashMap::new();
        for (id, offset) in [(1u64, 0.0), (2u64, 10.0)] {
            let buffer = VIDAR_CPU_ARR_FACTORY
                .create_from_iter_device(device, shape, (0..6).map(|v| v as f64 + offset))
                .unwrap();
            arrays.insert(id, buffer);
        }

        let (g1, s1) = build(1);
        let out = rt
            .execute_graph(device, &g1, &[s1], &arrays, ExecuteSettings::default())
            .unwrap();
        assert_eq!(out[0].to_vec(), vec![6.0, 9.0]);

        let (g2, s2) = build(2);
        let out = rt
            .execute_graph(device, &g2, &[s2], &arrays, ExecuteSettings::default())
            .unwrap();
        assert_eq!(out[0].to_vec(), vec![36.0, 39.0]);

        assert_eq!(rt.compiled_plans(), 1);
        assert_eq!(rt.cached_plans(), 1);
    }

    #[test]
    fn constants_are_plan_parameters() {
        let rt = runtime();
        let device = rt.get_device(0).unwrap();

        let build = |value| {
            let mut g = VidarGraph::new();
            let a = g.push(VidarOp::Seq { from: 1, to: 3 }, vec![]).unwrap();
            let c = g.push(VidarOp::fill(value, VidarShape::SCALAR), vec![]).unwrap();
            let m = g.push(VidarOp::Binary(VidarBinOp::Mul), vec![a, c]).unwrap();
            (g, m)
        };

        for (value, expected) in [(2.0, vec![2.0, 4.0, 6.0]), (-0.5, vec![-0.5, -1.0, -1.5])] {
            let (g, m) = build(value);
            let out = rt
                .execute_graph(device, &g, &[m], &HashMap::new(), ExecuteSettings::default())
                .unwrap();
            assert_eq!(out[0].to_vec(), expected);
        }

        assert_eq!(rt.compiled_plans(), 1);
        assert_eq!(rt.cached_plans(), 1);
    }

    #[test]
    fn input_shapes_must_match_their_nodes() {
        let rt = runtime();
        let device = rt.get_device(0).unwrap();
        let mut g = VidarGraph::new();
        let x = g
            .push(
                VidarOp::Input {
                    array: 3,
                    shape: VidarShape::new(3, 2),
                },
                vec![],
            )
            .unwrap();
        let t = g.push(VidarOp::Transpose, vec![x]).unwrap();

        let buffer = VIDAR_CPU_ARR_FACTORY
            .create_from_iter_device(device, VidarShape::new(2, 3), (0..6).map(|v| v as f64))
            .unwrap();
        let arrays = HashMap::from([(3u64, buffer)]);

        let err = rt
            .execute_graph(device, &g, &[t], &arrays, ExecuteSettings::default())
            .err().unwrap();
        assert!(matches!(
            err,
            VidarExecutionError::InputShapeMismatch(3, ..)
        ));
    }

    #[test]
    fn missing_inputs_are_reported() {
        let rt = runtime();
        let device = rt.get_device(0).unwrap();
        let mut g = VidarGraph::new();
        let x = g
            .push(
                VidarOp::Input {
                    array: 9,
                    shape: VidarShape::SCALAR,
                },
                vec![],
            )
            .unwrap();

        let err = rt
            .execute_graph(device, &g, &[x], &HashMap::new(), ExecuteSettings::default())
            .err().unwrap();
        assert!(matches!(err, VidarExecutionError::MissingInput(9)));
    }

    #[test]
    fn table_errors_surface_from_execution() {
        let rt = runtime();
        let device = rt.get_device(0).unwrap();
        let mut g = VidarGraph::new();
        let rows = g.push(VidarOp::Seq { from: 1, to: 2 }, vec![]).unwrap();
        let cols = g.push(VidarOp::Seq { from: 4, to: 5 }, vec![]).unwrap();
        let t = g
            .push(VidarOp::Table { rows: 2, cols: 2 }, vec![rows, cols])
            .unwrap();

        let err = rt
            .execute_graph(device, &g, &[t], &HashMap::new(), ExecuteSettings::default())
            .err().unwrap();
        assert!(matches!(err, VidarExecutionError::Generic(_)));
    }
}
