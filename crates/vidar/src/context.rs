use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use vidar_cpu::{VIDAR_CPU_RUNTIME, VidarCpuRuntime, array::VIDAR_CPU_ARR_FACTORY};
use vidar_ir::{
    graph::{NodeId, VidarGraph},
    io::{VidarHostArray, VidarIRData},
    ir::{VidarOp, VidarShape},
    util::{error::ShapeError, shape::infer_shape},
};
use vidar_runtime::{
    generic::{
        array::{VidarArrayFactory, VidarBuffer},
        device::{DeviceError, VidarDevice, VidarDeviceManager},
        runtime::{ExecuteSettings, VidarRuntime},
    },
    platforms::VidarPlatform,
};

use crate::{
    config::VidarConfig,
    dense::{ComputeResult, DenseMatrix},
    error::VidarError,
    matrix::{Matrix, lower::Lowered},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub arrays_ingested: usize,
    pub bytes_ingested: usize,
    pub executions: usize,
}

pub(crate) struct ContextInner {
    runtime: Arc<VidarCpuRuntime>,
    device: usize,
    settings: ExecuteSettings,
    next_array: AtomicU64,
    stats: Mutex<SessionStats>,
}

impl ContextInner {
    fn device(&self) -> Result<&(dyn VidarDevice + Send + Sync), VidarError> {
        self.runtime.get_device(self.device).ok_or_else(|| {
            DeviceError::OutOfRange(self.device, self.runtime.num_devices()).into()
        })
    }

    pub(crate) fn next_array_id(&self) -> u64 {
        self.next_array.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn create_buffer<I>(&self, shape: VidarShape, iter: I) -> Result<VidarBuffer, VidarError>
    where
        I: IntoIterator<Item = f64>,
    {
        let device = self.device()?;
        let buffer = match device.platform() {
            VidarPlatform::Cpu => VIDAR_CPU_ARR_FACTORY.create_from_iter_device(device, shape, iter)?,
        };

        let mut stats = self.stats.lock();
        stats.arrays_ingested += 1;
        stats.bytes_ingested += buffer.size_bytes();

        Ok(buffer)
    }

    pub(crate) fn execute(
        &self,
        graph: &VidarGraph,
        outputs: &[NodeId],
        arrays: &HashMap<u64, VidarBuffer>,
    ) -> Result<Vec<VidarBuffer>, VidarError> {
        let device = self.device()?;
        let buffers = self
            .runtime
            .execute_graph(device, graph, outputs, arrays, self.settings)?;

        if buffers.len() != outputs.len() {
            return Err(VidarError::ResultCount(outputs.len(), buffers.len()));
        }

        self.stats.lock().executions += 1;
        Ok(buffers)
    }
}

/// A session on a compute backend.
///
/// Matrices created through a context hold a weak reference to it, so they
/// stop evaluating once the context is dropped. Host results
/// ([`DenseMatrix`]) are plain values and stay usable.
pub struct VidarContext {
    pub(crate) inner: Arc<ContextInner>,
}

impl VidarContext {
    pub fn new() -> Result<Self, VidarError> {
        Self::with_config(VidarConfig::default())
    }

    pub fn with_config(config: VidarConfig) -> Result<Self, VidarError> {
        let runtime = match config.threads {
            Some(threads) => Arc::new(VidarCpuRuntime::init_err(Some(threads))?),
            None => VIDAR_CPU_RUNTIME
                .as_ref()
                .cloned()
                .ok_or(DeviceError::NoDevice)?,
        };

        let device = match runtime.get_device(config.device) {
            Some(device) => device,
            None => {
                return Err(DeviceError::OutOfRange(config.device, runtime.num_devices()).into());
            }
        };
        log::debug!(
            "Opened Vidar session on `{}` (plan cache {})",
            device.device_name(),
            if config.plan_cache { "on" } else { "off" }
        );

        let settings = ExecuteSettings {
            use_plan_cache: config.plan_cache,
            ..Default::default()
        };

        Ok(Self {
            inner: Arc::new(ContextInner {
                runtime,
                device: config.device,
                settings,
                next_array: AtomicU64::new(0),
                stats: Mutex::new(SessionStats::default()),
            }),
        })
    }

    /// Runs `f` inside a fresh session that is closed when `f` returns,
    /// whether it succeeded or not.
    pub fn scope<R, E, F>(f: F) -> Result<R, E>
    where
        F: FnOnce(&VidarContext) -> Result<R, E>,
        E: From<VidarError>,
    {
        Self::scope_with(VidarConfig::default(), f)
    }

    pub fn scope_with<R, E, F>(config: VidarConfig, f: F) -> Result<R, E>
    where
        F: FnOnce(&VidarContext) -> Result<R, E>,
        E: From<VidarError>,
    {
        let ctx = Self::with_config(config)?;
        f(&ctx)
    }

    pub fn device_name(&self) -> Result<String, VidarError> {
        Ok(self.inner.device()?.device_name())
    }

    pub fn stats(&self) -> SessionStats {
        *self.inner.stats.lock()
    }

    pub fn compiled_plans(&self) -> usize {
        self.inner.runtime.compiled_plans()
    }

    fn input<I>(&self, shape: VidarShape, iter: I) -> Result<Matrix, VidarError>
    where
        I: IntoIterator<Item = f64>,
    {
        if shape.is_empty() {
            return Err(ShapeError::Empty("input").into());
        }
        let buffer = self.inner.create_buffer(shape, iter)?;
        Ok(Matrix::input(
            Arc::downgrade(&self.inner),
            self.inner.next_array_id(),
            buffer,
        ))
    }

    /// Ingests a row-major host matrix.
    pub fn from_slice(&self, data: &[f64], rows: usize, cols: usize) -> Result<Matrix, VidarError> {
        self.input(VidarShape::new(rows, cols), data.iter().copied())
    }

    pub fn from_vec(&self, data: Vec<f64>, rows: usize, cols: usize) -> Result<Matrix, VidarError> {
        self.input(VidarShape::new(rows, cols), data)
    }

    // raw pixels, one byte per value
    pub fn from_u8(&self, data: &[u8], rows: usize, cols: usize) -> Result<Matrix, VidarError> {
        self.input(
            VidarShape::new(rows, cols),
            data.iter().map(|v| f64::from(*v)),
        )
    }

    pub fn from_dense(&self, dense: &DenseMatrix) -> Result<Matrix, VidarError> {
        self.input(dense.shape(), dense.data().iter().copied())
    }

    pub fn fill(&self, value: f64, rows: usize, cols: usize) -> Result<Matrix, VidarError> {
        let shape = VidarShape::new(rows, cols);
        let op = VidarOp::fill(value, shape);
        infer_shape(&op, &[])?;
        Ok(Matrix::leaf(Arc::downgrade(&self.inner), op, shape))
    }

    pub fn scalar(&self, value: f64) -> Matrix {
        Matrix::leaf(
            Arc::downgrade(&self.inner),
            VidarOp::fill(value, VidarShape::SCALAR),
            VidarShape::SCALAR,
        )
    }

    /// Column vector `from, from + 1, ..., to`.
    pub fn seq(&self, from: i64, to: i64) -> Result<Matrix, VidarError> {
        let op = VidarOp::Seq { from, to };
        let shape = infer_shape(&op, &[])?;
        Ok(Matrix::leaf(Arc::downgrade(&self.inner), op, shape))
    }

    /// Evaluates several handles in one execution, sharing common
    /// subexpressions.
    pub fn compute_all(&self, outputs: &[&Matrix]) -> Result<Vec<ComputeResult>, VidarError> {
        for output in outputs {
            output.check_context(&self.inner)?;
        }
        Ok(crate::matrix::compute_many(outputs)?
            .into_iter()
            .map(ComputeResult::from)
            .collect())
    }

    /// Bundles the expressions behind `outputs`, together with the host
    /// copies of the arrays they read, into a serializable IR.
    pub fn export_ir(&self, outputs: &[&Matrix]) -> Result<VidarIRData, VidarError> {
        for output in outputs {
            output.check_context(&self.inner)?;
        }
        let lowered = Lowered::new(outputs)?;

        let arrays = lowered
            .arrays
            .iter()
            .map(|(id, buffer)| {
                (
                    *id,
                    VidarHostArray {
                        shape: buffer.shape(),
                        data: buffer.to_vec(),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        Ok(VidarIRData {
            graph: lowered.graph,
            outputs: lowered.outputs,
            arrays,
        })
    }

    /// Executes a (possibly deserialized) IR bundle in this session.
    pub fn execute_ir(&self, ir: &VidarIRData) -> Result<Vec<ComputeResult>, VidarError> {
        let mut arrays = HashMap::with_capacity(ir.arrays.len());
        for (id, host) in &ir.arrays {
            let buffer = self
                .inner
                .create_buffer(host.shape, host.data.iter().copied())?;
            arrays.insert(*id, buffer);
        }

        let buffers = self.inner.execute(&ir.graph, &ir.outputs, &arrays)?;
        Ok(buffers
            .into_iter()
            .map(|b| ComputeResult::from(DenseMatrix::new(b.shape(), b.to_vec())))
            .collect())
    }
}

impl Drop for VidarContext {
    fn drop(&mut self) {
        let stats = self.stats();
        log::debug!(
            "Closing Vidar session: {} execution(s), {} array(s) ingested ({} bytes)",
            stats.executions,
            stats.arrays_ingested,
            stats.bytes_ingested
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> VidarContext {
        VidarContext::with_config(VidarConfig::default().with_threads(2)).unwrap()
    }

    #[test]
    fn ingestion_validates_lengths() {
        let ctx = ctx();
        assert!(matches!(
            ctx.from_slice(&[1.0, 2.0, 3.0], 2, 2),
            Err(VidarError::Array(_))
        ));
        assert!(matches!(
            ctx.from_vec(vec![], 0, 3),
            Err(VidarError::Shape(ShapeError::Empty(_)))
        ));
        assert!(matches!(ctx.seq(3, 1), Err(VidarError::Shape(_))));

        let m = ctx.from_u8(&[0, 128, 255, 1], 2, 2).unwrap();
        assert_eq!(m.compute().unwrap().data(), &[0.0, 128.0, 255.0, 1.0]);
        assert_eq!(ctx.stats().arrays_ingested, 1);
    }

    #[test]
    fn handles_fail_after_the_session_closes() {
        let m = {
            let ctx = ctx();
            ctx.from_slice(&[1.0, 2.0], 1, 2).unwrap()
        };
        assert!(matches!(m.compute(), Err(VidarError::SessionClosed)));
    }

    #[test]
    fn scope_returns_host_values() {
        let dense = VidarContext::scope_with(VidarConfig::default().with_threads(1), |ctx| {
            let x = ctx.from_slice(&[1.0, 2.0, 3.0, 4.0], 2, 2)?;
            (&x * 2.0).compute()
        })
        .unwrap();
        assert_eq!(dense.data(), &[2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn device_out_of_range() {
        assert!(matches!(
            VidarContext::with_config(VidarConfig::default().with_threads(1).with_device(4)),
            Err(VidarError::Device(DeviceError::OutOfRange(4, 1)))
        ));
    }

    #[test]
    fn ir_bundle_round_trips_through_postcard() {
        let ctx = ctx();
        let x = ctx.from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2).unwrap();
        let y = x.t().matmul(&x).unwrap().row_sums();
        let expected = y.compute().unwrap();

        let ir = ctx.export_ir(&[&y]).unwrap();
        let mut bytes = vec![];
        VidarIRData::save(&ir, &mut bytes).unwrap();
        let loaded = VidarIRData::load(&mut bytes.as_slice()).unwrap();
        assert!(!loaded.graph.is_verified());

        let results = ctx.execute_ir(&loaded).unwrap();
        assert_eq!(results, vec![ComputeResult::Matrix(expected)]);
    }
}
