//! Session: owner of the finalized plan, initializers, stream pool and
//! kernels, and the provider partial states draw their resources from.
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use uuid::Uuid;

use crate::config::SessionOptions;
use crate::device::{DeviceStreamCollection, DeviceStreamPool, StreamFactory};
use crate::logging::{ConsoleSink, Logger};
use crate::plan::{validate_plan, ExecutionPlan};
use crate::runtime::{
    execute_partial_graph, run_region, ExecutionContext, FeedsFetches, FeedsFetchesInfo,
    KernelRegistry, KernelRegistryManager, PartialGraphExecutionState, PartialRunOutcome,
    ProgramRegion,
};
use crate::tensor::{SharedTensor, TensorValue};

/// What the partial-execution core needs from its session.
pub trait SessionState {
    fn execution_plan(&self) -> &Arc<ExecutionPlan>;

    fn acquire_device_stream_collection(&self) -> Result<DeviceStreamCollection>;

    /// Constant tensors keyed by value index.
    fn initialized_tensors(&self) -> &HashMap<usize, SharedTensor>;
}

pub struct Session {
    id: Uuid,
    options: SessionOptions,
    plan: Arc<ExecutionPlan>,
    initializers: HashMap<usize, SharedTensor>,
    stream_pool: DeviceStreamPool,
    kernels: KernelRegistryManager,
    logger: Logger,
}

impl Session {
    /// Validate `plan` and build a session around it.
    pub fn new(plan: ExecutionPlan, options: SessionOptions) -> Result<Self> {
        validate_plan(&plan).context("execution plan rejected")?;
        let logger = Logger::new(&options.log_id, options.log_severity, Arc::new(ConsoleSink));
        let stream_pool = DeviceStreamPool::new(options.stream_pool_capacity);
        Ok(Self {
            id: Uuid::new_v4(),
            options,
            plan: Arc::new(plan),
            initializers: HashMap::new(),
            stream_pool,
            kernels: KernelRegistryManager::new(),
            logger,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    pub fn stream_pool(&self) -> &DeviceStreamPool {
        &self.stream_pool
    }

    pub fn kernels(&self) -> &KernelRegistryManager {
        &self.kernels
    }

    /// Register a constant for the named value.
    pub fn add_initializer(&mut self, name: &str, value: TensorValue) -> Result<()> {
        let idx = self
            .plan
            .value_index(name)
            .ok_or_else(|| anyhow!("unknown initializer name: {}", name))?;
        let info = &self.plan.values[idx];
        if info.dtype != value.dtype() {
            return Err(anyhow!(
                "initializer {} has dtype {:?}, declared {:?}",
                name,
                value.dtype(),
                info.dtype
            ));
        }
        if let Some(shape) = &info.shape {
            if shape.as_slice() != value.shape() {
                return Err(anyhow!(
                    "initializer {} has shape {:?}, declared {:?}",
                    name,
                    value.shape(),
                    shape
                ));
            }
        }
        self.initializers.insert(idx, value.into_shared());
        Ok(())
    }

    pub fn register_stream_factory(&mut self, factory: Arc<dyn StreamFactory>) {
        self.stream_pool.register_factory(factory);
    }

    pub fn register_kernel_registry(&mut self, registry: Arc<dyn KernelRegistry>) {
        self.kernels.register_kernel_registry(registry);
    }

    pub fn feeds_fetches_info(&self, feeds: &[&str], fetches: &[&str]) -> Result<FeedsFetchesInfo> {
        FeedsFetchesInfo::new(&self.plan, feeds, fetches)
    }

    /// Run the steps of `[start, end)` on `state`, continuing where the
    /// previous resume of the same state stopped.
    pub fn partial_run(
        &self,
        state: &mut PartialGraphExecutionState,
        start: usize,
        end: usize,
        io: &mut FeedsFetches,
        logger: Option<&Logger>,
    ) -> Result<PartialRunOutcome> {
        state.set_program_counter_range(start, end)?;
        execute_partial_graph(
            self,
            state,
            io,
            &self.kernels,
            logger.unwrap_or(&self.logger),
            self.options.trace_enabled,
        )
    }

    /// Run the whole plan in one call.
    ///
    /// The stream collection comes from the pool and goes back to it once the
    /// run has released every reference to it.
    pub fn run(&self, io: &mut FeedsFetches) -> Result<PartialRunOutcome> {
        let collection = Arc::new(self.stream_pool.acquire(&self.plan)?);
        let region = ProgramRegion::resolve(&self.plan, 0, self.plan.end_pc());
        let outcome = {
            let mut ctx = ExecutionContext::new(
                self,
                self.plan.valid_stream_count(),
                &self.plan.notification_owners,
                io,
                self.plan.num_barriers,
                &self.logger,
                Arc::clone(&collection),
                true,
            )?;
            let outcome = run_region(
                &self.plan,
                &region,
                &mut ctx,
                &self.kernels,
                self.options.trace_enabled,
            )
            .context("full run failed")?;
            io.fetches = ctx.frame().fetch_values();
            outcome
        };
        match Arc::try_unwrap(collection) {
            Ok(collection) => {
                self.stream_pool.recycle(collection);
            }
            Err(_) => crate::warning!("stream collection still referenced after run, not recycled"),
        }
        Ok(outcome)
    }
}

impl SessionState for Session {
    fn execution_plan(&self) -> &Arc<ExecutionPlan> {
        &self.plan
    }

    fn acquire_device_stream_collection(&self) -> Result<DeviceStreamCollection> {
        self.stream_pool.acquire(&self.plan)
    }

    fn initialized_tensors(&self) -> &HashMap<usize, SharedTensor> {
        &self.initializers
    }
}
