use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::device::DeviceStream;
use crate::logging::Logger;
use crate::plan::NodeDef;
use crate::tensor::{DType, SharedTensor, TensorValue};

use super::ExecutionFrame;

/// What a kernel sees while it runs: its node, the frame values it reads and
/// writes, the device stream of its logic stream and the run logger.
pub struct KernelContext<'a> {
    node: &'a NodeDef,
    frame: &'a mut ExecutionFrame,
    stream: Option<&'a Arc<dyn DeviceStream>>,
    logger: &'a Logger,
}

impl<'a> KernelContext<'a> {
    pub(crate) fn new(
        node: &'a NodeDef,
        frame: &'a mut ExecutionFrame,
        stream: Option<&'a Arc<dyn DeviceStream>>,
        logger: &'a Logger,
    ) -> Self {
        Self {
            node,
            frame,
            stream,
            logger,
        }
    }

    pub fn node(&self) -> &NodeDef {
        self.node
    }

    pub fn num_inputs(&self) -> usize {
        self.node.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.node.outputs.len()
    }

    pub fn input(&self, i: usize) -> Result<SharedTensor> {
        let idx = *self
            .node
            .inputs
            .get(i)
            .ok_or_else(|| anyhow!("node {} has no input {}", self.node.name, i))?;
        self.frame.value(idx)
    }

    /// Snapshot of input `i`.
    pub fn input_value(&self, i: usize) -> Result<TensorValue> {
        let tensor = self.input(i)?;
        let value = tensor.lock().expect("tensor mutex poisoned").clone();
        Ok(value)
    }

    /// Storage for output `i`, allocated through the frame.
    pub fn output(&mut self, i: usize, dtype: DType, shape: &[usize]) -> Result<SharedTensor> {
        let idx = *self
            .node
            .outputs
            .get(i)
            .ok_or_else(|| anyhow!("node {} has no output {}", self.node.name, i))?;
        self.frame.allocate_output(idx, dtype, shape)
    }

    /// Write `value` into output `i`.
    pub fn set_output(&mut self, i: usize, value: TensorValue) -> Result<()> {
        let tensor = self.output(i, value.dtype(), value.shape())?;
        let mut guard = tensor.lock().expect("tensor mutex poisoned");
        *guard = value;
        Ok(())
    }

    pub fn stream(&self) -> Option<&Arc<dyn DeviceStream>> {
        self.stream
    }

    pub fn logger(&self) -> &Logger {
        self.logger
    }
}

/// An instantiated operator.
pub trait Kernel: Send + Sync {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> Result<()>;
}

struct FnKernel<F>(F);

impl<F> Kernel for FnKernel<F>
where
    F: Fn(&mut KernelContext<'_>) -> Result<()> + Send + Sync,
{
    fn compute(&self, ctx: &mut KernelContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

/// Source of kernels for nodes. `None` means "not mine, ask the next one".
pub trait KernelRegistry: Send + Sync {
    fn create_kernel(&self, node: &NodeDef) -> Option<Arc<dyn Kernel>>;
}

/// Kernels keyed by op name.
#[derive(Default)]
pub struct OpKernelRegistry {
    kernels: HashMap<String, Arc<dyn Kernel>>,
}

impl OpKernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, op: &str, kernel: Arc<dyn Kernel>) -> &mut Self {
        self.kernels.insert(op.to_string(), kernel);
        self
    }

    pub fn register_fn<F>(&mut self, op: &str, f: F) -> &mut Self
    where
        F: Fn(&mut KernelContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.register(op, Arc::new(FnKernel(f)))
    }

    pub fn contains(&self, op: &str) -> bool {
        self.kernels.contains_key(op)
    }
}

impl KernelRegistry for OpKernelRegistry {
    fn create_kernel(&self, node: &NodeDef) -> Option<Arc<dyn Kernel>> {
        self.kernels.get(&node.op).cloned()
    }
}

/// Ordered set of kernel registries. The most recently registered registry
/// is searched first.
#[derive(Default, Clone)]
pub struct KernelRegistryManager {
    registries: Vec<Arc<dyn KernelRegistry>>,
}

impl KernelRegistryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_kernel_registry(&mut self, registry: Arc<dyn KernelRegistry>) {
        self.registries.insert(0, registry);
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    pub fn create_kernel(&self, node: &NodeDef) -> Result<Arc<dyn Kernel>> {
        self.registries
            .iter()
            .find_map(|registry| registry.create_kernel(node))
            .ok_or_else(|| anyhow!("no kernel registered for op {} (node {})", node.op, node.name))
    }
}
