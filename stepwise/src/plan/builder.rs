use anyhow::{anyhow, Result};

use crate::device::Device;
use crate::tensor::DType;

use super::{validate_plan, ExecutionPlan, LogicStream, NodeDef, Step, StepKind, ValueInfo};

/// Incremental plan assembly. Errors are deferred to [`PlanBuilder::build`].
#[derive(Debug, Default)]
pub struct PlanBuilder {
    plan: ExecutionPlan,
    error: Option<String>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a value slot and return its index.
    pub fn value(&mut self, name: &str, dtype: DType, shape: Option<&[usize]>) -> usize {
        self.plan.values.push(ValueInfo {
            name: name.to_string(),
            dtype,
            shape: shape.map(|dims| dims.to_vec()),
        });
        self.plan.values.len() - 1
    }

    /// Declare a node and return its index.
    pub fn node(&mut self, name: &str, op: &str, inputs: &[usize], outputs: &[usize]) -> usize {
        self.plan.nodes.push(NodeDef {
            name: name.to_string(),
            op: op.to_string(),
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        });
        self.plan.nodes.len() - 1
    }

    pub fn stream(&mut self, device: Device) -> usize {
        self.plan.streams.push(Some(LogicStream::new(device)));
        self.plan.streams.len() - 1
    }

    pub fn null_stream(&mut self) -> usize {
        self.plan.streams.push(None);
        self.plan.streams.len() - 1
    }

    pub fn barrier(&mut self) -> usize {
        self.plan.num_barriers += 1;
        self.plan.num_barriers - 1
    }

    pub fn notification(&mut self, owner: usize) -> usize {
        self.plan.notification_owners.push(owner);
        self.plan.notification_owners.len() - 1
    }

    pub fn step(&mut self, stream: usize, pc: usize, kind: StepKind) -> &mut Self {
        match self.plan.streams.get_mut(stream) {
            Some(Some(logic)) => logic.steps.push(Step { pc, kind }),
            _ => {
                self.error.get_or_insert_with(|| {
                    format!("step at pc {} targets missing or null stream {}", pc, stream)
                });
            }
        }
        self
    }

    pub fn launch(&mut self, stream: usize, pc: usize, node: usize) -> &mut Self {
        self.step(stream, pc, StepKind::LaunchKernel { node })
    }

    pub fn arrive(&mut self, stream: usize, pc: usize, barrier: usize) -> &mut Self {
        self.step(stream, pc, StepKind::Barrier { barrier })
    }

    pub fn activate(&mut self, stream: usize, pc: usize, notification: usize) -> &mut Self {
        self.step(stream, pc, StepKind::ActivateNotification { notification })
    }

    pub fn wait(&mut self, stream: usize, pc: usize, notification: usize) -> &mut Self {
        self.step(stream, pc, StepKind::WaitOnNotification { notification })
    }

    /// Finish and validate the plan.
    pub fn build(self) -> Result<ExecutionPlan> {
        if let Some(err) = self.error {
            return Err(anyhow!(err));
        }
        validate_plan(&self.plan)?;
        Ok(self.plan)
    }
}
