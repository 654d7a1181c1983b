use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::tensor::DType;

/// Declared metadata of one value slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub name: String,
    pub dtype: DType,
    /// Static shape, `None` when only known at run time.
    #[serde(default)]
    pub shape: Option<Vec<usize>>,
}

/// A graph node as seen by the scheduler: an op name plus value indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub op: String,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

/// Work performed by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    LaunchKernel { node: usize },
    Barrier { barrier: usize },
    WaitOnNotification { notification: usize },
    ActivateNotification { notification: usize },
}

/// One unit of scheduled work within a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub pc: usize,
    #[serde(flatten)]
    pub kind: StepKind,
}

/// One parallel lane of steps, bound to a device queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicStream {
    pub device: Device,
    pub steps: Vec<Step>,
}

impl LogicStream {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            steps: Vec::new(),
        }
    }

    /// Program counters of the steps, in step order.
    pub fn step_pc(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps.iter().map(|step| step.pc)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Finalized execution plan shared read-only by every run of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub values: Vec<ValueInfo>,
    pub nodes: Vec<NodeDef>,
    /// `None` entries are null streams and never execute.
    pub streams: Vec<Option<LogicStream>>,
    pub num_barriers: usize,
    /// Owning stream index for each notification id.
    pub notification_owners: Vec<usize>,
}

impl ExecutionPlan {
    /// Total number of steps across all streams.
    pub fn num_steps(&self) -> usize {
        self.streams
            .iter()
            .flatten()
            .map(|stream| stream.steps.len())
            .sum()
    }

    /// Largest program counter assigned to any step.
    pub fn max_pc(&self) -> Option<usize> {
        self.streams
            .iter()
            .flatten()
            .filter_map(|stream| stream.steps.last().map(|step| step.pc))
            .max()
    }

    /// Exclusive end counter covering every step of the plan.
    pub fn end_pc(&self) -> usize {
        self.max_pc().map_or(0, |pc| pc.saturating_add(1))
    }

    /// Streams that are non-null and have at least one step.
    pub fn valid_stream_count(&self) -> usize {
        self.streams
            .iter()
            .flatten()
            .filter(|stream| !stream.is_empty())
            .count()
    }

    pub fn value_index(&self, name: &str) -> Option<usize> {
        self.values.iter().position(|info| info.name == name)
    }

    pub fn num_notifications(&self) -> usize {
        self.notification_owners.len()
    }
}
