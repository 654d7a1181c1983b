use std::fmt;

use serde::ser::{SerializeStruct, Serializer};

/// Kind of step recorded in an execution trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TraceEventKind {
    LaunchKernel,
    Barrier,
    WaitOnNotification,
    ActivateNotification,
}

impl fmt::Display for TraceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEventKind::LaunchKernel => write!(f, "LaunchKernel"),
            TraceEventKind::Barrier => write!(f, "Barrier"),
            TraceEventKind::WaitOnNotification => write!(f, "WaitOnNotification"),
            TraceEventKind::ActivateNotification => write!(f, "ActivateNotification"),
        }
    }
}

/// Execution trace record for a single step.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    pub stream: usize,
    pub step_index: usize,
    pub pc: usize,
    /// Node name for kernel launches, empty otherwise.
    pub node_name: String,
    pub micros: u64,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pc={} stream={} step={} [{}] {} ({}us)",
            self.pc, self.stream, self.step_index, self.kind, self.node_name, self.micros
        )
    }
}

impl serde::Serialize for TraceEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("TraceEvent", 6)?;
        state.serialize_field("pc", &self.pc)?;
        state.serialize_field("stream", &self.stream)?;
        state.serialize_field("step_index", &self.step_index)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("node", &self.node_name)?;
        state.serialize_field("micros", &self.micros)?;
        state.end()
    }
}
