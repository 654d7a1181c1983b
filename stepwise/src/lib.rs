//! Resumable execution of precomputed multi-stream execution plans.
//!
//! A [`Session`] owns a validated [`ExecutionPlan`]. A
//! [`PartialGraphExecutionState`] runs that plan one program-counter range at
//! a time, keeping barrier and notification progress, device streams and
//! produced values alive between resumes.
pub mod logging;

mod config;
mod device;
mod plan;
mod runtime;
mod session;
mod tensor;

pub use config::SessionOptions;
pub use device::{
    CpuStream, CpuStreamFactory, Device, DeviceStream, DeviceStreamCollection, DeviceStreamPool,
    Notification, StreamFactory, StreamHandle,
};
pub use logging::{ConsoleSink, LogRecord, LogSink, Logger, MemorySink, Severity};
pub use plan::{
    validate_plan, ExecutionPlan, LogicStream, NodeDef, PlanBuilder, PlanDeserialize,
    PlanSerialize, Step, StepKind, ValueInfo, BARRIER_ARRIVALS,
};
pub use runtime::{
    execute_partial_graph, CustomAllocator, ExecutionContext, ExecutionFrame, FeedsFetches,
    FeedsFetchesInfo, Kernel, KernelContext, KernelRegistry, KernelRegistryManager,
    OpKernelRegistry, PartialGraphExecutionState, PartialRunOutcome, ProgramRegion, TraceEvent,
    TraceEventKind,
};
pub use session::{Session, SessionState};
pub use tensor::{numel, DType, SharedTensor, TensorData, TensorElement, TensorValue};
