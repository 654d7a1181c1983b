//! Partial execution runtime: region resolution, execution contexts and the
//! resumable per-session state that ties them together.
mod context;
mod executor;
mod feeds_fetches;
mod frame;
mod kernel;
mod region;
mod state;
mod trace;

pub use context::ExecutionContext;
pub use executor::{execute_partial_graph, PartialRunOutcome};
pub(crate) use executor::run_region;
pub use feeds_fetches::{FeedsFetches, FeedsFetchesInfo};
pub use frame::{CustomAllocator, ExecutionFrame};
pub use kernel::{Kernel, KernelContext, KernelRegistry, KernelRegistryManager, OpKernelRegistry};
pub use region::ProgramRegion;
pub use state::PartialGraphExecutionState;
pub use trace::{TraceEvent, TraceEventKind};
