//! Precomputed multi-stream execution plans.
//!
//! A plan is produced upstream and is immutable once built. Every stream
//! holds steps tagged with a program counter; counters never decrease within
//! a stream, which is what lets region resolution scan each stream once.
mod builder;
mod json;
mod types;
mod validation;

pub use builder::PlanBuilder;
pub use json::{PlanDeserialize, PlanSerialize};
pub use types::{ExecutionPlan, LogicStream, NodeDef, Step, StepKind, ValueInfo};
pub use validation::{validate_plan, BARRIER_ARRIVALS};
