use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};

use crate::logging::Logger;
use crate::plan::{ExecutionPlan, Step, StepKind};
use crate::session::SessionState;

use super::{
    ExecutionContext, FeedsFetches, Kernel, KernelRegistryManager, PartialGraphExecutionState,
    ProgramRegion, TraceEvent, TraceEventKind,
};

/// Result of driving one region.
#[derive(Debug, Clone, Default)]
pub struct PartialRunOutcome {
    pub steps_executed: usize,
    /// True once every valid stream has executed its last step.
    pub completed: bool,
    pub events: Vec<TraceEvent>,
}

enum StepOutcome {
    Advance,
    Blocked,
}

/// Resume execution over the state's current program-counter range.
///
/// Resolves (or reuses) the region, binds the device streams and the
/// execution context, runs every step of the region, and writes the fetch
/// values back into `io`. Any failure is returned as one error for the whole
/// resume.
pub fn execute_partial_graph(
    session: &dyn SessionState,
    state: &mut PartialGraphExecutionState,
    io: &mut FeedsFetches,
    kernels: &KernelRegistryManager,
    logger: &Logger,
    trace_enabled: bool,
) -> Result<PartialRunOutcome> {
    let (start, end) = (state.program_counter_start(), state.program_counter_end());
    run_partial(session, state, io, kernels, logger, trace_enabled)
        .with_context(|| format!("partial run over pc [{}, {}) failed", start, end))
}

fn run_partial(
    session: &dyn SessionState,
    state: &mut PartialGraphExecutionState,
    io: &mut FeedsFetches,
    kernels: &KernelRegistryManager,
    logger: &Logger,
    trace_enabled: bool,
) -> Result<PartialRunOutcome> {
    let plan = Arc::clone(session.execution_plan());
    let region = state.program_regions(&plan).clone();
    state.device_stream_collection(session)?;
    let ctx = state.execution_context(session, io, logger)?;
    let outcome = run_region(&plan, &region, ctx, kernels, trace_enabled)?;
    io.fetches = ctx.frame().fetch_values();
    crate::logs!(
        ctx.logger(),
        Verbose,
        "partial run [{}, {}) executed {} steps, completed={}",
        region.start_pc,
        region.end_pc,
        outcome.steps_executed,
        outcome.completed
    );
    Ok(outcome)
}

/// Step every stream through its range of `region` on the calling thread.
///
/// Streams are visited round-robin. A stream stops at a barrier that is not
/// yet open or at a notification that is not yet activated, and is picked up
/// again on the next pass. When the step that would release it lies at or past
/// `region.end_pc`, the stream is parked instead: the resume ends normally for
/// it and a later resume starts with the parked step. A pass in which no
/// stream advances while some stream still waits on a step inside the region
/// means the region cannot finish and is reported as stalled.
pub(crate) fn run_region(
    plan: &ExecutionPlan,
    region: &ProgramRegion,
    ctx: &mut ExecutionContext,
    kernels: &KernelRegistryManager,
    trace_enabled: bool,
) -> Result<PartialRunOutcome> {
    let mut cursors: Vec<usize> = region.stream_pc_range.iter().map(|(start, _)| *start).collect();
    let mut carried: Vec<Option<usize>> = vec![None; plan.streams.len()];
    for (stream_idx, (start, end)) in region.stream_pc_range.iter().enumerate() {
        match ctx.parked_step(stream_idx) {
            Some(step) if step < *start => carried[stream_idx] = Some(step),
            Some(step) if step < *end => ctx.set_parked_step(stream_idx, None),
            _ => {}
        }
    }
    let mut parked = vec![false; plan.streams.len()];
    let mut kernel_cache: HashMap<usize, Arc<dyn Kernel>> = HashMap::new();
    let mut outcome = PartialRunOutcome::default();
    let mut runner = StepRunner {
        plan,
        ctx: &mut *ctx,
        kernels,
        kernel_cache: &mut kernel_cache,
        outcome: &mut outcome,
        trace_enabled,
    };
    loop {
        let mut progressed = false;
        let mut waiting: Option<(usize, usize)> = None;
        for (stream_idx, stream) in plan.streams.iter().enumerate() {
            let Some(stream) = stream else {
                continue;
            };
            if parked[stream_idx] {
                continue;
            }
            let mut blocked = None;
            if let Some(step_idx) = carried[stream_idx] {
                match runner.step_once(stream_idx, step_idx, &stream.steps[step_idx])? {
                    StepOutcome::Advance => {
                        carried[stream_idx] = None;
                        runner.ctx.set_parked_step(stream_idx, None);
                        progressed = true;
                    }
                    StepOutcome::Blocked => blocked = Some(step_idx),
                }
            }
            let end = region.stream_pc_range[stream_idx].1;
            while blocked.is_none() && cursors[stream_idx] < end {
                let step_idx = cursors[stream_idx];
                match runner.step_once(stream_idx, step_idx, &stream.steps[step_idx])? {
                    StepOutcome::Advance => {
                        cursors[stream_idx] += 1;
                        progressed = true;
                    }
                    StepOutcome::Blocked => blocked = Some(step_idx),
                }
            }
            match blocked {
                Some(step_idx) => {
                    let releases_later = release_pc(plan, stream_idx, &stream.steps[step_idx])
                        .map_or(false, |pc| pc >= region.end_pc);
                    if releases_later {
                        parked[stream_idx] = true;
                        carried[stream_idx] = None;
                        runner.ctx.set_parked_step(stream_idx, Some(step_idx));
                        crate::logs!(
                            runner.ctx.logger(),
                            Verbose,
                            "stream {} parked at step {} (pc {}) until a later resume",
                            stream_idx,
                            step_idx,
                            stream.steps[step_idx].pc
                        );
                    } else if waiting.is_none() {
                        waiting = Some((stream_idx, step_idx));
                    }
                }
                None => {
                    if end == stream.steps.len()
                        && !stream.is_empty()
                        && runner.ctx.mark_stream_finished(stream_idx)
                    {
                        crate::logs!(
                            runner.ctx.logger(),
                            Verbose,
                            "stream {} finished, {} streams pending",
                            stream_idx,
                            runner.ctx.remain_tasks()
                        );
                    }
                }
            }
        }
        let Some((stream_idx, step_idx)) = waiting else {
            break;
        };
        if !progressed {
            return Err(stalled(plan, region, stream_idx, step_idx));
        }
    }
    outcome.completed = ctx.all_tasks_done();
    if outcome.completed {
        ctx.device_streams().clean_up(true)?;
    }
    Ok(outcome)
}

/// Borrowed state for executing single steps of one region.
struct StepRunner<'a> {
    plan: &'a ExecutionPlan,
    ctx: &'a mut ExecutionContext,
    kernels: &'a KernelRegistryManager,
    kernel_cache: &'a mut HashMap<usize, Arc<dyn Kernel>>,
    outcome: &'a mut PartialRunOutcome,
    trace_enabled: bool,
}

impl StepRunner<'_> {
    fn step_once(&mut self, stream_idx: usize, step_idx: usize, step: &Step) -> Result<StepOutcome> {
        let started = Instant::now();
        let result = execute_step(self.plan, stream_idx, step, self.ctx, self.kernels, self.kernel_cache)
            .with_context(|| format!("stream {} step {} (pc {}) failed", stream_idx, step_idx, step.pc))?;
        if let StepOutcome::Advance = result {
            if self.trace_enabled {
                self.outcome
                    .events
                    .push(trace_event(self.plan, stream_idx, step_idx, step, started));
            }
            self.outcome.steps_executed += 1;
        }
        Ok(result)
    }
}

/// Program counter of the step that unblocks `step` on `stream_idx`: the
/// other arrival at the same barrier, or the activation of the awaited
/// notification.
fn release_pc(plan: &ExecutionPlan, stream_idx: usize, step: &Step) -> Option<usize> {
    let (candidates, release) = match step.kind {
        StepKind::Barrier { barrier } => (None, StepKind::Barrier { barrier }),
        StepKind::WaitOnNotification { notification } => (
            Some(*plan.notification_owners.get(notification)?),
            StepKind::ActivateNotification { notification },
        ),
        _ => return None,
    };
    plan.streams
        .iter()
        .enumerate()
        .filter(|(idx, _)| match candidates {
            Some(owner) => *idx == owner,
            None => *idx != stream_idx,
        })
        .filter_map(|(_, stream)| stream.as_ref())
        .flat_map(|stream| stream.steps.iter())
        .find(|other| other.kind == release)
        .map(|other| other.pc)
}

fn execute_step(
    plan: &ExecutionPlan,
    stream_idx: usize,
    step: &Step,
    ctx: &mut ExecutionContext,
    kernels: &KernelRegistryManager,
    kernel_cache: &mut HashMap<usize, Arc<dyn Kernel>>,
) -> Result<StepOutcome> {
    match step.kind {
        StepKind::LaunchKernel { node } => {
            let node_def = plan
                .nodes
                .get(node)
                .ok_or_else(|| anyhow!("unknown node {}", node))?;
            let kernel = match kernel_cache.get(&node) {
                Some(kernel) => Arc::clone(kernel),
                None => {
                    let kernel = kernels.create_kernel(node_def)?;
                    kernel_cache.insert(node, Arc::clone(&kernel));
                    kernel
                }
            };
            let mut kernel_ctx = ctx.kernel_context(node_def, stream_idx);
            kernel
                .compute(&mut kernel_ctx)
                .with_context(|| format!("kernel {} ({}) failed", node_def.name, node_def.op))?;
            Ok(StepOutcome::Advance)
        }
        StepKind::Barrier { barrier } => {
            if !ctx.barrier_arrived(stream_idx) {
                ctx.set_barrier_arrived(stream_idx, true);
                ctx.dec_count_down_barrier(barrier)?;
            }
            if ctx.barrier_open(barrier) {
                ctx.set_barrier_arrived(stream_idx, false);
                Ok(StepOutcome::Advance)
            } else {
                Ok(StepOutcome::Blocked)
            }
        }
        StepKind::WaitOnNotification { notification } => {
            let signal = ctx.notification(notification)?;
            if !signal.is_activated() {
                return Ok(StepOutcome::Blocked);
            }
            let stream = ctx
                .device_stream(stream_idx)
                .ok_or_else(|| anyhow!("stream {} has no device stream", stream_idx))?;
            stream.wait_on(signal)?;
            Ok(StepOutcome::Advance)
        }
        StepKind::ActivateNotification { notification } => {
            ctx.notification(notification)?.activate();
            Ok(StepOutcome::Advance)
        }
    }
}

fn trace_event(
    plan: &ExecutionPlan,
    stream: usize,
    step_index: usize,
    step: &Step,
    started: Instant,
) -> TraceEvent {
    let (kind, node_name) = match step.kind {
        StepKind::LaunchKernel { node } => (
            TraceEventKind::LaunchKernel,
            plan.nodes
                .get(node)
                .map(|node| node.name.clone())
                .unwrap_or_default(),
        ),
        StepKind::Barrier { .. } => (TraceEventKind::Barrier, String::new()),
        StepKind::WaitOnNotification { .. } => (TraceEventKind::WaitOnNotification, String::new()),
        StepKind::ActivateNotification { .. } => {
            (TraceEventKind::ActivateNotification, String::new())
        }
    };
    TraceEvent {
        kind,
        stream,
        step_index,
        pc: step.pc,
        node_name,
        micros: started.elapsed().as_micros() as u64,
    }
}

fn stalled(
    plan: &ExecutionPlan,
    region: &ProgramRegion,
    stream_idx: usize,
    step_idx: usize,
) -> anyhow::Error {
    let pc = plan.streams[stream_idx]
        .as_ref()
        .and_then(|stream| stream.steps.get(step_idx))
        .map(|step| step.pc);
    match pc {
        Some(pc) => anyhow!(
            "region [{}, {}) stalled: stream {} blocked at step {} (pc {})",
            region.start_pc,
            region.end_pc,
            stream_idx,
            step_idx,
            pc
        ),
        None => anyhow!("region [{}, {}) stalled", region.start_pc, region.end_pc),
    }
}
