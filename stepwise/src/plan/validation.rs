use anyhow::{anyhow, Context, Result};

use super::{ExecutionPlan, LogicStream, StepKind};

/// Number of streams that meet at every barrier.
pub const BARRIER_ARRIVALS: usize = 2;

/// Check the structural invariants the scheduler relies on.
///
/// Violations are plan bugs, not run-time conditions, so callers validate once
/// when a plan enters a session and never again on the resume path.
pub fn validate_plan(plan: &ExecutionPlan) -> Result<()> {
    validate_nodes(plan)?;
    for (owner_idx, owner) in plan.notification_owners.iter().enumerate() {
        match plan.streams.get(*owner) {
            Some(Some(_)) => {}
            _ => {
                return Err(anyhow!(
                    "notification {} is owned by stream {}, which is missing or null",
                    owner_idx,
                    owner
                ))
            }
        }
    }
    let mut barrier_arrivals = vec![Vec::new(); plan.num_barriers];
    for (stream_idx, stream) in plan.streams.iter().enumerate() {
        let Some(stream) = stream else {
            continue;
        };
        validate_stream(plan, stream_idx, stream, &mut barrier_arrivals)
            .with_context(|| format!("invalid plan stream {}", stream_idx))?;
    }
    for (barrier, arrivals) in barrier_arrivals.iter().enumerate() {
        if arrivals.len() != BARRIER_ARRIVALS {
            return Err(anyhow!(
                "barrier {} must be reached by {} steps, found {}",
                barrier,
                BARRIER_ARRIVALS,
                arrivals.len()
            ));
        }
        if arrivals[0] == arrivals[1] {
            return Err(anyhow!(
                "barrier {} is reached twice by stream {}",
                barrier,
                arrivals[0]
            ));
        }
    }
    Ok(())
}

fn validate_nodes(plan: &ExecutionPlan) -> Result<()> {
    for (node_idx, node) in plan.nodes.iter().enumerate() {
        for value in node.inputs.iter().chain(node.outputs.iter()) {
            if *value >= plan.values.len() {
                return Err(anyhow!(
                    "node {} ({}) references value {} but the plan has {} values",
                    node_idx,
                    node.name,
                    value,
                    plan.values.len()
                ));
            }
        }
    }
    Ok(())
}

fn validate_stream(
    plan: &ExecutionPlan,
    stream_idx: usize,
    stream: &LogicStream,
    barrier_arrivals: &mut [Vec<usize>],
) -> Result<()> {
    let mut last_pc = None;
    for (step_idx, step) in stream.steps.iter().enumerate() {
        if let Some(prev) = last_pc {
            if step.pc < prev {
                return Err(anyhow!(
                    "step {} has pc {} after pc {}; program counters must not decrease",
                    step_idx,
                    step.pc,
                    prev
                ));
            }
        }
        if step.pc == usize::MAX {
            return Err(anyhow!(
                "step {} has pc {}, which no program counter range can end past",
                step_idx,
                step.pc
            ));
        }
        last_pc = Some(step.pc);
        match step.kind {
            StepKind::LaunchKernel { node } => {
                if node >= plan.nodes.len() {
                    return Err(anyhow!("step {} launches unknown node {}", step_idx, node));
                }
            }
            StepKind::Barrier { barrier } => {
                let arrivals = barrier_arrivals
                    .get_mut(barrier)
                    .ok_or_else(|| anyhow!("step {} uses unknown barrier {}", step_idx, barrier))?;
                arrivals.push(stream_idx);
            }
            StepKind::WaitOnNotification { notification } => {
                let owner = notification_owner(plan, step_idx, notification)?;
                if owner == stream_idx {
                    return Err(anyhow!(
                        "step {} waits on notification {} owned by its own stream",
                        step_idx,
                        notification
                    ));
                }
            }
            StepKind::ActivateNotification { notification } => {
                let owner = notification_owner(plan, step_idx, notification)?;
                if owner != stream_idx {
                    return Err(anyhow!(
                        "step {} activates notification {} owned by stream {}",
                        step_idx,
                        notification,
                        owner
                    ));
                }
            }
        }
    }
    Ok(())
}

fn notification_owner(plan: &ExecutionPlan, step_idx: usize, notification: usize) -> Result<usize> {
    plan.notification_owners
        .get(notification)
        .copied()
        .ok_or_else(|| anyhow!("step {} uses unknown notification {}", step_idx, notification))
}
