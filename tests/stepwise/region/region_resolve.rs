use anyhow::Result;
use stepwise::{ExecutionPlan, ProgramRegion};

use crate::common;

#[test]
fn region_first_half() {
    let plan = common::two_stream_plan();
    let region = ProgramRegion::resolve(&plan, 0, 4);
    assert_eq!(region.stream_pc_range, vec![(0, 2), (0, 2)]);
    assert_eq!(region.num_steps(), 4);
}

#[test]
fn region_tail_past_last_counter() {
    let plan = common::two_stream_plan();
    let region = ProgramRegion::resolve(&plan, 4, 10);
    assert_eq!(region.stream_pc_range, vec![(2, 4), (2, 3)]);
    assert_eq!(region.stream_range(1), Some(2..3));
}

#[test]
fn region_empty_range() {
    let plan = common::two_stream_plan();
    let region = ProgramRegion::resolve(&plan, 2, 2);
    assert!(region.is_empty());
    for (start, end) in &region.stream_pc_range {
        assert_eq!(start, end);
    }
}

#[test]
fn region_single_stream_slice() {
    let plan = common::two_stream_plan();
    let region = ProgramRegion::resolve(&plan, 1, 2);
    assert_eq!(region.stream_pc_range, vec![(1, 1), (0, 1)]);
}

#[test]
fn region_null_stream_maps_to_empty() {
    let mut plan = common::two_stream_plan();
    plan.streams.insert(1, None);
    let region = ProgramRegion::resolve(&plan, 0, 10);
    assert_eq!(region.stream_pc_range, vec![(0, 4), (0, 0), (0, 3)]);
}

#[test]
fn region_selects_exactly_the_counters_in_range() -> Result<()> {
    let plan = common::plan_with_pcs(&[&[0, 0, 3, 3, 3, 7, 9], &[1, 2, 2, 8], &[], &[5]]);
    let max = plan.max_pc().unwrap_or(0) + 2;
    for start in 0..=max {
        for end in start..=max {
            let region = ProgramRegion::resolve(&plan, start, end);
            check_exact(&plan, &region, start, end);
        }
    }
    Ok(())
}

fn check_exact(plan: &ExecutionPlan, region: &ProgramRegion, start: usize, end: usize) {
    for (idx, stream) in plan.streams.iter().enumerate() {
        let stream = stream.as_ref().expect("test plan has no null streams");
        let (lo, hi) = region.stream_pc_range[idx];
        assert!(lo <= hi && hi <= stream.steps.len());
        for (step_idx, step) in stream.steps.iter().enumerate() {
            let inside = step.pc >= start && step.pc < end;
            assert_eq!(
                inside,
                (lo..hi).contains(&step_idx),
                "stream {} step {} pc {} in [{}, {})",
                idx,
                step_idx,
                step.pc,
                start,
                end
            );
        }
    }
}
