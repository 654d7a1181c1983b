use anyhow::Result;
use stepwise::PartialGraphExecutionState;

use crate::common;

#[test]
fn region_is_computed_once_per_range() -> Result<()> {
    let plan = common::two_stream_plan();
    let mut state = PartialGraphExecutionState::new();

    state.set_program_counter_range(0, 4)?;
    let first = state.program_regions(&plan).clone();
    assert_eq!(state.region_computations(), 1);

    state.set_program_counter_range(4, 8)?;
    let tail = state.program_regions(&plan).clone();
    assert_ne!(tail, first);
    assert_eq!(state.region_computations(), 2);

    state.set_program_counter_range(0, 4)?;
    let again = state.program_regions(&plan).clone();
    assert_eq!(state.region_computations(), 2);
    assert_eq!(first, again);
    assert_eq!(state.cached_regions().len(), 2);
    Ok(())
}

#[test]
fn region_cache_keys_on_exact_range() -> Result<()> {
    let plan = common::two_stream_plan();
    let mut state = PartialGraphExecutionState::new();

    state.set_program_counter_range(0, 4)?;
    state.program_regions(&plan);
    // same steps, different range
    state.set_program_counter_range(0, 3)?;
    let region = state.program_regions(&plan).clone();
    assert_eq!(state.region_computations(), 2);
    assert_eq!(region.start_pc, 0);
    assert_eq!(region.end_pc, 3);
    Ok(())
}

#[test]
fn inverted_range_is_rejected() {
    let mut state = PartialGraphExecutionState::new();
    let err = state.set_program_counter_range(5, 2).unwrap_err();
    assert!(err.to_string().contains("start is past end"));
    assert_eq!(state.program_counter_start(), 0);
    assert_eq!(state.program_counter_end(), 0);
}
