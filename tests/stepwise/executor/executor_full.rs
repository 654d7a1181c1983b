use std::sync::Arc;

use anyhow::Result;
use stepwise::{PartialGraphExecutionState, Session, SessionOptions};

use crate::common::{self, CountingStreamFactory};

#[test]
fn full_run_produces_fetches_and_recycles_streams() -> Result<()> {
    let (mut session, _log) = common::session_with_kernels(common::dataflow_plan()?)?;
    session.add_initializer("w", common::f32_tensor(&[1.0, 1.0])?)?;
    let factory = Arc::new(CountingStreamFactory::default());
    session.register_stream_factory(factory.clone());
    let info = session.feeds_fetches_info(&["x"], &["y"])?;

    let mut io = info.bind(vec![common::f32_tensor(&[1.0, 2.0])?.into_shared()])?;
    let outcome = session.run(&mut io)?;
    assert!(outcome.completed);
    assert_eq!(outcome.steps_executed, 4);
    assert_eq!(io.fetch_value(0)?.typed::<f32>()?, &[4.0, 6.0]);
    assert_eq!(session.stream_pool().pooled_count(), 1);
    assert_eq!(factory.released(), 0);

    let mut io = info.bind(vec![common::f32_tensor(&[0.0, 0.0])?.into_shared()])?;
    session.run(&mut io)?;
    assert_eq!(io.fetch_value(0)?.typed::<f32>()?, &[2.0, 2.0]);
    assert_eq!(factory.created(), 2);
    Ok(())
}

#[test]
fn full_run_waits_on_barriers() -> Result<()> {
    let (session, log) = common::session_with_kernels(common::barrier_plan()?)?;
    let mut io = Default::default();

    let outcome = session.run(&mut io)?;
    assert!(outcome.completed);
    assert_eq!(outcome.steps_executed, 9);
    let recorded = common::recorded(&log);
    assert_eq!(recorded.len(), 5);
    let position = |name: &str| recorded.iter().position(|entry| entry == name);
    assert!(position("a") < position("e"));
    assert!(position("d") < position("c"));
    Ok(())
}

#[test]
fn partial_state_streams_never_enter_pool() -> Result<()> {
    let (session, _log) = common::session_with_kernels(common::barrier_plan()?)?;
    let mut io = Default::default();
    let mut state = PartialGraphExecutionState::new();

    let outcome = session.partial_run(&mut state, 0, 9, &mut io, None)?;
    assert!(outcome.completed);
    drop(state);
    assert_eq!(session.stream_pool().pooled_count(), 0);
    Ok(())
}

#[test]
fn stale_collections_are_refused() -> Result<()> {
    let factory = Arc::new(CountingStreamFactory::default());
    let mut session = Session::new(common::two_stream_plan(), SessionOptions::default())?;
    session.register_stream_factory(factory.clone());
    let pool = session.stream_pool();

    let collection = pool.acquire(session.plan())?;
    let generation = pool.generation();
    pool.invalidate();
    assert_eq!(pool.generation(), generation + 1);
    assert!(!pool.recycle(collection));
    assert_eq!(factory.released(), 2);
    assert_eq!(pool.pooled_count(), 0);
    Ok(())
}

#[test]
fn pool_keeps_at_most_capacity() -> Result<()> {
    let options = SessionOptions {
        stream_pool_capacity: 1,
        ..SessionOptions::default()
    };
    let session = Session::new(common::two_stream_plan(), options)?;
    let pool = session.stream_pool();

    let first = pool.acquire(session.plan())?;
    let second = pool.acquire(session.plan())?;
    assert!(pool.recycle(first));
    assert!(!pool.recycle(second));
    assert_eq!(pool.pooled_count(), 1);
    assert_eq!(pool.capacity(), 1);
    Ok(())
}
