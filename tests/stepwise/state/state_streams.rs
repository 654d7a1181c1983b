use std::sync::Arc;

use anyhow::Result;
use stepwise::{
    Device, DeviceStreamCollection, ExecutionPlan, LogicStream, PartialGraphExecutionState,
    Session, SessionOptions, SessionState, StreamFactory,
};

use crate::common::{self, CountingStreamFactory, FailingStreamFactory};

#[test]
fn stream_collection_is_acquired_once() -> Result<()> {
    let factory = Arc::new(CountingStreamFactory::default());
    let mut session = Session::new(common::two_stream_plan(), SessionOptions::default())?;
    session.register_stream_factory(factory.clone());

    let mut state = PartialGraphExecutionState::new();
    assert!(!state.has_device_stream_collection());
    let first = state.device_stream_collection(&session)?;
    let second = state.device_stream_collection(&session)?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(factory.created(), 2);
    assert_eq!(first.num_streams(), 2);
    Ok(())
}

#[test]
fn stream_collection_is_released_with_state() -> Result<()> {
    let factory = Arc::new(CountingStreamFactory::default());
    let mut session = Session::new(common::two_stream_plan(), SessionOptions::default())?;
    session.register_stream_factory(factory.clone());

    let mut state = PartialGraphExecutionState::new();
    let collection = state.device_stream_collection(&session)?;
    drop(collection);
    assert_eq!(factory.released(), 0);

    drop(state);
    assert_eq!(factory.released(), 2);
    assert_eq!(session.stream_pool().pooled_count(), 0);
    Ok(())
}

#[test]
fn stream_collection_outlives_session() -> Result<()> {
    let factory = Arc::new(CountingStreamFactory::default());
    let mut state = PartialGraphExecutionState::new();
    {
        let mut session = Session::new(common::two_stream_plan(), SessionOptions::default())?;
        session.register_stream_factory(factory.clone());
        state.device_stream_collection(&session)?;
    }
    assert_eq!(factory.released(), 0);
    drop(state);
    assert_eq!(factory.released(), 2);
    Ok(())
}

#[test]
fn missing_stream_factory_fails_acquisition() -> Result<()> {
    let mut plan = common::two_stream_plan();
    if let Some(stream) = plan.streams[1].as_mut() {
        stream.device = Device::Cuda;
    }
    let session = Session::new(plan, SessionOptions::default())?;
    let mut state = PartialGraphExecutionState::new();

    let err = state.device_stream_collection(&session).unwrap_err();
    assert!(format!("{:#}", err).contains("no stream factory registered for device cuda"));
    assert!(!state.has_device_stream_collection());
    Ok(())
}

#[test]
fn failing_stream_factory_fails_acquisition() -> Result<()> {
    let mut session = Session::new(common::two_stream_plan(), SessionOptions::default())?;
    session.register_stream_factory(Arc::new(FailingStreamFactory(Device::Cpu)));
    let mut state = PartialGraphExecutionState::new();

    let err = state.device_stream_collection(&session).unwrap_err();
    assert!(format!("{:#}", err).contains("device out of streams"));
    Ok(())
}

#[test]
fn null_streams_get_no_device_stream() -> Result<()> {
    let mut plan = common::two_stream_plan();
    plan.streams.push(None);
    plan.streams.push(Some(LogicStream::new(Device::Cpu)));
    let session = Session::new(plan, SessionOptions::default())?;

    let collection = session.acquire_device_stream_collection()?;
    assert_eq!(collection.num_streams(), 4);
    assert!(collection.stream(0).is_some());
    assert!(collection.stream(2).is_none());
    assert!(collection.stream(3).is_some());
    assert_eq!(session.plan().valid_stream_count(), 2);
    Ok(())
}

#[test]
fn empty_plan_has_no_valid_streams() {
    let plan = ExecutionPlan::default();
    assert_eq!(plan.valid_stream_count(), 0);
    assert_eq!(plan.end_pc(), 0);
}

#[test]
fn borrowed_streams_are_not_released() -> Result<()> {
    let factory = CountingStreamFactory::default();
    let borrowed = factory.create_stream()?;
    {
        let mut collection = DeviceStreamCollection::new(2, 0);
        collection.set_device_stream(0, factory.create_stream()?)?;
        collection.set_borrowed_device_stream(1, Arc::clone(&borrowed))?;
        assert!(collection.is_owned(0));
        assert!(!collection.is_owned(1));
        assert_eq!(collection.root_stream().map(|s| s.handle()), Some(10_000 + 1));
        collection.clean_up(true)?;
        assert_eq!(factory.flushed(), 2);
        assert!(collection.set_device_stream(2, Arc::clone(&borrowed)).is_err());
    }
    assert_eq!(factory.released(), 1);
    Ok(())
}
