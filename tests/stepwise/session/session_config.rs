use std::fs;

use anyhow::Result;
use stepwise::{Session, SessionOptions, Severity, TensorValue};

use crate::common;

#[test]
fn options_defaults() -> Result<()> {
    let options = SessionOptions::from_json_str("{}")?;
    assert_eq!(options, SessionOptions::default());
    assert_eq!(options.log_id, "session");
    assert_eq!(options.log_severity, Severity::Warning);
    assert!(!options.trace_enabled);
    assert_eq!(options.stream_pool_capacity, 4);
    Ok(())
}

#[test]
fn options_from_file() -> Result<()> {
    let path = std::env::temp_dir().join(format!("stepwise-options-{}.json", uuid::Uuid::new_v4()));
    fs::write(
        &path,
        r#"{ "log_id": "resumable", "log_severity": "verbose", "trace_enabled": true }"#,
    )?;
    let options = SessionOptions::from_json_file(&path);
    fs::remove_file(&path)?;
    let options = options?;
    assert_eq!(options.log_id, "resumable");
    assert_eq!(options.log_severity, Severity::Verbose);
    assert!(options.trace_enabled);
    assert_eq!(options.stream_pool_capacity, 4);

    let session = Session::new(common::two_stream_plan(), options)?;
    assert_eq!(session.logger().id(), "resumable");
    assert_eq!(session.logger().min_severity(), Severity::Verbose);
    Ok(())
}

#[test]
fn options_reject_unknown_fields() {
    let err = SessionOptions::from_json_str(r#"{ "threads": 8 }"#).unwrap_err();
    assert!(format!("{:#}", err).contains("unknown field"));
}

#[test]
fn severity_idents() {
    assert_eq!(Severity::from_ident("INFO"), Some(Severity::Info));
    assert_eq!(Severity::from_ident(" w "), Some(Severity::Warning));
    assert_eq!(Severity::from_ident("loud"), None);
    assert!(Severity::Error > Severity::Warning);
}

#[test]
fn logger_filters_below_floor() {
    let (logger, sink) = common::memory_logger("floor");
    let quiet = stepwise::Logger::new("quiet", Severity::Error, sink.clone());
    stepwise::logs!(quiet, Warning, "dropped {}", 1);
    stepwise::logs!(quiet, Error, "kept {}", 2);
    stepwise::logs!(logger, Verbose, "kept {}", 3);
    assert_eq!(sink.messages(), vec!["kept 2", "kept 3"]);
    assert_eq!(sink.records()[0].logger_id, "quiet");
}

#[test]
fn initializers_are_checked_against_plan() -> Result<()> {
    let mut session = Session::new(common::dataflow_plan()?, SessionOptions::default())?;
    assert!(session
        .add_initializer("missing", common::f32_tensor(&[1.0, 1.0])?)
        .is_err());
    let err = session
        .add_initializer("w", TensorValue::from_vec(&[2], vec![1i64, 2])?)
        .unwrap_err();
    assert!(err.to_string().contains("has dtype I64, declared F32"));
    let err = session
        .add_initializer("w", common::f32_tensor(&[1.0])?)
        .unwrap_err();
    assert!(err.to_string().contains("has shape [1], declared [2]"));
    session.add_initializer("w", common::f32_tensor(&[1.0, 1.0])?)?;
    Ok(())
}

#[test]
fn feeds_fetches_info_resolves_names() -> Result<()> {
    let session = Session::new(common::dataflow_plan()?, SessionOptions::default())?;
    let info = session.feeds_fetches_info(&["x"], &["h", "y"])?;
    assert_eq!(info.feed_idxs(), &[0]);
    assert_eq!(info.fetch_idxs(), &[2, 3]);
    assert_eq!(info.fetch_names(), &["h".to_string(), "y".to_string()]);

    let err = session.feeds_fetches_info(&["nope"], &[]).unwrap_err();
    assert!(err.to_string().contains("unknown feed name: nope"));
    let err = info.bind(Vec::new()).unwrap_err();
    assert!(err.to_string().contains("expected 1 feeds"));

    let io = info.bind(vec![common::f32_tensor(&[1.0, 2.0])?.into_shared()])?;
    let shown = format!("{:?}", io);
    assert!(shown.contains("feed_idxs: [0]"));
    assert!(shown.contains("num_feeds: 1"));
    assert!(shown.contains("bound_fetches: 0"));
    Ok(())
}

#[test]
fn process_globals_initialize_once() {
    let first = stepwise::Logger::default_logger();
    let second = stepwise::Logger::default_logger();
    assert!(std::ptr::eq(first, second));
    assert_eq!(first.id(), "default");
    // trace level is read lazily on first use and reused afterwards
    stepwise::trace!("trace level {}", 1);
    stepwise::trace!("trace level {}", 2);
}
