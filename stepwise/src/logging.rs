use std::env;
use std::fmt::{self, Arguments};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy)]
enum TraceLevel {
    Off,
    Basic,
    Full,
}

const COLOR_VERBOSE: &str = "90";
const COLOR_INFO: &str = "";
const COLOR_WARNING: &str = "33";
const COLOR_ERROR: &str = "91";
const COLOR_CRITICAL: &str = "31";
const COLOR_TRACE: &str = "34";

static TRACE_LEVEL: Lazy<TraceLevel> = Lazy::new(|| {
    env::var("STEPWISE_TRACE")
        .ok()
        .as_deref()
        .map(parse_trace_level)
        .unwrap_or(TraceLevel::Off)
});

fn parse_trace_level(value: &str) -> TraceLevel {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" => TraceLevel::Basic,
        "full" => TraceLevel::Full,
        _ => TraceLevel::Off,
    }
}

fn trace_level() -> TraceLevel {
    *TRACE_LEVEL
}

fn trace_full_enabled() -> bool {
    matches!(trace_level(), TraceLevel::Full)
}

fn trace_basic_enabled() -> bool {
    matches!(trace_level(), TraceLevel::Full | TraceLevel::Basic)
}

fn timestamp_hms() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        % 86_400;
    let hours = secs / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

fn emit(kind: &str, color: &str, args: Arguments) {
    let ts = timestamp_hms();
    if color.is_empty() {
        println!("{ts} [{kind}] -- {args}");
    } else {
        println!("{ts} [\u{001b}[{color}m{kind}\u{001b}[0m] -- {args}");
    }
}

/// Emit a warning message when trace level allows it.
pub fn emit_warning(args: Arguments) {
    if trace_full_enabled() {
        emit("WARNING", COLOR_WARNING, args);
    }
}

/// Emit an error message when trace level allows it.
pub fn emit_error(args: Arguments) {
    if trace_basic_enabled() {
        emit("ERROR", COLOR_ERROR, args);
    }
}

/// Emit a critical message unconditionally.
pub fn emit_critical(args: Arguments) {
    emit("CRITICAL", COLOR_CRITICAL, args);
}

/// Emit a trace message when trace level allows it.
pub fn emit_trace(args: Arguments) {
    if trace_basic_enabled() {
        emit("TRACE", COLOR_TRACE, args);
    }
}

/// Severity of a session log record, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn from_ident(ident: &str) -> Option<Self> {
        match ident.trim().to_ascii_lowercase().as_str() {
            "verbose" | "v" => Some(Severity::Verbose),
            "info" | "i" => Some(Severity::Info),
            "warning" | "w" => Some(Severity::Warning),
            "error" | "e" => Some(Severity::Error),
            "fatal" | "f" => Some(Severity::Fatal),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Severity::Verbose => "VERBOSE",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Severity::Verbose => COLOR_VERBOSE,
            Severity::Info => COLOR_INFO,
            Severity::Warning => COLOR_WARNING,
            Severity::Error => COLOR_ERROR,
            Severity::Fatal => COLOR_CRITICAL,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One session log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub severity: Severity,
    pub logger_id: String,
    pub message: String,
    pub timestamp_ms: u128,
}

/// Destination for session log records.
pub trait LogSink: Send + Sync {
    fn send(&self, record: &LogRecord);
}

/// Writes records to stdout in the diagnostics line format.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn send(&self, record: &LogRecord) {
        emit(
            record.severity.label(),
            record.severity.color(),
            format_args!("[{}] {}", record.logger_id, record.message),
        );
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .expect("memory sink mutex poisoned")
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .map(|record| record.message)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn send(&self, record: &LogRecord) {
        self.records
            .lock()
            .expect("memory sink mutex poisoned")
            .push(record.clone());
    }
}

/// Session logger: an id, a severity floor and a sink.
///
/// Cheap to clone; runs receive a logger per call and may swap it between
/// resumes.
#[derive(Clone)]
pub struct Logger {
    id: String,
    min_severity: Severity,
    sink: Arc<dyn LogSink>,
}

static DEFAULT_LOGGER: Lazy<Logger> = Lazy::new(|| {
    let min_severity = env::var("STEPWISE_LOG_SEVERITY")
        .ok()
        .as_deref()
        .and_then(Severity::from_ident)
        .unwrap_or(Severity::Warning);
    Logger::new("default", min_severity, Arc::new(ConsoleSink))
});

impl Logger {
    pub fn new(id: &str, min_severity: Severity, sink: Arc<dyn LogSink>) -> Self {
        Self {
            id: id.to_string(),
            min_severity,
            sink,
        }
    }

    /// Process-wide console logger.
    pub fn default_logger() -> &'static Logger {
        &DEFAULT_LOGGER
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn min_severity(&self) -> Severity {
        self.min_severity
    }

    pub fn enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }

    pub fn log(&self, severity: Severity, args: Arguments) {
        if !self.enabled(severity) {
            return;
        }
        let record = LogRecord {
            severity,
            logger_id: self.id.clone(),
            message: args.to_string(),
            timestamp_ms: timestamp_ms(),
        };
        self.sink.send(&record);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("id", &self.id)
            .field("min_severity", &self.min_severity)
            .finish()
    }
}

/// Log through a session [`Logger`]: `logs!(logger, Info, "...")`.
#[macro_export]
macro_rules! logs {
    ($logger:expr, $severity:ident, $($arg:tt)*) => {
        $logger.log($crate::logging::Severity::$severity, format_args!($($arg)*))
    };
}

/// Emit a warning message via the diagnostics channel.
#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {
        $crate::logging::emit_warning(format_args!($($arg)*))
    };
}

/// Emit an error message via the diagnostics channel.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::logging::emit_error(format_args!($($arg)*))
    };
}

/// Emit a critical message via the diagnostics channel.
#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => {
        $crate::logging::emit_critical(format_args!($($arg)*))
    };
}

/// Emit a trace message via the diagnostics channel.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::logging::emit_trace(format_args!($($arg)*))
    };
}
