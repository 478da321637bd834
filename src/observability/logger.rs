//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` first, then `severity`, then fields in key order
//! - Synchronous, no buffering
//!
//! A `Logger` is an instance: it carries its own minimum severity and sink,
//! is built once at startup and handed to every component that logs.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Diagnostic detail
    Debug = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

#[derive(Clone)]
enum Sink {
    /// stdout for everything below ERROR, stderr for ERROR
    Console,
    /// Shared in-memory buffer
    Buffer(Arc<Mutex<Vec<u8>>>),
    /// Discard
    Null,
}

/// A leveled structured logger instance
#[derive(Clone)]
pub struct Logger {
    min_severity: Severity,
    sink: Sink,
    /// Fields attached to every line (e.g. a correlation id)
    context: Arc<Vec<(String, String)>>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("min_severity", &self.min_severity)
            .field("context", &self.context)
            .finish()
    }
}

impl Logger {
    /// Console logger that drops events below `min_severity`
    pub fn new(min_severity: Severity) -> Self {
        Self {
            min_severity,
            sink: Sink::Console,
            context: Arc::default(),
        }
    }

    /// Logger that writes every event (DEBUG and up) into a shared buffer
    ///
    /// The returned handle can be read with [`LogCapture::contents`].
    pub fn capture() -> (Self, LogCapture) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let logger = Self {
            min_severity: Severity::Debug,
            sink: Sink::Buffer(buffer.clone()),
            context: Arc::default(),
        };
        (logger, LogCapture { buffer })
    }

    /// Logger that discards everything
    pub fn disabled() -> Self {
        Self {
            min_severity: Severity::Error,
            sink: Sink::Null,
            context: Arc::default(),
        }
    }

    /// Child logger that adds `key=value` to every line
    pub fn with_field(&self, key: &str, value: &str) -> Self {
        let mut context = (*self.context).clone();
        context.retain(|(k, _)| k != key);
        context.push((key.to_string(), value.to_string()));
        Self {
            min_severity: self.min_severity,
            sink: self.sink.clone(),
            context: Arc::new(context),
        }
    }

    /// The minimum severity this logger emits
    pub fn min_severity(&self) -> Severity {
        self.min_severity
    }

    /// Whether an event at `severity` would be written
    pub fn enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }

    /// Log an event with the given severity and fields
    pub fn log(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !self.enabled(severity) {
            return;
        }

        let line = if self.context.is_empty() {
            render_line(severity, event, fields)
        } else {
            let mut merged: Vec<(&str, &str)> = self
                .context
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .filter(|(k, _)| !fields.iter().any(|(f, _)| f == k))
                .collect();
            merged.extend_from_slice(fields);
            render_line(severity, event, &merged)
        };

        match &self.sink {
            Sink::Console => {
                if severity >= Severity::Error {
                    write_line(&mut io::stderr(), &line);
                } else {
                    write_line(&mut io::stdout(), &line);
                }
            }
            Sink::Buffer(buffer) => {
                if let Ok(mut buf) = buffer.lock() {
                    write_line(&mut *buf, &line);
                }
            }
            Sink::Null => {}
        }
    }

    /// Log at DEBUG level
    pub fn debug(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Debug, event, fields);
    }

    /// Log at INFO level
    pub fn info(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Error, event, fields);
    }
}

/// Read side of a capturing logger
#[derive(Debug, Clone)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Everything logged so far
    pub fn contents(&self) -> String {
        match self.buffer.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => String::new(),
        }
    }

    /// Logged lines whose `event` equals `event`
    pub fn events(&self, event: &str) -> Vec<serde_json::Value> {
        self.contents()
            .lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter(|v| v["event"] == event)
            .collect()
    }
}

fn write_line<W: Write>(writer: &mut W, line: &str) {
    // Write atomically (one call)
    let _ = writer.write_all(line.as_bytes());
    let _ = writer.flush();
}

fn render_line(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(256);

    output.push_str("{\"event\":");
    push_json_string(&mut output, event);
    output.push_str(",\"severity\":\"");
    output.push_str(severity.as_str());
    output.push('"');

    let mut sorted_fields: Vec<_> = fields.iter().collect();
    sorted_fields.sort_by_key(|(k, _)| *k);

    for (key, value) in sorted_fields {
        output.push(',');
        push_json_string(&mut output, key);
        output.push(':');
        push_json_string(&mut output, value);
    }

    output.push_str("}\n");
    output
}

fn push_json_string(output: &mut String, s: &str) {
    match serde_json::to_string(s) {
        Ok(quoted) => output.push_str(&quoted),
        Err(_) => output.push_str("\"\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("DEBUG".parse::<Severity>().unwrap(), Severity::Debug);
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!(" info ".parse::<Severity>().unwrap(), Severity::Info);
        assert!("verbose".parse::<Severity>().is_err());
    }

    #[test]
    fn test_log_json_format() {
        let (logger, capture) = Logger::capture();
        logger.info("TEST_EVENT", &[]);

        let output = capture.contents();
        let parsed: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(parsed["event"], "TEST_EVENT");
        assert_eq!(parsed["severity"], "INFO");
    }

    #[test]
    fn test_fields_sorted_after_event() {
        let line = render_line(
            Severity::Info,
            "TEST",
            &[("zebra", "1"), ("apple", "2"), ("mango", "3")],
        );

        let event_pos = line.find("\"event\"").unwrap();
        let severity_pos = line.find("\"severity\"").unwrap();
        let apple_pos = line.find("apple").unwrap();
        let zebra_pos = line.find("zebra").unwrap();

        assert!(event_pos < severity_pos);
        assert!(severity_pos < apple_pos);
        assert!(apple_pos < zebra_pos);
        assert_eq!(line.chars().filter(|c| *c == '\n').count(), 1);
    }

    #[test]
    fn test_log_escapes_special_chars() {
        let line = render_line(Severity::Info, "TEST", &[("message", "hello \"world\"\nline2")]);
        let parsed: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed["message"], "hello \"world\"\nline2");
    }

    #[test]
    fn test_context_fields() {
        let (logger, capture) = Logger::capture();
        let child = logger.with_field("correlation_id", "abc");

        child.info("WITH_CONTEXT", &[("member", "1")]);
        logger.info("WITHOUT_CONTEXT", &[]);

        let with = &capture.events("WITH_CONTEXT")[0];
        assert_eq!(with["correlation_id"], "abc");
        assert_eq!(with["member"], "1");
        assert!(capture.events("WITHOUT_CONTEXT")[0]
            .get("correlation_id")
            .is_none());
    }

    #[test]
    fn test_min_severity_filters() {
        let (mut logger, capture) = Logger::capture();
        logger.min_severity = Severity::Warn;

        logger.debug("DROPPED", &[]);
        logger.info("DROPPED", &[]);
        logger.warn("KEPT", &[]);

        assert!(capture.events("DROPPED").is_empty());
        assert_eq!(capture.events("KEPT").len(), 1);
    }
}
