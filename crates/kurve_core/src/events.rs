//! Structured event notifications.
//!
//! The analysis path only hands events to an [`EventSink`]; what happens to
//! them afterwards (console, HTTP, database) belongs to the sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl EventLevel {
    pub fn as_log_level(self) -> log::Level {
        match self {
            EventLevel::Debug => log::Level::Debug,
            EventLevel::Info => log::Level::Info,
            EventLevel::Warning => log::Level::Warn,
            EventLevel::Error | EventLevel::Critical => log::Level::Error,
        }
    }
}

/// Payload attached to an event. Unset fields are left out when serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEvent {
    pub level: EventLevel,
    pub message: String,
    pub function: String,
    pub mode: String,
    pub context: EventContext,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisEvent {
    pub fn new(
        level: EventLevel,
        message: impl Into<String>,
        function: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            function: function.into(),
            mode: mode.into(),
            context: EventContext::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }
}

/// Milliseconds elapsed since `started`, at microsecond resolution.
pub fn elapsed_ms(started: DateTime<Utc>) -> f64 {
    let elapsed = Utc::now() - started;
    elapsed
        .num_microseconds()
        .map_or(elapsed.num_milliseconds() as f64, |us| us as f64 / 1000.0)
}

/// Receiver of analysis events. Emitting must not block or fail.
pub trait EventSink {
    fn emit(&self, event: AnalysisEvent);
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, event: AnalysisEvent) {
        (**self).emit(event)
    }
}

impl<S: EventSink + ?Sized> EventSink for Rc<S> {
    fn emit(&self, event: AnalysisEvent) {
        (**self).emit(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: AnalysisEvent) {}
}

/// Forwards events to the `log` facade under the `kurve::events` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: AnalysisEvent) {
        log::log!(
            target: "kurve::events",
            event.level.as_log_level(),
            "{} [{}/{}] {:?}",
            event.message,
            event.function,
            event.mode,
            event.context
        );
    }
}

/// Keeps events in memory until they are taken.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: RefCell<Vec<AnalysisEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn snapshot(&self) -> Vec<AnalysisEvent> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<AnalysisEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: AnalysisEvent) {
        self.events.borrow_mut().push(event);
    }
}
