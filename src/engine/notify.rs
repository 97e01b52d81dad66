//! The single UI surface the engine needs: a place to put messages.

use std::cell::RefCell;
use std::fmt;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Info,
    /// Non-blocking; the user can keep working (lookup failures).
    Warning,
    /// Blocking; the operation did not happen (validation, persistence).
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Receives validation failures and lookup-failure warnings.
pub trait NotificationSink {
    fn notify(&self, level: Level, message: &str);
}

/// A recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Sink that keeps every notification in memory.
///
/// Hosts drain it to render a status line; tests assert on it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: RefCell<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    pub fn entries(&self) -> Vec<Notification> {
        self.entries.borrow().clone()
    }

    /// Most recent notification, if any.
    pub fn last(&self) -> Option<Notification> {
        self.entries.borrow().last().cloned()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, level: Level, message: &str) {
        self.entries.borrow_mut().push(Notification {
            level,
            message: message.to_string(),
        });
    }
}

/// Sink that forwards notifications to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, level: Level, message: &str) {
        match level {
            Level::Info => tracing::info!(target: "formflow::notify", "{message}"),
            Level::Warning => tracing::warn!(target: "formflow::notify", "{message}"),
            Level::Error => tracing::error!(target: "formflow::notify", "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.notify(Level::Warning, "first");
        sink.notify(Level::Error, "second");
        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first");
        assert_eq!(sink.last().unwrap().level, Level::Error);
    }

    #[test]
    fn drain_empties_the_sink() {
        let sink = RecordingSink::new();
        sink.notify(Level::Info, "hello");
        assert_eq!(sink.drain().len(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn notification_display() {
        let n = Notification {
            level: Level::Warning,
            message: "end date lookup failed".into(),
        };
        insta::assert_snapshot!(n.to_string(), @"[warning] end date lookup failed");
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(Level::Info < Level::Warning);
        assert!(Level::Warning < Level::Error);
    }
}
