//! Level-filtered diagnostic delivery.
//!
//! Library code logs through `tracing`. A caller that wants the messages
//! routes them to its own callback with [`with_callback`], which installs a
//! [`CallbackLayer`] for the duration of one closure only.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Environment variable holding the default maximum level (0-4).
pub const LOGGER_LEVEL_ENV: &str = "RIFT_LOGGER_LEVEL";

/// Maximum verbosity: 0 = nothing, 1 = errors, 2 = warnings, 3 = infos, 4 = debug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LogLevel {
    Silent = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
    Debug = 4,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Error
    }
}

impl TryFrom<u8> for LogLevel {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, String> {
        match v {
            0 => Ok(LogLevel::Silent),
            1 => Ok(LogLevel::Error),
            2 => Ok(LogLevel::Warning),
            3 => Ok(LogLevel::Info),
            4 => Ok(LogLevel::Debug),
            other => Err(format!("log level must be 0-4, got {}", other)),
        }
    }
}

impl From<LogLevel> for u8 {
    fn from(level: LogLevel) -> Self {
        level as u8
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Silent => "silent",
            LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(name)
    }
}

impl LogLevel {
    /// Read the level from `RIFT_LOGGER_LEVEL`, falling back to errors only.
    pub fn from_env() -> Self {
        std::env::var(LOGGER_LEVEL_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u8>().ok())
            .and_then(|v| LogLevel::try_from(v).ok())
            .unwrap_or_default()
    }

    /// Level of a tracing event; trace events count as debug.
    pub fn of(level: &Level) -> Self {
        if *level == Level::ERROR {
            LogLevel::Error
        } else if *level == Level::WARN {
            LogLevel::Warning
        } else if *level == Level::INFO {
            LogLevel::Info
        } else {
            LogLevel::Debug
        }
    }

    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Silent => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
        }
    }
}

/// Callback receiving formatted diagnostics.
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// `tracing-subscriber` layer forwarding events at or below `max_level`.
pub struct CallbackLayer {
    max_level: LogLevel,
    callback: LogCallback,
}

impl CallbackLayer {
    pub fn new(max_level: LogLevel, callback: LogCallback) -> Self {
        Self { max_level, callback }
    }
}

impl<S: Subscriber> Layer<S> for CallbackLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = LogLevel::of(event.metadata().level());
        if self.max_level == LogLevel::Silent || level > self.max_level {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        (self.callback)(level, &visitor.finish());
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(mut self) -> String {
        if !self.fields.is_empty() {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message.push_str(&self.fields);
        }
        self.message
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            if !self.fields.is_empty() {
                self.fields.push(' ');
            }
            let _ = write!(self.fields, "{}={:?}", field.name(), value);
        }
    }
}

/// Run `f` with diagnostics delivered to `callback`, filtered by `max_level`.
pub fn with_callback<T>(max_level: LogLevel, callback: LogCallback, f: impl FnOnce() -> T) -> T {
    let subscriber =
        tracing_subscriber::registry().with(CallbackLayer::new(max_level, callback));
    tracing::subscriber::with_default(subscriber, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collect(max: LogLevel) -> Vec<(LogLevel, String)> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        with_callback(
            max,
            Arc::new(move |level: LogLevel, msg: &str| {
                sink.lock().unwrap().push((level, msg.to_string()))
            }),
            || {
                tracing::error!("broken");
                tracing::warn!(table = "roads", "skipped");
                tracing::info!("applied");
                tracing::debug!("detail");
            },
        );
        let out = seen.lock().unwrap().clone();
        out
    }

    #[test]
    fn test_filters_by_max_level() {
        let seen = collect(LogLevel::Warning);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (LogLevel::Error, "broken".to_string()));
        assert_eq!(seen[1].0, LogLevel::Warning);
        assert_eq!(seen[1].1, "skipped table=\"roads\"");
    }

    #[test]
    fn test_silent_and_debug() {
        assert!(collect(LogLevel::Silent).is_empty());
        assert_eq!(collect(LogLevel::Debug).len(), 4);
    }

    #[test]
    fn test_level_conversions() {
        assert_eq!(LogLevel::try_from(3u8), Ok(LogLevel::Info));
        assert!(LogLevel::try_from(5u8).is_err());
        assert_eq!(u8::from(LogLevel::Debug), 4);
        assert_eq!(LogLevel::Silent.to_level_filter(), LevelFilter::OFF);
    }
}
