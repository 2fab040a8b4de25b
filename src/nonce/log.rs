//! Structured logging capability injected into the nonce fetcher

use serde_json::Value;
use tracing::{debug, error, warn};

/// Leveled, structured log sink.
///
/// `fields` is expected to be a JSON object; implementations must not block.
pub trait NonceLogger: Send + Sync {
    fn debug(&self, fields: Value, message: &str);
    fn warn(&self, fields: Value, message: &str);
    fn error(&self, fields: Value, message: &str);
}

/// Forwards log entries to the `tracing` subscriber.
///
/// Each entry is one event at the matching level with two fields:
/// `component` (the name given to [`TracingLogger::new`]) and `fields`, the
/// field map serialized as a single compact JSON object string, e.g.
/// `fields={"wallet":"0x8ba1…","nonce":7,"attempt":1}`. With the JSON
/// formatter this arrives as a string-valued `fields` key, so log pipelines
/// must parse it as JSON before filtering on individual keys.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    component: &'static str,
}

impl TracingLogger {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }
}

impl NonceLogger for TracingLogger {
    fn debug(&self, fields: Value, message: &str) {
        debug!(component = self.component, fields = %fields, "{}", message);
    }

    fn warn(&self, fields: Value, message: &str) {
        warn!(component = self.component, fields = %fields, "{}", message);
    }

    fn error(&self, fields: Value, message: &str) {
        error!(component = self.component, fields = %fields, "{}", message);
    }
}
