use crate::collector::event_builder::MetricEvent;
use crate::publish::EventSink;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Writes each event as one JSON document per line.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, events: Vec<MetricEvent>) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut written = 0usize;

        for event in &events {
            let line = match serde_json::to_string(event) {
                Ok(line) => line,
                Err(e) => {
                    warn!(topic = event.topic(), group = ?event.group(), error = %e, "Failed to serialize event");
                    continue;
                }
            };
            if let Err(e) = writeln!(writer, "{line}") {
                warn!(error = %e, "Failed to write events, dropping batch");
                return;
            }
            written += 1;
        }

        if let Err(e) = writer.flush() {
            warn!(error = %e, "Failed to flush events");
        }
        debug!(events = written, "Events sent");
    }
}
