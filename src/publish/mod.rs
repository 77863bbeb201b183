//! Downstream destinations for metric events.

pub mod json_lines;

use crate::collector::event_builder::MetricEvent;
use crate::scheduler::TickReport;
use std::sync::Arc;

/// Fire-and-forget destination for events. Implementations must not block
/// the scheduler on downstream failures; they log and move on.
pub trait EventSink: Send + Sync {
    fn emit(&self, events: Vec<MetricEvent>);

    fn begin_tick(&self) {}

    fn finish_tick(&self, _report: &TickReport) {}
}

/// Forwards every call to each inner sink in order.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, events: Vec<MetricEvent>) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(events.clone());
            }
            last.emit(events);
        }
    }

    fn begin_tick(&self) {
        for sink in &self.sinks {
            sink.begin_tick();
        }
    }

    fn finish_tick(&self, report: &TickReport) {
        for sink in &self.sinks {
            sink.finish_tick(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::event_builder::EventBuilder;
    use crate::collector::partition_sampler::{PartitionProbe, TopicSample};
    use crate::testing::RecordingSink;

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(RecordingSink::default());
        let second = Arc::new(RecordingSink::default());
        let fanout = FanoutSink::new(vec![first.clone(), second.clone()]);
        assert_eq!(fanout.len(), 2);
        assert!(!fanout.is_empty());

        let sample = TopicSample {
            topic: "orders".to_string(),
            probes: Ok(vec![PartitionProbe {
                partition: 0,
                log_end: Ok(10),
            }]),
        };
        fanout.begin_tick();
        fanout.emit(EventBuilder::topic_events(&sample));
        fanout.finish_tick(&TickReport::default());

        for sink in [&first, &second] {
            assert_eq!(sink.events().len(), 1);
            assert_eq!(sink.batches(), 1);
            assert_eq!(sink.ticks().len(), 1);
        }
    }

    #[test]
    fn test_empty_fanout_is_a_no_op() {
        let fanout = FanoutSink::new(Vec::new());
        assert!(fanout.is_empty());
        fanout.emit(Vec::new());
        fanout.finish_tick(&TickReport::default());
    }
}
