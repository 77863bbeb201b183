use crate::collector::LogSizes;
use crate::collector::group_sampler::GroupSample;
use crate::collector::lag_calculator::LagCalculator;
use crate::collector::partition_sampler::TopicSample;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Kind-specific part of a [`MetricEvent`], serialized under a `type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventKind {
    Topic {
        #[serde(rename = "logSize")]
        log_size: i64,
    },
    Consumer {
        group: String,
        offset: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        lag: Option<i64>,
    },
}

/// One immutable sample, stamped when it was built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    #[serde(rename = "@timestamp")]
    timestamp: DateTime<Utc>,
    topic: String,
    partition: i32,
    #[serde(flatten)]
    kind: EventKind,
}

impl MetricEvent {
    fn now(topic: &str, partition: i32, kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            topic: topic.to_string(),
            partition,
            kind,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn group(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Consumer { group, .. } => Some(group.as_str()),
            EventKind::Topic { .. } => None,
        }
    }

    /// Equality ignoring the timestamp.
    pub fn same_payload(&self, other: &MetricEvent) -> bool {
        self.topic == other.topic && self.partition == other.partition && self.kind == other.kind
    }
}

/// Turns samples into events. Failed units arrive here as `Err` values and
/// are logged and left out.
pub struct EventBuilder;

impl EventBuilder {
    /// One event per partition with a sampled log size.
    pub fn topic_events(sample: &TopicSample) -> Vec<MetricEvent> {
        let probes = match &sample.probes {
            Ok(probes) => probes,
            Err(e) => {
                warn!(topic = %sample.topic, error = %e, "Unable to retrieve partitions, topic skipped this tick");
                return Vec::new();
            }
        };

        let mut events = Vec::with_capacity(probes.len());
        for probe in probes {
            match &probe.log_end {
                Ok(log_size) => events.push(MetricEvent::now(
                    &sample.topic,
                    probe.partition,
                    EventKind::Topic {
                        log_size: *log_size,
                    },
                )),
                Err(e) => warn!(
                    topic = %sample.topic,
                    partition = probe.partition,
                    error = %e,
                    "Unable to identify log size, partition skipped this tick"
                ),
            }
        }
        events
    }

    /// One event per committed partition; lag attached only when the
    /// partition's log size was sampled in the same tick.
    pub fn consumer_events(sample: &GroupSample, log_sizes: &LogSizes) -> Vec<MetricEvent> {
        let offsets = match &sample.offsets {
            Ok(offsets) => offsets,
            Err(e) => {
                warn!(
                    group = %sample.group,
                    topic = %sample.topic,
                    error = %e,
                    "Unable to fetch committed offsets, group skipped for this topic"
                );
                return Vec::new();
            }
        };

        if offsets.is_empty() {
            debug!(group = %sample.group, topic = %sample.topic, "No offsets for group on topic");
            return Vec::new();
        }

        LagCalculator::partition_lags(log_sizes, offsets)
            .into_iter()
            .map(|(partition, lag)| {
                MetricEvent::now(
                    &sample.topic,
                    partition,
                    EventKind::Consumer {
                        group: sample.group.clone(),
                        offset: offsets[&partition],
                        lag,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CommittedOffsets;
    use crate::collector::partition_sampler::PartitionProbe;
    use crate::error::BeatError;
    use crate::test_strategies::strategies::{arb_log_sizes, arb_name};
    use proptest::prelude::*;

    fn topic_sample(topic: &str, probes: Vec<(i32, Option<i64>)>) -> TopicSample {
        TopicSample {
            topic: topic.to_string(),
            probes: Ok(probes
                .into_iter()
                .map(|(partition, size)| PartitionProbe {
                    partition,
                    log_end: size.ok_or_else(|| BeatError::Broker("down".to_string())),
                })
                .collect()),
        }
    }

    fn group_sample(group: &str, topic: &str, offsets: &[(i32, i64)]) -> GroupSample {
        GroupSample {
            group: group.to_string(),
            topic: topic.to_string(),
            offsets: Ok(offsets.iter().copied().collect()),
        }
    }

    #[test]
    fn test_topic_events_skip_failed_partitions() {
        let sample = topic_sample("orders", vec![(0, Some(100)), (1, None)]);

        let events = EventBuilder::topic_events(&sample);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic(), "orders");
        assert_eq!(events[0].partition(), 0);
        assert_eq!(events[0].kind(), &EventKind::Topic { log_size: 100 });
    }

    #[test]
    fn test_topic_events_for_failed_listing() {
        let sample = TopicSample {
            topic: "orders".to_string(),
            probes: Err(BeatError::Broker("leader not available".to_string())),
        };

        assert!(EventBuilder::topic_events(&sample).is_empty());
    }

    #[test]
    fn test_consumer_events_attach_lag_when_log_size_known() {
        let sample = group_sample("billing", "orders", &[(0, 90), (1, 40)]);
        let log_sizes = LogSizes::from([(0, 100)]);

        let events = EventBuilder::consumer_events(&sample, &log_sizes);

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].kind(),
            &EventKind::Consumer {
                group: "billing".to_string(),
                offset: 90,
                lag: Some(10),
            }
        );
        assert_eq!(
            events[1].kind(),
            &EventKind::Consumer {
                group: "billing".to_string(),
                offset: 40,
                lag: None,
            }
        );
    }

    #[test]
    fn test_consumer_events_for_failed_group() {
        let sample = GroupSample {
            group: "reporting".to_string(),
            topic: "orders".to_string(),
            offsets: Err(BeatError::Coordinator("not available".to_string())),
        };

        assert!(EventBuilder::consumer_events(&sample, &LogSizes::from([(0, 1)])).is_empty());
    }

    #[test]
    fn test_group_without_commits_yields_no_events() {
        let sample = group_sample("idle", "orders", &[]);
        assert!(EventBuilder::consumer_events(&sample, &LogSizes::from([(0, 1)])).is_empty());
    }

    #[test]
    fn test_topic_event_json_shape() {
        let sample = topic_sample("orders", vec![(0, Some(100))]);
        let event = &EventBuilder::topic_events(&sample)[0];

        let json = serde_json::to_value(event).unwrap();

        assert_eq!(json["type"], "topic");
        assert_eq!(json["topic"], "orders");
        assert_eq!(json["partition"], 0);
        assert_eq!(json["logSize"], 100);
        assert!(json["@timestamp"].is_string());
    }

    #[test]
    fn test_consumer_event_json_omits_missing_lag() {
        let sample = group_sample("billing", "orders", &[(3, 7)]);
        let event = &EventBuilder::consumer_events(&sample, &LogSizes::new())[0];

        let json = serde_json::to_value(event).unwrap();

        assert_eq!(json["type"], "consumer");
        assert_eq!(json["group"], "billing");
        assert_eq!(json["offset"], 7);
        assert!(json.get("lag").is_none());
    }

    proptest! {
        /// Exactly one topic event per sampled partition, carrying its size
        #[test]
        fn prop_one_topic_event_per_sampled_partition(
            topic in arb_name(),
            sizes in arb_log_sizes(),
        ) {
            let sample = topic_sample(&topic, sizes.iter().map(|(p, s)| (*p, Some(*s))).collect());
            let events = EventBuilder::topic_events(&sample);

            prop_assert_eq!(events.len(), sizes.len());
            for (partition, size) in &sizes {
                let matching: Vec<_> = events.iter().filter(|e| e.partition() == *partition).collect();
                prop_assert_eq!(matching.len(), 1);
                prop_assert_eq!(matching[0].kind(), &EventKind::Topic { log_size: *size });
            }
        }

        /// Lag present iff the log size of that partition is known
        #[test]
        fn prop_lag_present_iff_log_size_known(
            sizes in arb_log_sizes(),
            committed in proptest::collection::btree_map(0..16i32, 0..1_000_000i64, 0..8),
        ) {
            let log_sizes: LogSizes = sizes.into_iter().collect();
            let offsets: CommittedOffsets = committed;
            let sample = GroupSample {
                group: "g".to_string(),
                topic: "t".to_string(),
                offsets: Ok(offsets.clone()),
            };

            let events = EventBuilder::consumer_events(&sample, &log_sizes);

            prop_assert_eq!(events.len(), offsets.len());
            for event in &events {
                let EventKind::Consumer { offset, lag, .. } = event.kind() else {
                    panic!("expected consumer event");
                };
                let expected = log_sizes.get(&event.partition()).map(|size| size - offset);
                prop_assert_eq!(*lag, expected);
            }
        }
    }
}
