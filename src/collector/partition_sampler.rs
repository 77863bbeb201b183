use crate::collector::LogSizes;
use crate::error::Result;
use crate::kafka::BrokerClient;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Outcome of one partition's log-end offset fetch.
#[derive(Debug)]
pub struct PartitionProbe {
    pub partition: i32,
    pub log_end: Result<i64>,
}

/// Everything learned about one topic during a tick. Failures stay in place
/// as `Err` values so the event builder decides what to omit.
#[derive(Debug)]
pub struct TopicSample {
    pub topic: String,
    pub probes: Result<Vec<PartitionProbe>>,
}

impl TopicSample {
    /// Log sizes of every partition sampled successfully.
    pub fn log_sizes(&self) -> LogSizes {
        match &self.probes {
            Ok(probes) => probes
                .iter()
                .filter_map(|p| p.log_end.as_ref().ok().map(|size| (p.partition, *size)))
                .collect(),
            Err(_) => LogSizes::new(),
        }
    }

    pub fn listing_failed(&self) -> bool {
        self.probes.is_err()
    }

    pub fn failed_partitions(&self) -> usize {
        self.probes
            .as_ref()
            .map_or(0, |probes| probes.iter().filter(|p| p.log_end.is_err()).count())
    }
}

pub struct PartitionSampler<B> {
    client: Arc<B>,
    max_concurrent: usize,
}

impl<B: BrokerClient> PartitionSampler<B> {
    pub fn new(client: Arc<B>, max_concurrent: usize) -> Self {
        Self {
            client,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// List the topic's partitions, then fetch each partition's log-end
    /// offset independently with bounded concurrency.
    #[instrument(skip(self))]
    pub async fn sample(&self, topic: &str) -> TopicSample {
        let mut partitions = match self.client.list_partitions(topic).await {
            Ok(partitions) => partitions,
            Err(e) => {
                return TopicSample {
                    topic: topic.to_string(),
                    probes: Err(e),
                };
            }
        };
        partitions.sort_unstable();
        partitions.dedup();
        debug!(partitions = partitions.len(), "Partitions retrieved");

        let client = &self.client;
        let probes: Vec<PartitionProbe> = futures::stream::iter(partitions)
            .map(|partition| async move {
                let log_end = client.fetch_log_end_offset(topic, partition).await;
                if let Ok(size) = &log_end {
                    debug!(partition, log_size = size, "Sampled log size");
                }
                PartitionProbe { partition, log_end }
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        TopicSample {
            topic: topic.to_string(),
            probes: Ok(probes),
        }
    }
}
