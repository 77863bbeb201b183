use crate::collector::{CommittedOffsets, LogSizes};
use crate::error::Result;
use crate::kafka::BrokerClient;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Committed offsets of one group on one topic, or why they are missing.
#[derive(Debug)]
pub struct GroupSample {
    pub group: String,
    pub topic: String,
    pub offsets: Result<CommittedOffsets>,
}

pub struct GroupOffsetSampler<B> {
    client: Arc<B>,
}

/// Partitions worth asking the coordinator about: those with a known,
/// non-empty log.
pub fn partitions_to_query(log_sizes: &LogSizes) -> Vec<i32> {
    log_sizes
        .iter()
        .filter(|(_, size)| **size > 0)
        .map(|(partition, _)| *partition)
        .collect()
}

impl<B: BrokerClient> GroupOffsetSampler<B> {
    pub fn new(client: Arc<B>) -> Self {
        Self { client }
    }

    #[instrument(skip(self, log_sizes))]
    pub async fn sample(&self, group: &str, topic: &str, log_sizes: &LogSizes) -> GroupSample {
        let offsets = self.fetch(group, topic, log_sizes).await;

        GroupSample {
            group: group.to_string(),
            topic: topic.to_string(),
            offsets,
        }
    }

    async fn fetch(&self, group: &str, topic: &str, log_sizes: &LogSizes) -> Result<CommittedOffsets> {
        let partitions = partitions_to_query(log_sizes);
        if partitions.is_empty() {
            debug!("No partition with a known log size, skipping offset fetch");
            return Ok(CommittedOffsets::new());
        }

        let coordinator = self.client.resolve_group_coordinator(group).await?;
        let fetched = self
            .client
            .fetch_committed_offsets(&coordinator, topic, &partitions)
            .await?;

        // Negative offsets are the broker's "no offset" sentinel.
        let offsets: CommittedOffsets = fetched
            .into_iter()
            .filter(|(partition, _)| partitions.binary_search(partition).is_ok())
            .filter_map(|(partition, offset)| {
                offset
                    .filter(|offset| *offset >= 0)
                    .map(|offset| (partition, offset))
            })
            .collect();

        debug!(
            queried = partitions.len(),
            committed = offsets.len(),
            "Fetched committed offsets"
        );
        Ok(offsets)
    }
}
