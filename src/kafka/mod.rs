//! Cluster collaborators consumed by the samplers.
//!
//! The samplers and the scheduler only talk to the cluster through these
//! traits, so the rdkafka-backed [`client::KafkaClient`] can be swapped for an
//! in-memory fake in tests.

pub mod client;

use crate::error::Result;
use std::collections::BTreeMap;

/// Discovers the cluster's brokers and consumer groups.
#[async_trait::async_trait]
pub trait ClusterDirectory: Send + Sync {
    /// Broker addresses as `host:port`. Fails with `BeatError::Connectivity`.
    async fn resolve_brokers(&self) -> Result<Vec<String>>;

    /// Names of every known consumer group. Fails with `BeatError::Connectivity`.
    async fn resolve_groups(&self) -> Result<Vec<String>>;
}

/// Issues topic, offset and group-offset requests against the brokers.
#[async_trait::async_trait]
pub trait BrokerClient: Send + Sync {
    /// Handle to the broker coordinating one consumer group's offsets.
    type Coordinator: Send + Sync;

    async fn list_topics(&self) -> Result<Vec<String>>;

    async fn list_partitions(&self, topic: &str) -> Result<Vec<i32>>;

    /// Log-end offset (high watermark) of one partition.
    async fn fetch_log_end_offset(&self, topic: &str, partition: i32) -> Result<i64>;

    async fn resolve_group_coordinator(&self, group: &str) -> Result<Self::Coordinator>;

    /// Committed offsets for `partitions` in a single batched request.
    /// `None` marks a partition the group never committed on.
    async fn fetch_committed_offsets(
        &self,
        coordinator: &Self::Coordinator,
        topic: &str,
        partitions: &[i32],
    ) -> Result<BTreeMap<i32, Option<i64>>>;
}
