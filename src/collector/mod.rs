pub mod event_builder;
pub mod group_sampler;
pub mod lag_calculator;
pub mod partition_sampler;

use std::collections::BTreeMap;

/// Log-end offset per partition of one topic, sampled in the current tick.
pub type LogSizes = BTreeMap<i32, i64>;

/// Last committed offset per partition for one (group, topic) pair.
/// Partitions the group never committed on are absent.
pub type CommittedOffsets = BTreeMap<i32, i64>;
