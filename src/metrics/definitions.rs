pub const METRIC_TOPIC_LOG_SIZE: &str = "kafkabeat_topic_log_size";
pub const METRIC_CONSUMER_OFFSET: &str = "kafkabeat_consumer_offset";
pub const METRIC_CONSUMER_LAG: &str = "kafkabeat_consumer_lag";

pub const METRIC_TICK_DURATION_SECONDS: &str = "kafkabeat_tick_duration_seconds";
pub const METRIC_UP: &str = "kafkabeat_up";
pub const METRIC_LAST_TICK_TIMESTAMP: &str = "kafkabeat_last_tick_timestamp_seconds";

pub const LABEL_TOPIC: &str = "topic";
pub const LABEL_PARTITION: &str = "partition";
pub const LABEL_GROUP: &str = "group";

pub const HELP_TOPIC_LOG_SIZE: &str = "Log-end offset of a topic partition";
pub const HELP_CONSUMER_OFFSET: &str = "Last committed offset of a consumer group on a partition";
pub const HELP_CONSUMER_LAG: &str =
    "Log-end offset minus committed offset; negative after truncation or compaction";
pub const HELP_TICK_DURATION_SECONDS: &str = "Duration of the last completed sampling tick";
pub const HELP_UP: &str = "1 if the last tick could sample at least one topic, 0 otherwise";
pub const HELP_LAST_TICK_TIMESTAMP: &str = "Unix timestamp of the last published tick";
