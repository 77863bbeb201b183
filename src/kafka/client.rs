use crate::config::BeatConfig;
use crate::error::{BeatError, Result};
use crate::kafka::{BrokerClient, ClusterDirectory};
use rdkafka::admin::AdminClient;
use rdkafka::bindings::rd_kafka_resp_err_t;
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A consumer group whose coordinator answered a describe request.
#[derive(Debug, Clone)]
pub struct GroupCoordinator {
    group: String,
    state: String,
}

impl GroupCoordinator {
    pub fn group(&self) -> &str {
        &self.group
    }
}

/// Long-lived librdkafka client shared by every tick. Committed offsets go
/// through the admin handle, so monitoring more groups opens no extra
/// connections.
pub struct KafkaClient {
    consumer: Arc<BaseConsumer>,
    admin: Arc<AdminClient<DefaultClientContext>>,
    bootstrap_servers: String,
    timeout: Duration,
}

impl KafkaClient {
    pub fn new(config: &BeatConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", "kafkabeat")
            .set("enable.auto.commit", "false");

        for (key, value) in &config.client_properties {
            client_config.set(key, value);
        }

        let consumer: BaseConsumer = client_config
            .clone()
            .set("group.id", "kafkabeat-internal")
            .create()
            .map_err(BeatError::Kafka)?;

        let admin: AdminClient<DefaultClientContext> =
            client_config.create().map_err(BeatError::Kafka)?;

        Ok(Self {
            consumer: Arc::new(consumer),
            admin: Arc::new(admin),
            bootstrap_servers: config.bootstrap_servers.clone(),
            timeout: config.kafka_timeout,
        })
    }
}

/// Run a blocking librdkafka call off the async runtime. A failed join is
/// reported with the same error kind as the call itself.
async fn run_blocking<T, F>(kind: fn(String) -> BeatError, call: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| kind(format!("blocking task failed: {e}")))?
}

#[async_trait::async_trait]
impl ClusterDirectory for KafkaClient {
    #[instrument(skip(self), fields(bootstrap = %self.bootstrap_servers))]
    async fn resolve_brokers(&self) -> Result<Vec<String>> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout;

        run_blocking(BeatError::Connectivity, move || {
            let metadata = consumer
                .fetch_metadata(None, timeout)
                .map_err(|e| BeatError::Connectivity(e.to_string()))?;

            Ok(metadata
                .brokers()
                .iter()
                .map(|b| format!("{}:{}", b.host(), b.port()))
                .collect())
        })
        .await
    }

    #[instrument(skip(self), fields(bootstrap = %self.bootstrap_servers))]
    async fn resolve_groups(&self) -> Result<Vec<String>> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout;

        run_blocking(BeatError::Connectivity, move || {
            let group_list = consumer
                .fetch_group_list(None, timeout)
                .map_err(|e| BeatError::Connectivity(e.to_string()))?;

            let groups: Vec<String> = group_list
                .groups()
                .iter()
                .map(|g| g.name().to_string())
                .collect();

            debug!(count = groups.len(), "Listed consumer groups");
            Ok(groups)
        })
        .await
    }
}

#[async_trait::async_trait]
impl BrokerClient for KafkaClient {
    type Coordinator = GroupCoordinator;

    #[instrument(skip(self))]
    async fn list_topics(&self) -> Result<Vec<String>> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout;

        run_blocking(BeatError::Broker, move || {
            let metadata = consumer
                .fetch_metadata(None, timeout)
                .map_err(|e| BeatError::Broker(e.to_string()))?;

            Ok(metadata
                .topics()
                .iter()
                .map(|t| t.name().to_string())
                .collect())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_partitions(&self, topic: &str) -> Result<Vec<i32>> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout;
        let topic = topic.to_string();

        run_blocking(BeatError::Broker, move || {
            let metadata = consumer
                .fetch_metadata(Some(&topic), timeout)
                .map_err(|e| BeatError::Broker(e.to_string()))?;

            let Some(entry) = metadata.topics().iter().find(|t| t.name() == topic) else {
                return Err(BeatError::Broker(format!(
                    "topic {topic} missing from metadata"
                )));
            };

            if let Some(err) = entry.error() {
                return Err(BeatError::Broker(format!("topic {topic}: {err:?}")));
            }

            Ok(entry.partitions().iter().map(|p| p.id()).collect())
        })
        .await
    }

    async fn fetch_log_end_offset(&self, topic: &str, partition: i32) -> Result<i64> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout;
        let topic = topic.to_string();

        run_blocking(BeatError::Broker, move || {
            let (_low, high) = consumer
                .fetch_watermarks(&topic, partition, timeout)
                .map_err(|e| BeatError::Broker(e.to_string()))?;
            Ok(high)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn resolve_group_coordinator(&self, group: &str) -> Result<GroupCoordinator> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout;
        let group = group.to_string();

        run_blocking(BeatError::Coordinator, move || {
            let group_list = consumer
                .fetch_group_list(Some(&group), timeout)
                .map_err(|e| BeatError::Coordinator(format!("group {group}: {e}")))?;

            let Some(info) = group_list.groups().iter().find(|g| g.name() == group) else {
                return Err(BeatError::Coordinator(format!(
                    "group {group} not described by its coordinator"
                )));
            };

            let coordinator = GroupCoordinator {
                group: group.clone(),
                state: info.state().to_string(),
            };
            debug!(group = %coordinator.group, state = %coordinator.state, "Resolved group coordinator");
            Ok(coordinator)
        })
        .await
    }

    #[instrument(skip(self, coordinator, partitions), fields(group = %coordinator.group(), count = partitions.len()))]
    async fn fetch_committed_offsets(
        &self,
        coordinator: &GroupCoordinator,
        topic: &str,
        partitions: &[i32],
    ) -> Result<BTreeMap<i32, Option<i64>>> {
        let admin = Arc::clone(&self.admin);
        let timeout = self.timeout;
        let group = coordinator.group.clone();
        let topic = topic.to_string();
        let partitions = partitions.to_vec();

        run_blocking(BeatError::Coordinator, move || {
            list_group_offsets(&admin, &group, &topic, &partitions, timeout)
        })
        .await
    }
}

/// Interpret one partition of a committed-offset response. Per-partition
/// errors and the "no offset" sentinel both read as absent.
fn committed_entry(
    group: &str,
    topic: &str,
    partition: i32,
    offset: i64,
    err: rd_kafka_resp_err_t,
) -> Option<i64> {
    if err != rd_kafka_resp_err_t::RD_KAFKA_RESP_ERR_NO_ERROR {
        warn!(
            group,
            topic,
            partition,
            error = ?err,
            "Committed offset unavailable for partition"
        );
        return None;
    }
    (offset >= 0).then_some(offset)
}

/// ListConsumerGroupOffsets over the admin handle's native client.
/// Blocks up to `timeout`.
#[allow(clippy::too_many_lines)]
fn list_group_offsets(
    admin: &AdminClient<DefaultClientContext>,
    group: &str,
    topic: &str,
    partitions: &[i32],
    timeout: Duration,
) -> Result<BTreeMap<i32, Option<i64>>> {
    use rdkafka::bindings::*;

    let group_cstr = CString::new(group)
        .map_err(|e| BeatError::Coordinator(format!("group name contains null byte: {e}")))?;
    let topic_cstr = CString::new(topic)
        .map_err(|e| BeatError::Coordinator(format!("topic name contains null byte: {e}")))?;
    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    let capacity = i32::try_from(partitions.len()).unwrap_or(i32::MAX);

    // Owns every native handle created below.
    struct Handles {
        tpl: *mut rd_kafka_topic_partition_list_t,
        request: *mut rd_kafka_ListConsumerGroupOffsets_t,
        options: *mut rd_kafka_AdminOptions_t,
        queue: *mut rd_kafka_queue_t,
        event: *mut rd_kafka_event_t,
    }

    impl Drop for Handles {
        fn drop(&mut self) {
            unsafe {
                if !self.event.is_null() {
                    rd_kafka_event_destroy(self.event);
                }
                if !self.queue.is_null() {
                    rd_kafka_queue_destroy(self.queue);
                }
                if !self.options.is_null() {
                    rd_kafka_AdminOptions_destroy(self.options);
                }
                if !self.request.is_null() {
                    rd_kafka_ListConsumerGroupOffsets_destroy(self.request);
                }
                if !self.tpl.is_null() {
                    rd_kafka_topic_partition_list_destroy(self.tpl);
                }
            }
        }
    }

    unsafe {
        let rk = admin.inner().native_ptr();

        let mut handles = Handles {
            tpl: rd_kafka_topic_partition_list_new(capacity),
            request: std::ptr::null_mut(),
            options: std::ptr::null_mut(),
            queue: std::ptr::null_mut(),
            event: std::ptr::null_mut(),
        };
        if handles.tpl.is_null() {
            return Err(BeatError::Coordinator(
                "failed to allocate partition list".to_string(),
            ));
        }
        for partition in partitions {
            rd_kafka_topic_partition_list_add(handles.tpl, topic_cstr.as_ptr(), *partition);
        }

        // The request copies the partition list.
        handles.request = rd_kafka_ListConsumerGroupOffsets_new(group_cstr.as_ptr(), handles.tpl);
        if handles.request.is_null() {
            return Err(BeatError::Coordinator(
                "failed to build offset request".to_string(),
            ));
        }

        handles.options = rd_kafka_AdminOptions_new(
            rk,
            rd_kafka_admin_op_t::RD_KAFKA_ADMIN_OP_LISTCONSUMERGROUPOFFSETS,
        );
        if handles.options.is_null() {
            return Err(BeatError::Coordinator(
                "failed to build admin options".to_string(),
            ));
        }

        let mut errstr = [0 as c_char; 512];
        let err = rd_kafka_AdminOptions_set_request_timeout(
            handles.options,
            timeout_ms,
            errstr.as_mut_ptr(),
            errstr.len(),
        );
        if err != rd_kafka_resp_err_t::RD_KAFKA_RESP_ERR_NO_ERROR {
            let message = CStr::from_ptr(errstr.as_ptr()).to_string_lossy();
            return Err(BeatError::Coordinator(format!(
                "failed to set request timeout: {message}"
            )));
        }

        handles.queue = rd_kafka_queue_new(rk);
        if handles.queue.is_null() {
            return Err(BeatError::Coordinator("failed to create result queue".to_string()));
        }

        let mut request = handles.request;
        rd_kafka_ListConsumerGroupOffsets(rk, &mut request, 1, handles.options, handles.queue);
        // Consumed by the call.
        handles.request = std::ptr::null_mut();

        handles.event = rd_kafka_queue_poll(handles.queue, timeout_ms);
        if handles.event.is_null() {
            return Err(BeatError::Coordinator(format!(
                "offset fetch for group {group} timed out"
            )));
        }

        let event_type = rd_kafka_event_type(handles.event);
        if event_type != RD_KAFKA_EVENT_LISTCONSUMERGROUPOFFSETS_RESULT {
            return Err(BeatError::Coordinator(format!(
                "unexpected admin event type {event_type}"
            )));
        }

        if rd_kafka_event_error(handles.event) != rd_kafka_resp_err_t::RD_KAFKA_RESP_ERR_NO_ERROR {
            let message = rd_kafka_event_error_string(handles.event);
            let message = if message.is_null() {
                "unknown error".to_string()
            } else {
                CStr::from_ptr(message).to_string_lossy().to_string()
            };
            return Err(BeatError::Coordinator(format!(
                "offset fetch for group {group} failed: {message}"
            )));
        }

        let result = rd_kafka_event_ListConsumerGroupOffsets_result(handles.event);
        if result.is_null() {
            return Err(BeatError::Coordinator("empty offset fetch result".to_string()));
        }

        let mut group_count: usize = 0;
        let groups = rd_kafka_ListConsumerGroupOffsets_result_groups(result, &mut group_count);

        let mut offsets = BTreeMap::new();
        for i in 0..group_count {
            let group_result = *groups.add(i);

            let group_error = rd_kafka_group_result_error(group_result);
            if !group_error.is_null()
                && rd_kafka_error_code(group_error) != rd_kafka_resp_err_t::RD_KAFKA_RESP_ERR_NO_ERROR
            {
                let message = rd_kafka_error_string(group_error);
                let message = if message.is_null() {
                    "unknown error".to_string()
                } else {
                    CStr::from_ptr(message).to_string_lossy().to_string()
                };
                return Err(BeatError::Coordinator(format!("group {group}: {message}")));
            }

            let list = rd_kafka_group_result_partitions(group_result);
            if list.is_null() {
                continue;
            }

            let count = usize::try_from((*list).cnt).unwrap_or(0);
            for j in 0..count {
                let elem = &*(*list).elems.add(j);
                if CStr::from_ptr(elem.topic).to_bytes() != topic.as_bytes() {
                    continue;
                }
                offsets.insert(
                    elem.partition,
                    committed_entry(group, topic, elem.partition, elem.offset, elem.err),
                );
            }
        }

        debug!(
            group,
            topic,
            partitions = offsets.len(),
            "Fetched committed offsets"
        );
        Ok(offsets)
    }
}

impl std::fmt::Debug for KafkaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaClient")
            .field("bootstrap_servers", &self.bootstrap_servers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
