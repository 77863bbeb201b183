//! In-memory collaborators for exercising samplers and the scheduler.

use crate::collector::event_builder::MetricEvent;
use crate::error::{BeatError, Result};
use crate::kafka::{BrokerClient, ClusterDirectory};
use crate::publish::EventSink;
use crate::scheduler::TickReport;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct FakeCluster {
    brokers: Vec<String>,
    groups: Vec<String>,
    topics: BTreeMap<String, BTreeMap<i32, i64>>,
    unlistable_topics: HashSet<String>,
    failing_partitions: HashSet<(String, i32)>,
    commits: HashMap<(String, String), BTreeMap<i32, i64>>,
    unreachable_coordinators: HashSet<String>,
    failing_fetches: HashSet<String>,
    directory_down: bool,
    fetch_delay: Duration,
    slow_fetches: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            brokers: vec!["broker-1:9092".to_string()],
            ..Self::default()
        }
    }

    pub fn without_brokers(mut self) -> Self {
        self.brokers.clear();
        self
    }

    pub fn with_directory_down(mut self) -> Self {
        self.directory_down = true;
        self
    }

    pub fn with_topic(mut self, topic: &str, log_sizes: &[(i32, i64)]) -> Self {
        self.topics
            .insert(topic.to_string(), log_sizes.iter().copied().collect());
        self
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.groups.push(group.to_string());
        self
    }

    /// Record committed offsets. A negative offset is returned verbatim, the
    /// way a broker reports "no offset".
    pub fn with_commits(mut self, group: &str, topic: &str, offsets: &[(i32, i64)]) -> Self {
        self.commits.insert(
            (group.to_string(), topic.to_string()),
            offsets.iter().copied().collect(),
        );
        self
    }

    pub fn failing_listing(mut self, topic: &str) -> Self {
        self.unlistable_topics.insert(topic.to_string());
        self
    }

    pub fn failing_partition(mut self, topic: &str, partition: i32) -> Self {
        self.failing_partitions
            .insert((topic.to_string(), partition));
        self
    }

    pub fn failing_coordinator(mut self, group: &str) -> Self {
        self.unreachable_coordinators.insert(group.to_string());
        self
    }

    pub fn failing_fetch(mut self, group: &str) -> Self {
        self.failing_fetches.insert(group.to_string());
        self
    }

    /// Delay the next `count` log-end offset fetches by `delay`.
    pub fn with_slow_fetches(mut self, delay: Duration, count: usize) -> Self {
        self.fetch_delay = delay;
        self.slow_fetches = AtomicUsize::new(count);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl ClusterDirectory for FakeCluster {
    async fn resolve_brokers(&self) -> Result<Vec<String>> {
        if self.directory_down {
            return Err(BeatError::Connectivity("directory unreachable".to_string()));
        }
        Ok(self.brokers.clone())
    }

    async fn resolve_groups(&self) -> Result<Vec<String>> {
        if self.directory_down {
            return Err(BeatError::Connectivity("directory unreachable".to_string()));
        }
        Ok(self.groups.clone())
    }
}

#[async_trait::async_trait]
impl BrokerClient for FakeCluster {
    type Coordinator = String;

    async fn list_topics(&self) -> Result<Vec<String>> {
        Ok(self.topics.keys().cloned().collect())
    }

    async fn list_partitions(&self, topic: &str) -> Result<Vec<i32>> {
        self.record(format!("list_partitions {topic}"));
        if self.unlistable_topics.contains(topic) {
            return Err(BeatError::Broker(format!("cannot list {topic}")));
        }
        self.topics
            .get(topic)
            .map(|sizes| sizes.keys().copied().collect())
            .ok_or_else(|| BeatError::Broker(format!("unknown topic {topic}")))
    }

    async fn fetch_log_end_offset(&self, topic: &str, partition: i32) -> Result<i64> {
        let slow = self
            .slow_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if slow {
            tokio::time::sleep(self.fetch_delay).await;
        }
        if self
            .failing_partitions
            .contains(&(topic.to_string(), partition))
        {
            return Err(BeatError::Broker(format!("{topic}/{partition} unavailable")));
        }
        self.topics
            .get(topic)
            .and_then(|sizes| sizes.get(&partition).copied())
            .ok_or_else(|| BeatError::Broker(format!("unknown partition {topic}/{partition}")))
    }

    async fn resolve_group_coordinator(&self, group: &str) -> Result<String> {
        self.record(format!("resolve_coordinator {group}"));
        if self.unreachable_coordinators.contains(group) {
            return Err(BeatError::Coordinator(format!("no coordinator for {group}")));
        }
        Ok(group.to_string())
    }

    async fn fetch_committed_offsets(
        &self,
        coordinator: &String,
        topic: &str,
        partitions: &[i32],
    ) -> Result<BTreeMap<i32, Option<i64>>> {
        self.record(format!("fetch_offsets {coordinator} {topic} {partitions:?}"));
        if self.failing_fetches.contains(coordinator) {
            return Err(BeatError::Coordinator(format!("fetch failed for {coordinator}")));
        }
        let commits = self
            .commits
            .get(&(coordinator.clone(), topic.to_string()));
        Ok(partitions
            .iter()
            .map(|p| (*p, commits.and_then(|c| c.get(p).copied())))
            .collect())
    }
}

/// Sink keeping every emitted batch in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MetricEvent>>,
    batches: Mutex<usize>,
    ticks: Mutex<Vec<TickReport>>,
    started: Mutex<Vec<Instant>>,
    finished: Mutex<Vec<Instant>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn batches(&self) -> usize {
        *self.batches.lock().unwrap()
    }

    pub fn ticks(&self) -> Vec<TickReport> {
        self.ticks.lock().unwrap().clone()
    }

    /// (start, finish) instants of every completed tick.
    pub fn tick_spans(&self) -> Vec<(Instant, Instant)> {
        let started = self.started.lock().unwrap();
        let finished = self.finished.lock().unwrap();
        started.iter().copied().zip(finished.iter().copied()).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, events: Vec<MetricEvent>) {
        *self.batches.lock().unwrap() += 1;
        self.events.lock().unwrap().extend(events);
    }

    fn begin_tick(&self) {
        self.started.lock().unwrap().push(Instant::now());
    }

    fn finish_tick(&self, report: &TickReport) {
        self.finished.lock().unwrap().push(Instant::now());
        self.ticks.lock().unwrap().push(report.clone());
    }
}
