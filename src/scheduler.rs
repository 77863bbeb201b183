use crate::collector::event_builder::EventBuilder;
use crate::collector::group_sampler::GroupOffsetSampler;
use crate::collector::partition_sampler::PartitionSampler;
use crate::config::BeatConfig;
use crate::error::{BeatError, Result};
use crate::kafka::{BrokerClient, ClusterDirectory};
use crate::publish::EventSink;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Topics and groups monitored for the lifetime of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    pub topics: Vec<String>,
    pub groups: Vec<String>,
}

/// One-time start-up discovery. Configured names are used verbatim;
/// discovered names go through the blacklists.
#[instrument(skip_all)]
pub async fn resolve_targets<D, B>(config: &BeatConfig, directory: &D, client: &B) -> Result<Targets>
where
    D: ClusterDirectory,
    B: BrokerClient,
{
    let brokers = directory.resolve_brokers().await?;
    if brokers.is_empty() {
        return Err(BeatError::Connectivity(format!(
            "no brokers found via {}",
            config.bootstrap_servers
        )));
    }
    info!(brokers = ?brokers, "Resolved brokers");

    let filters = config.compile_filters()?;

    let topics = match config.explicit_topics() {
        Some(topics) => topics.to_vec(),
        None => {
            let mut discovered: Vec<String> = client
                .list_topics()
                .await?
                .into_iter()
                .filter(|t| filters.keeps_topic(t))
                .collect();
            discovered.sort();
            info!(topics = discovered.len(), "Discovered topics");
            discovered
        }
    };

    let groups = match config.explicit_groups() {
        Some(groups) => groups.to_vec(),
        None => {
            let mut discovered: Vec<String> = directory
                .resolve_groups()
                .await?
                .into_iter()
                .filter(|g| filters.keeps_group(g))
                .collect();
            discovered.sort();
            info!(groups = discovered.len(), "Discovered consumer groups");
            discovered
        }
    };

    if topics.is_empty() {
        warn!("No topics to monitor, ticks will emit nothing");
    }

    Ok(Targets { topics, groups })
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub topics: usize,
    pub topic_events: usize,
    pub consumer_events: usize,
    pub failed_topics: usize,
    pub failed_partitions: usize,
    pub failed_groups: usize,
    pub stopped_early: bool,
    pub duration: Duration,
}

impl TickReport {
    /// A tick is unhealthy only when every processed topic failed its
    /// partition listing.
    pub fn is_healthy(&self) -> bool {
        self.topics == 0 || self.failed_topics < self.topics
    }
}

pub struct Scheduler<B: BrokerClient> {
    partitions: PartitionSampler<B>,
    offsets: GroupOffsetSampler<B>,
    sink: Arc<dyn EventSink>,
    targets: Targets,
    period: Duration,
    max_concurrent_groups: usize,
}

impl<B: BrokerClient> Scheduler<B> {
    pub fn new(client: Arc<B>, sink: Arc<dyn EventSink>, targets: Targets, config: &BeatConfig) -> Self {
        info!(
            topics = targets.topics.len(),
            groups = targets.groups.len(),
            period = ?config.period,
            "Creating scheduler"
        );

        Self {
            partitions: PartitionSampler::new(Arc::clone(&client), config.max_concurrent_fetches),
            offsets: GroupOffsetSampler::new(client),
            sink,
            targets,
            period: config.period,
            max_concurrent_groups: config.max_concurrent_groups.max(1),
        }
    }

    /// Tick every period until the shutdown channel fires. The first tick
    /// runs one period after start; a slow tick delays the next one.
    #[instrument(skip_all)]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting tick loop");

        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.tick(&mut shutdown).await;
                    if report.stopped_early {
                        info!("Shutdown observed during tick");
                        break;
                    }
                }
            }
        }

        info!("Tick loop stopped");
    }

    /// Sample every topic in order, then every group on that topic.
    /// Stop is checked before each topic; in-flight calls are awaited.
    pub async fn tick(&self, shutdown: &mut broadcast::Receiver<()>) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::default();
        self.sink.begin_tick();

        for topic in &self.targets.topics {
            if stop_requested(shutdown) {
                report.stopped_early = true;
                break;
            }
            report.topics += 1;

            let sample = self.partitions.sample(topic).await;
            if sample.listing_failed() {
                report.failed_topics += 1;
            }
            report.failed_partitions += sample.failed_partitions();

            let topic_events = EventBuilder::topic_events(&sample);
            report.topic_events += topic_events.len();
            if !topic_events.is_empty() {
                self.sink.emit(topic_events);
            }

            let log_sizes = sample.log_sizes();
            if log_sizes.is_empty() {
                debug!(topic = %topic, "No log sizes this tick, skipping groups");
                continue;
            }

            let log_sizes = &log_sizes;
            let group_futures: Vec<_> = self
                .targets
                .groups
                .iter()
                .map(|group| self.offsets.sample(group, topic, log_sizes))
                .collect();
            let group_samples: Vec<_> = futures::stream::iter(group_futures)
                .buffered(self.max_concurrent_groups)
                .collect()
                .await;

            let mut consumer_events = Vec::new();
            for group_sample in &group_samples {
                if group_sample.offsets.is_err() {
                    report.failed_groups += 1;
                }
                consumer_events.extend(EventBuilder::consumer_events(group_sample, log_sizes));
            }
            report.consumer_events += consumer_events.len();
            if !consumer_events.is_empty() {
                self.sink.emit(consumer_events);
            }
        }

        report.duration = start.elapsed();
        self.sink.finish_tick(&report);

        info!(
            topics = report.topics,
            topic_events = report.topic_events,
            consumer_events = report.consumer_events,
            failed_topics = report.failed_topics,
            failed_partitions = report.failed_partitions,
            failed_groups = report.failed_groups,
            stopped_early = report.stopped_early,
            duration_ms = %report.duration.as_millis(),
            "Tick completed"
        );

        if report.duration > self.period {
            warn!(
                duration_ms = %report.duration.as_millis(),
                period_ms = %self.period.as_millis(),
                "Tick took longer than the period, next tick delayed"
            );
        }

        report
    }
}

// A lagged or closed channel means a stop was sent or can no longer arrive.
fn stop_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}
