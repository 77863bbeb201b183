use crate::collector::event_builder::{EventKind, MetricEvent};
use crate::metrics::definitions::{
    HELP_CONSUMER_LAG, HELP_CONSUMER_OFFSET, HELP_LAST_TICK_TIMESTAMP, HELP_TICK_DURATION_SECONDS,
    HELP_TOPIC_LOG_SIZE, HELP_UP, LABEL_GROUP, LABEL_PARTITION, LABEL_TOPIC, METRIC_CONSUMER_LAG,
    METRIC_CONSUMER_OFFSET, METRIC_LAST_TICK_TIMESTAMP, METRIC_TICK_DURATION_SECONDS,
    METRIC_TOPIC_LOG_SIZE, METRIC_UP,
};
use crate::metrics::types::{Labels, MetricPoint};
use crate::publish::EventSink;
use crate::scheduler::TickReport;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Event sink keeping the latest completed tick for Prometheus scraping.
///
/// Points emitted during a tick are staged per topic and only replace the
/// published set in `finish_tick`, so a scrape never observes half a tick.
pub struct MetricsRegistry {
    staged: DashMap<String, Vec<MetricPoint>>,
    published: RwLock<Vec<MetricPoint>>,
    healthy: AtomicBool,
    last_tick_duration_ms: AtomicU64,
    last_tick_timestamp: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            staged: DashMap::new(),
            published: RwLock::new(Vec::new()),
            healthy: AtomicBool::new(true),
            last_tick_duration_ms: AtomicU64::new(0),
            last_tick_timestamp: AtomicU64::new(0),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Whether at least one tick has been published.
    pub fn has_published(&self) -> bool {
        self.last_tick_timestamp.load(Ordering::SeqCst) > 0
    }

    #[cfg(test)]
    pub fn published_len(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn tick_duration_seconds(&self) -> f64 {
        self.last_tick_duration_ms.load(Ordering::SeqCst) as f64 / 1000.0
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();
        let published = self
            .published
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut by_name: BTreeMap<&str, Vec<&MetricPoint>> = BTreeMap::new();
        for point in published.iter() {
            by_name.entry(point.name).or_default().push(point);
        }

        for (name, points) in by_name {
            let help = points[0].help;
            output.push_str(format!("# HELP {name} {help}\n").as_str());
            output.push_str(format!("# TYPE {name} gauge\n").as_str());
            for point in points {
                let labels = render_labels(&point.labels);
                output.push_str(format!("{name}{labels} {}\n", point.value).as_str());
            }
        }

        let tick_duration = self.tick_duration_seconds();
        output.push_str(
            format!("# HELP {METRIC_TICK_DURATION_SECONDS} {HELP_TICK_DURATION_SECONDS}\n")
                .as_str(),
        );
        output.push_str(format!("# TYPE {METRIC_TICK_DURATION_SECONDS} gauge\n").as_str());
        output.push_str(format!("{METRIC_TICK_DURATION_SECONDS} {tick_duration:.6}\n").as_str());

        output.push_str(format!("# HELP {METRIC_UP} {HELP_UP}\n").as_str());
        output.push_str(format!("# TYPE {METRIC_UP} gauge\n").as_str());
        output.push_str(format!("{METRIC_UP} {}\n", i32::from(self.is_healthy())).as_str());

        let last_tick = self.last_tick_timestamp.load(Ordering::SeqCst);
        if last_tick > 0 {
            output.push_str(
                format!("# HELP {METRIC_LAST_TICK_TIMESTAMP} {HELP_LAST_TICK_TIMESTAMP}\n")
                    .as_str(),
            );
            output.push_str(format!("# TYPE {METRIC_LAST_TICK_TIMESTAMP} gauge\n").as_str());
            output.push_str(format!("{METRIC_LAST_TICK_TIMESTAMP} {last_tick}\n").as_str());
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MetricsRegistry {
    fn begin_tick(&self) {
        self.staged.clear();
    }

    fn emit(&self, events: Vec<MetricEvent>) {
        for event in &events {
            self.staged
                .entry(event.topic().to_string())
                .or_default()
                .extend(build_event_points(event));
        }
    }

    fn finish_tick(&self, report: &TickReport) {
        if report.stopped_early {
            debug!("Tick interrupted, keeping previously published metrics");
            self.staged.clear();
            return;
        }

        let topics: Vec<String> = self.staged.iter().map(|e| e.key().clone()).collect();
        let mut points = Vec::new();
        for topic in topics {
            if let Some((_, topic_points)) = self.staged.remove(&topic) {
                points.extend(topic_points);
            }
        }
        points.sort_by(|a, b| a.name.cmp(b.name).then_with(|| a.labels.cmp(&b.labels)));
        debug!(points = points.len(), "Publishing tick metrics");

        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = points;

        let unix_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = report.duration.as_millis() as u64;
        self.last_tick_duration_ms
            .store(duration_ms, Ordering::SeqCst);
        self.last_tick_timestamp
            .store(unix_timestamp.max(1), Ordering::SeqCst);
        self.set_healthy(report.is_healthy());
    }
}

/// Metric points carried by one event.
#[allow(clippy::cast_precision_loss)]
pub fn build_event_points(event: &MetricEvent) -> Vec<MetricPoint> {
    let mut labels = Labels::new();
    labels.insert(LABEL_TOPIC, event.topic().to_string());
    labels.insert(LABEL_PARTITION, event.partition().to_string());

    match event.kind() {
        EventKind::Topic { log_size } => vec![MetricPoint::gauge(
            METRIC_TOPIC_LOG_SIZE,
            labels,
            *log_size as f64,
            HELP_TOPIC_LOG_SIZE,
        )],
        EventKind::Consumer { group, offset, lag } => {
            labels.insert(LABEL_GROUP, group.clone());
            let mut points = vec![MetricPoint::gauge(
                METRIC_CONSUMER_OFFSET,
                labels.clone(),
                *offset as f64,
                HELP_CONSUMER_OFFSET,
            )];
            if let Some(lag) = lag {
                points.push(MetricPoint::gauge(
                    METRIC_CONSUMER_LAG,
                    labels,
                    *lag as f64,
                    HELP_CONSUMER_LAG,
                ));
            }
            points
        }
    }
}

fn render_labels(labels: &Labels) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let label_str = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect::<Vec<_>>()
        .join(",");

    format!("{{{label_str}}}")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
