use std::collections::BTreeMap;

/// Label set, kept sorted so rendering is stable.
pub type Labels = BTreeMap<&'static str, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub name: &'static str,
    pub labels: Labels,
    pub value: f64,
    pub help: &'static str,
}

impl MetricPoint {
    pub fn gauge(name: &'static str, labels: Labels, value: f64, help: &'static str) -> Self {
        Self {
            name,
            labels,
            value,
            help,
        }
    }
}
