use crate::collector::{CommittedOffsets, LogSizes};
use std::collections::BTreeMap;
use tracing::debug;

pub struct LagCalculator;

impl LagCalculator {
    /// Lag of a group on one partition, defined only when both the log-end
    /// offset and the committed offset were sampled. Negative values are kept:
    /// they mean the log shrank below the commit (truncation or compaction).
    ///
    /// Broker offsets are non-negative; a difference outside `i64` yields
    /// `None` rather than a wrapped value.
    pub fn lag(log_end: Option<i64>, committed: Option<i64>) -> Option<i64> {
        let (log_end, committed) = (log_end?, committed?);
        let lag = log_end.checked_sub(committed);
        if lag.is_none() {
            debug!(log_end, committed, "Lag outside the offset range, omitted");
        }
        lag
    }

    /// Lag for every committed partition of a group on one topic.
    pub fn partition_lags(
        log_sizes: &LogSizes,
        offsets: &CommittedOffsets,
    ) -> BTreeMap<i32, Option<i64>> {
        offsets
            .iter()
            .map(|(partition, offset)| {
                let lag = Self::lag(log_sizes.get(partition).copied(), Some(*offset));
                (*partition, lag)
            })
            .collect()
    }
}
