#[cfg(test)]
pub mod strategies {
    use proptest::prelude::*;

    /// A plausible partition offset
    pub fn arb_offset() -> impl Strategy<Value = i64> {
        0..i64::MAX / 2
    }

    /// (log_end, committed) pair. The commit may sit above the log end, which
    /// happens after truncation.
    pub fn arb_log_end_and_committed() -> impl Strategy<Value = (i64, i64)> {
        arb_offset().prop_flat_map(|log_end| (Just(log_end), 0..=log_end.saturating_add(1_000)))
    }

    /// Log sizes for a handful of partitions
    pub fn arb_log_sizes() -> impl Strategy<Value = Vec<(i32, i64)>> {
        proptest::collection::btree_map(0..16i32, 0..1_000_000i64, 0..8)
            .prop_map(|sizes| sizes.into_iter().collect())
    }

    /// Non-empty topic or group name
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9._-]{0,30}"
    }
}
