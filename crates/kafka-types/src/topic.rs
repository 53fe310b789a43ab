/// Topic details displayed above the record table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    pub name: String,
    pub is_internal: bool,
    pub partition_count: usize,
    /// `cleanup.policy` contains `compact`
    pub is_compacted: bool,
    /// Sum of `high - low` watermarks over all partitions. Compaction and
    /// transaction markers make this an estimate.
    pub message_count: u64,
}

impl TopicMetadata {
    /// Topics managed by the broker itself, e.g. `__consumer_offsets`.
    pub fn is_internal_name(name: &str) -> bool {
        name.starts_with("__")
    }
}
