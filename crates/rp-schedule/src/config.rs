//! Engine configuration

/// Reconciliation engine configuration
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Target replica count when placement rules are disabled
    pub max_replicas: usize,
    /// Label keys defining the isolation dimension when rules are disabled
    pub location_labels: Vec<String>,
    /// A down peer is replaced only after being unreachable this long
    pub max_store_down_secs: u64,
    /// Regions below this size (MiB) are merge candidates
    pub max_merge_region_size: u64,
    /// Regions below this key count are merge candidates
    pub max_merge_region_keys: u64,
    /// A merge target must itself be at least this large (MiB)
    pub min_joinable_region_size: u64,
    /// Maximum concurrent leader-class operators touching one store
    pub leader_store_limit: usize,
    /// Maximum concurrent region-class operators touching one store
    pub region_store_limit: usize,
    /// Terminal operators retained for observability
    pub finished_operator_history: usize,
    /// Expiry sweep interval in seconds
    pub sweep_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            max_replicas: 3,
            location_labels: Vec::new(),
            max_store_down_secs: 30 * 60,
            max_merge_region_size: 20,
            max_merge_region_keys: 200_000,
            min_joinable_region_size: 1,
            leader_store_limit: 4,
            region_store_limit: 8,
            finished_operator_history: 128,
            sweep_interval_secs: 5,
        }
    }
}
