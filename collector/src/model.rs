use serde::Serialize;
use std::{
    collections::BTreeMap,
    time::Duration,
};
use strum::{
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
};

/// The fixed set of counters reported for the organization and for every queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, AsRefStr, Display, EnumIter, EnumString, Serialize,
)]
pub enum MetricName {
    ScheduledJobsCount,
    RunningJobsCount,
    UnfinishedJobsCount,
    WaitingJobsCount,
    IdleAgentCount,
    BusyAgentCount,
    TotalAgentCount,
    BusyAgentPercentage,
}

impl MetricName {
    pub const JOBS: [MetricName; 4] = [
        MetricName::ScheduledJobsCount,
        MetricName::RunningJobsCount,
        MetricName::UnfinishedJobsCount,
        MetricName::WaitingJobsCount,
    ];

    pub const AGENTS: [MetricName; 4] = [
        MetricName::IdleAgentCount,
        MetricName::BusyAgentCount,
        MetricName::TotalAgentCount,
        MetricName::BusyAgentPercentage,
    ];
}

pub type Counts = BTreeMap<MetricName, u64>;

/// One snapshot per poll per token.
///
/// `totals` is only populated when all queues are polled; a queue-scoped poll leaves it empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsResult {
    pub totals: Counts,
    pub queues: BTreeMap<String, Counts>,
    pub org: String,
    /// Empty for unclustered agents.
    pub cluster: String,
    /// Zero when the server gave no advice.
    pub poll_duration: Duration,
}

impl MetricsResult {
    /// Returns the counters of `queue`, creating an empty map the first time it is seen.
    pub fn queue_mut(&mut self, queue: &str) -> &mut Counts {
        self.queues.entry(queue.to_string()).or_default()
    }

    /// Number of individual gauges in this result.
    pub fn metric_count(&self) -> usize {
        self.totals.len() + self.queues.values().map(BTreeMap::len).sum::<usize>()
    }

    pub fn dump(&self) {
        for (name, value) in &self.totals {
            info!("Buildkite > Org={} > {}={}", self.org, name, value);
        }
        for (queue, counts) in &self.queues {
            for (name, value) in counts {
                info!("Buildkite > Org={} > Queue={} > {}={}", self.org, queue, name, value);
            }
        }
    }
}

/// `floor(100 * busy / total)`, or 0 when there are no agents at all.
pub fn busy_agent_percentage(busy: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    busy.saturating_mul(100) / total
}
