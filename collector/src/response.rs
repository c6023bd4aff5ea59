//! Wire types of `GET /metrics` and `GET /metrics/queue`.
//!
//! Every field defaults to zero/empty so partial payloads still decode.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Organization {
    pub(crate) slug: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Cluster {
    pub(crate) name: String,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default)]
pub(crate) struct AgentCounts {
    pub(crate) idle: u64,
    pub(crate) busy: u64,
    pub(crate) total: u64,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default)]
pub(crate) struct JobCounts {
    pub(crate) scheduled: u64,
    pub(crate) running: u64,
    pub(crate) waiting: u64,
    pub(crate) total: u64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AllAgents {
    #[serde(flatten)]
    pub(crate) counts: AgentCounts,
    #[serde(default)]
    pub(crate) queues: BTreeMap<String, AgentCounts>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AllJobs {
    #[serde(flatten)]
    pub(crate) counts: JobCounts,
    #[serde(default)]
    pub(crate) queues: BTreeMap<String, JobCounts>,
}

/// Response of the organization-wide `/metrics` resource.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AllMetrics {
    pub(crate) agents: AllAgents,
    pub(crate) jobs: AllJobs,
    pub(crate) organization: Option<Organization>,
    pub(crate) cluster: Option<Cluster>,
}

/// Response of the queue-scoped `/metrics/queue` resource.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct QueueMetrics {
    pub(crate) agents: AgentCounts,
    pub(crate) jobs: JobCounts,
    pub(crate) organization: Option<Organization>,
    pub(crate) cluster: Option<Cluster>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub(crate) message: String,
}

pub(crate) fn org_slug(organization: &Option<Organization>) -> Option<&str> {
    organization
        .as_ref()
        .map(|org| org.slug.as_str())
        .filter(|slug| !slug.is_empty())
}

pub(crate) fn cluster_name(cluster: &Option<Cluster>) -> String {
    cluster.as_ref().map(|c| c.name.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_payload_decodes_with_defaults() {
        let metrics: AllMetrics = serde_json::from_str(r#"{"organization": {"slug": "org-name"}}"#).unwrap();
        assert_eq!(org_slug(&metrics.organization), Some("org-name"));
        assert_eq!(cluster_name(&metrics.cluster), "");
        assert_eq!(metrics.agents.counts.total, 0);
        assert!(metrics.jobs.queues.is_empty());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let metrics: AllMetrics = serde_json::from_str(
            r#"{"organization": {"slug": "org-name"}, "jobs":{"scheduled":0,"running":0,"all":0,"queues":{}},"agents":{"idle":0,"busy":0,"all":0,"queues":{}}}"#,
        )
        .unwrap();
        assert_eq!(metrics.jobs.counts.scheduled, 0);
    }

    #[test]
    fn empty_slug_is_treated_as_missing() {
        let metrics: QueueMetrics = serde_json::from_str(r#"{"organization": {"slug": ""}}"#).unwrap();
        assert_eq!(org_slug(&metrics.organization), None);
    }
}
