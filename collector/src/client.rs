use crate::{
    error::CollectError,
    model::{
        busy_agent_percentage,
        MetricName,
        MetricsResult,
    },
    response::{
        cluster_name,
        org_slug,
        AgentCounts,
        AllMetrics,
        ApiErrorBody,
        JobCounts,
        QueueMetrics,
    },
};
use reqwest::{
    header::{
        HeaderMap,
        HeaderValue,
        AUTHORIZATION,
        CONTENT_TYPE,
        USER_AGENT,
    },
    Response,
    StatusCode,
};
use std::{
    fmt,
    time::Duration,
};
use strum::IntoEnumIterator;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://agent.buildkite.com/v3";

/// Advisory minimum number of seconds before the next poll.
pub const POLL_DURATION_HEADER: &str = "Buildkite-Agent-Metrics-Poll-Duration";

/// Build the HTTP client shared by every [`MetricsClient`] of a batch.
///
/// `max_idle_conns` follows the usual convention: `0` means no limit, a negative value disables
/// connection reuse.
pub fn build_http_client(timeout: Duration, max_idle_conns: i64) -> Result<reqwest::Client, CollectError> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .pool_idle_timeout(timeout);

    if let Some(max_idle) = max_idle_per_host(max_idle_conns) {
        builder = builder.pool_max_idle_per_host(max_idle);
    }

    Ok(builder.build()?)
}

/// Pool limit for `max_idle_conns`, `None` when unlimited.
fn max_idle_per_host(max_idle_conns: i64) -> Option<usize> {
    match max_idle_conns {
        n if n < 0 => Some(0),
        0 => None,
        n => Some(usize::try_from(n).unwrap_or(usize::MAX)),
    }
}

/// Polls the metrics API with a single agent token.
#[derive(Clone)]
pub struct MetricsClient {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
    user_agent: String,
    queues: Vec<String>,
    debug_http: bool,
}

impl fmt::Debug for MetricsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("token", &"[REDACTED]")
            .field("user_agent", &self.user_agent)
            .field("queues", &self.queues)
            .finish()
    }
}

impl MetricsClient {
    pub fn new(http: reqwest::Client, endpoint: Url, token: impl Into<String>) -> Self {
        Self {
            http,
            endpoint,
            token: token.into(),
            user_agent: format!("buildkite-agent-metrics/{}", env!("CARGO_PKG_VERSION")),
            queues: Vec::new(),
            debug_http: false,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Restrict polling to these queues. An empty list polls the whole organization.
    pub fn with_queues(mut self, queues: impl IntoIterator<Item = String>) -> Self {
        self.queues = queues.into_iter().collect();
        self
    }

    /// Log requests and responses at trace level. The token is redacted.
    pub fn with_debug_http(mut self, debug_http: bool) -> Self {
        self.debug_http = debug_http;
        self
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    pub async fn collect(&self) -> Result<MetricsResult, CollectError> {
        let mut result = MetricsResult::default();

        if self.queues.is_empty() {
            self.collect_all_queues(&mut result).await?;
        } else {
            for queue in &self.queues {
                self.collect_queue(&mut result, queue).await?;
            }
        }

        result.dump();
        Ok(result)
    }

    async fn collect_all_queues(&self, result: &mut MetricsResult) -> Result<(), CollectError> {
        info!("Collecting agent metrics for all queues");

        let url = self.resource_url("metrics");
        let (body, poll_duration) = self.fetch(url).await?;
        let metrics: AllMetrics = serde_json::from_slice(&body)?;

        let org = org_slug(&metrics.organization).ok_or(CollectError::MissingOrganization)?;
        let cluster = cluster_name(&metrics.cluster);
        info!(org = %org, cluster = %cluster, "Found organization");

        result.org = org.to_string();
        result.cluster = cluster;
        result.poll_duration = poll_duration.unwrap_or_default();

        insert_jobs(&mut result.totals, &metrics.jobs.counts);
        insert_agents(&mut result.totals, &metrics.agents.counts);

        // A queue may only show up in one of the two sub-trees.
        for (queue, jobs) in &metrics.jobs.queues {
            insert_jobs(result.queue_mut(queue), jobs);
        }
        for (queue, agents) in &metrics.agents.queues {
            insert_agents(result.queue_mut(queue), agents);
        }
        for counts in result.queues.values_mut() {
            for name in MetricName::iter() {
                counts.entry(name).or_insert(0);
            }
        }

        Ok(())
    }

    async fn collect_queue(&self, result: &mut MetricsResult, queue: &str) -> Result<(), CollectError> {
        info!(queue, "Collecting agent metrics for queue");

        let mut url = self.resource_url("metrics/queue");
        url.query_pairs_mut().append_pair("name", queue);
        let (body, poll_duration) = self.fetch(url).await?;
        let metrics: QueueMetrics = serde_json::from_slice(&body)?;

        let org = org_slug(&metrics.organization).ok_or(CollectError::MissingOrganization)?;
        let cluster = cluster_name(&metrics.cluster);
        info!(org = %org, cluster = %cluster, "Found organization");

        result.org = org.to_string();
        result.cluster = cluster;
        if let Some(poll_duration) = poll_duration {
            result.poll_duration = result.poll_duration.max(poll_duration);
        }

        let counts = result.queue_mut(queue);
        insert_jobs(counts, &metrics.jobs);
        insert_agents(counts, &metrics.agents);

        Ok(())
    }

    fn resource_url(&self, resource: &str) -> Url {
        let mut url = self.endpoint.clone();
        let path = format!("{}/{resource}", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url
    }

    /// Issue the GET and return the body of a 200 response together with the advisory poll duration.
    async fn fetch(&self, url: Url) -> Result<(Vec<u8>, Option<Duration>), CollectError> {
        let request = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .build()?;

        if self.debug_http {
            trace!(
                method = %request.method(),
                uri = %request.url(),
                headers = ?redacted(request.headers()),
                "request"
            );
        }

        let response = self.http.execute(request).await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(CollectError::Unauthorized);
        }

        if status != StatusCode::OK {
            return Err(error_from_response(response).await);
        }

        let poll_duration = poll_duration(response.headers());
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        if self.debug_http {
            trace!(
                %status,
                headers = ?headers,
                body = %String::from_utf8_lossy(&body),
                "response"
            );
        }

        Ok((body.to_vec(), poll_duration))
    }
}

fn insert_jobs(counts: &mut crate::Counts, jobs: &JobCounts) {
    counts.insert(MetricName::ScheduledJobsCount, jobs.scheduled);
    counts.insert(MetricName::RunningJobsCount, jobs.running);
    counts.insert(MetricName::UnfinishedJobsCount, jobs.total);
    counts.insert(MetricName::WaitingJobsCount, jobs.waiting);
}

fn insert_agents(counts: &mut crate::Counts, agents: &AgentCounts) {
    counts.insert(MetricName::IdleAgentCount, agents.idle);
    counts.insert(MetricName::BusyAgentCount, agents.busy);
    counts.insert(MetricName::TotalAgentCount, agents.total);
    counts.insert(
        MetricName::BusyAgentPercentage,
        busy_agent_percentage(agents.busy, agents.total),
    );
}

/// A garbled header is logged and ignored.
fn poll_duration(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(POLL_DURATION_HEADER)?;
    match value.to_str().map(str::trim).map(str::parse::<u64>) {
        Ok(Ok(seconds)) => Some(Duration::from_secs(seconds)),
        Ok(Err(err)) => {
            warn!(header = POLL_DURATION_HEADER, ?value, "Failed to parse header: {err}");
            None
        }
        Err(err) => {
            warn!(header = POLL_DURATION_HEADER, ?value, "Failed to read header: {err}");
            None
        }
    }
}

async fn error_from_response(response: Response) -> CollectError {
    let status = response.status();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    if is_json {
        match response.json::<ApiErrorBody>().await {
            Ok(body) => {
                return CollectError::Api {
                    status,
                    message: body.message,
                }
            }
            Err(err) => warn!("Failed to decode error: {err}"),
        }
    }

    CollectError::Status { status }
}

fn redacted(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Token <redacted>"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use wiremock::{
        matchers::{
            header,
            method,
            path,
            query_param,
        },
        Mock,
        MockServer,
        ResponseTemplate,
    };

    const ALL_QUEUES_FIXTURE: &str = r#"{
        "organization": {"slug": "test-org"},
        "cluster": {"name": "test-cluster"},
        "jobs": {
            "scheduled": 3, "running": 1, "waiting": 2, "total": 6,
            "queues": {
                "default": {"scheduled": 2, "running": 1, "waiting": 0, "total": 3},
                "deploy": {"scheduled": 1, "running": 0, "waiting": 2, "total": 3}
            }
        },
        "agents": {
            "idle": 4, "busy": 1, "total": 3,
            "queues": {
                "default": {"idle": 1, "busy": 1, "total": 2}
            }
        }
    }"#;

    fn client_for(server: &MockServer) -> MetricsClient {
        let http = build_http_client(Duration::from_secs(5), 100).unwrap();
        let endpoint = Url::parse(&server.uri()).unwrap();
        MetricsClient::new(http, endpoint, "abc123").with_user_agent("some-client/1.2.3")
    }

    #[test]
    fn idle_connection_limits() {
        assert_eq!(max_idle_per_host(-1), Some(0));
        assert_eq!(max_idle_per_host(0), None);
        assert_eq!(max_idle_per_host(100), Some(100));
        assert_eq!(max_idle_per_host(i64::MAX), Some(usize::try_from(i64::MAX).unwrap_or(usize::MAX)));
        assert!(build_http_client(Duration::from_secs(5), i64::MAX).is_ok());
    }

    fn all_keys() -> BTreeSet<MetricName> {
        MetricName::iter().collect()
    }

    #[tokio::test]
    async fn all_queues_are_merged_by_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics"))
            .and(header("Authorization", "Token abc123"))
            .and(header("User-Agent", "some-client/1.2.3"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ALL_QUEUES_FIXTURE, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).collect().await.unwrap();

        assert_eq!(result.org, "test-org");
        assert_eq!(result.cluster, "test-cluster");
        assert_eq!(
            result.queues.keys().cloned().collect::<Vec<_>>(),
            vec!["default".to_string(), "deploy".to_string()]
        );
        for counts in result.queues.values() {
            assert_eq!(counts.keys().copied().collect::<BTreeSet<_>>(), all_keys());
        }

        let deploy = &result.queues["deploy"];
        assert_eq!(deploy[&MetricName::WaitingJobsCount], 2);
        assert_eq!(deploy[&MetricName::TotalAgentCount], 0);
        assert_eq!(deploy[&MetricName::BusyAgentPercentage], 0);
        assert_eq!(result.queues["default"][&MetricName::BusyAgentPercentage], 50);
    }

    #[tokio::test]
    async fn counts_are_copied_not_reconciled() {
        let server = MockServer::start().await;
        Mock::given(path("/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ALL_QUEUES_FIXTURE, "application/json"))
            .mount(&server)
            .await;

        let result = client_for(&server).collect().await.unwrap();

        // idle + busy != total in the fixture
        assert_eq!(result.totals[&MetricName::IdleAgentCount], 4);
        assert_eq!(result.totals[&MetricName::BusyAgentCount], 1);
        assert_eq!(result.totals[&MetricName::TotalAgentCount], 3);
        assert_eq!(result.totals[&MetricName::UnfinishedJobsCount], 6);
        assert_eq!(result.totals[&MetricName::BusyAgentPercentage], 33);
        assert_eq!(result.totals.keys().copied().collect::<BTreeSet<_>>(), all_keys());
    }

    #[tokio::test]
    async fn empty_response_yields_zeroed_totals() {
        let server = MockServer::start().await;
        Mock::given(path("/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"organization": {"slug": "org-name"}}"#))
            .mount(&server)
            .await;

        let result = client_for(&server).collect().await.unwrap();

        assert!(result.queues.is_empty());
        assert_eq!(result.totals.len(), 8);
        assert!(result.totals.values().all(|value| *value == 0));
        assert_eq!(result.poll_duration, Duration::ZERO);
    }

    #[tokio::test]
    async fn queue_scoped_poll_leaves_totals_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/queue"))
            .and(query_param("name", "deploy"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "organization": {"slug": "test-org"},
                    "jobs": {"scheduled": 3, "running": 2, "waiting": 1, "total": 6},
                    "agents": {"idle": 0, "busy": 0, "total": 0}
                }"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .with_queues(vec!["deploy".to_string()])
            .collect()
            .await
            .unwrap();

        assert!(result.totals.is_empty());
        assert_eq!(result.cluster, "");
        let deploy = &result.queues["deploy"];
        assert_eq!(deploy.keys().copied().collect::<BTreeSet<_>>(), all_keys());
        assert_eq!(deploy[&MetricName::ScheduledJobsCount], 3);
        assert_eq!(deploy[&MetricName::RunningJobsCount], 2);
        assert_eq!(deploy[&MetricName::BusyAgentPercentage], 0);
    }

    #[tokio::test]
    async fn endpoint_path_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(path("/v3/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"organization": {"slug": "org"}}"#))
            .expect(1)
            .mount(&server)
            .await;

        let http = build_http_client(Duration::from_secs(5), 0).unwrap();
        let endpoint = Url::parse(&format!("{}/v3/", server.uri())).unwrap();
        let result = MetricsClient::new(http, endpoint, "abc123").collect().await.unwrap();
        assert_eq!(result.org, "org");
    }

    #[tokio::test]
    async fn missing_organization_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(path("/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"jobs": {"scheduled": 1}}"#))
            .mount(&server)
            .await;

        let err = client_for(&server).collect().await.unwrap_err();
        assert!(matches!(err, CollectError::MissingOrganization), "{err:?}");
    }

    #[tokio::test]
    async fn undecodable_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(path("/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).collect().await.unwrap_err();
        assert!(matches!(err, CollectError::Decode(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unauthorized_is_distinguishable() {
        let server = MockServer::start().await;
        Mock::given(path("/metrics"))
            .respond_with(ResponseTemplate::new(401).set_body_raw(r#"{"message": "nope"}"#, "application/json"))
            .mount(&server)
            .await;

        let err = client_for(&server).collect().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn server_error_is_not_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(path("/metrics"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).collect().await.unwrap_err();
        assert!(!err.is_unauthorized());
        assert_eq!(err.to_string(), "Request failed with 503 Service Unavailable (503)");
    }

    #[tokio::test]
    async fn json_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(path("/metrics"))
            .respond_with(
                ResponseTemplate::new(422).set_body_raw(r#"{"message": "queue does not exist"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).collect().await.unwrap_err();
        assert_eq!(err.to_string(), "queue does not exist");
        assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[tokio::test]
    async fn poll_duration_header_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(path("/metrics"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(POLL_DURATION_HEADER, "3600")
                    .set_body_string(r#"{"organization": {"slug": "org"}}"#),
            )
            .mount(&server)
            .await;

        let result = client_for(&server).collect().await.unwrap();
        assert_eq!(result.poll_duration, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn garbled_poll_duration_header_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(path("/metrics"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(POLL_DURATION_HEADER, "abc")
                    .set_body_string(r#"{"organization": {"slug": "org"}}"#),
            )
            .mount(&server)
            .await;

        let result = client_for(&server).collect().await.unwrap();
        assert_eq!(result.poll_duration, Duration::ZERO);
    }

    #[test]
    fn debug_output_hides_the_token() {
        let http = build_http_client(Duration::from_secs(1), -1).unwrap();
        let client = MetricsClient::new(http, Url::parse(DEFAULT_ENDPOINT).unwrap(), "super-secret");
        assert!(!format!("{client:?}").contains("super-secret"));
    }
}
