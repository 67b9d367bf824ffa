//! Node API Adapter (spec.md §4.3): the only component that talks to the
//! remote Lightning node. Abstracted behind `NodeClient` so the rest of the
//! crate never depends on a transport; a `reqwest`-backed HTTP implementation
//! is provided for production use and a recording mock for tests, following
//! the same shape as the teacher's `LdkClient` trait + `MockLdkClient`.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::Config;
use crate::model::{ChannelId, ChannelStatus, NodeId};

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_MS: u64 = 250;
const RETRY_MAX_MS: u64 = 2000;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;
const CLOSE_CALL_TIMEOUT_SECS: u64 = 30;

/// Coarse channel listing as returned by `list_channels` (spec.md §4.3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteChannel {
    pub channel_id: ChannelId,
    pub peer_node_id: NodeId,
    pub capacity_sat: u64,
    pub local_balance_sat: u64,
    pub remote_balance_sat: u64,
    pub status: RemoteChannelStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteChannelStatus {
    Active,
    Inactive,
    Closing,
    Closed,
}

impl From<RemoteChannelStatus> for ChannelStatus {
    fn from(s: RemoteChannelStatus) -> Self {
        match s {
            RemoteChannelStatus::Active => ChannelStatus::Active,
            RemoteChannelStatus::Inactive => ChannelStatus::Inactive,
            RemoteChannelStatus::Closing => ChannelStatus::Closing,
            RemoteChannelStatus::Closed => ChannelStatus::Closed,
        }
    }
}

/// Wire representation of a channel policy, matching `ChannelPolicy`'s
/// controllable fields (spec.md §3).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RemotePolicy {
    pub channel_id: ChannelId,
    pub base_fee_msat: u64,
    pub fee_rate_ppm: u32,
    pub min_htlc_msat: u64,
    pub max_htlc_msat: u64,
    pub time_lock_delta: u32,
    pub disabled: bool,
    pub version: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyApplyResult {
    pub new_version: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloseResult {
    pub closing_txid: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardEvent {
    pub channel_id: ChannelId,
    pub amount_sat: u64,
    pub fee_msat: u64,
    pub success: bool,
    pub resolved_at: f64,
}

/// Error taxonomy crossing the adapter boundary (spec.md §7). Everything
/// above this boundary reacts to the *kind*, never to transport details.
#[derive(Debug, Clone)]
pub enum NodeApiError {
    /// Network/timeout/5xx-equivalent, exhausted after retries.
    IoFailure(String),
    /// Optimistic-concurrency mismatch; never retried.
    VersionConflict,
    /// Credential rejected by the node; fatal for the tick's Execution phase.
    AuthFailure,
    /// Malformed argument; never retried.
    MalformedArgument(String),
}

impl std::fmt::Display for NodeApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeApiError::IoFailure(msg) => write!(f, "io failure: {}", msg),
            NodeApiError::VersionConflict => write!(f, "version conflict"),
            NodeApiError::AuthFailure => write!(f, "authorization failure"),
            NodeApiError::MalformedArgument(msg) => write!(f, "malformed argument: {}", msg),
        }
    }
}

impl std::error::Error for NodeApiError {}

impl NodeApiError {
    fn is_retryable(&self) -> bool {
        matches!(self, NodeApiError::IoFailure(_))
    }
}

/// Abstracts the remote node. Exposes only the capabilities the control loop
/// needs (spec.md §4.3).
#[async_trait::async_trait]
pub trait NodeClient: Send + Sync {
    async fn list_channels(&self) -> Result<Vec<RemoteChannel>, NodeApiError>;
    async fn get_policy(&self, channel_id: &str) -> Result<RemotePolicy, NodeApiError>;
    async fn apply_policy(
        &self,
        policy: &RemotePolicy,
        expected_version: u64,
    ) -> Result<PolicyApplyResult, NodeApiError>;
    async fn close_channel(&self, channel_id: &str, force: bool) -> Result<CloseResult, NodeApiError>;
    async fn get_forwards_since(&self, since: f64) -> Result<Vec<ForwardEvent>, NodeApiError>;
}

/// HTTP+JSON implementation of `NodeClient`, backed by `reqwest`.
pub struct HttpNodeClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HttpNodeClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            base_url: config.server.base_url.trim_end_matches('/').to_string(),
            api_key: config.server.api_key.clone(),
            http,
        })
    }

    fn classify_status(status: reqwest::StatusCode) -> NodeApiError {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            NodeApiError::AuthFailure
        } else if status == reqwest::StatusCode::CONFLICT {
            NodeApiError::VersionConflict
        } else if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            NodeApiError::MalformedArgument(format!("http {}", status))
        } else {
            NodeApiError::IoFailure(format!("http {}", status))
        }
    }

    async fn with_retry<T, F, Fut>(&self, name: &str, timeout: Duration, f: F) -> Result<T, NodeApiError>
    where
        F: Fn(reqwest::Client, Duration) -> Fut,
        Fut: std::future::Future<Output = Result<T, NodeApiError>>,
    {
        let mut attempt = 0;
        loop {
            match f(self.http.clone(), timeout).await {
                Ok(v) => {
                    debug!("{}: success", name);
                    return Ok(v);
                }
                Err(e) if e.is_retryable() && attempt + 1 < MAX_RETRIES => {
                    let delay = (RETRY_BASE_MS * 2u64.pow(attempt)).min(RETRY_MAX_MS);
                    warn!("{}: attempt {} failed ({}), retrying in {}ms", name, attempt + 1, e, delay);
                    sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.api_key)
    }
}

#[async_trait::async_trait]
impl NodeClient for HttpNodeClient {
    async fn list_channels(&self) -> Result<Vec<RemoteChannel>, NodeApiError> {
        let url = format!("{}/v1/channels", self.base_url);
        self.with_retry("ListChannels", Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS), |http, timeout| {
            let url = url.clone();
            let req = self.auth(http.get(&url).timeout(timeout));
            async move {
                let resp = req.send().await.map_err(|e| NodeApiError::IoFailure(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(Self::classify_status(resp.status()));
                }
                resp.json::<Vec<RemoteChannel>>()
                    .await
                    .map_err(|e| NodeApiError::IoFailure(e.to_string()))
            }
        })
        .await
    }

    async fn get_policy(&self, channel_id: &str) -> Result<RemotePolicy, NodeApiError> {
        let url = format!("{}/v1/channels/{}/policy", self.base_url, channel_id);
        self.with_retry("GetPolicy", Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS), |http, timeout| {
            let url = url.clone();
            let req = self.auth(http.get(&url).timeout(timeout));
            async move {
                let resp = req.send().await.map_err(|e| NodeApiError::IoFailure(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(Self::classify_status(resp.status()));
                }
                resp.json::<RemotePolicy>()
                    .await
                    .map_err(|e| NodeApiError::IoFailure(e.to_string()))
            }
        })
        .await
    }

    async fn apply_policy(
        &self,
        policy: &RemotePolicy,
        expected_version: u64,
    ) -> Result<PolicyApplyResult, NodeApiError> {
        let url = format!(
            "{}/v1/channels/{}/policy?expected_version={}",
            self.base_url, policy.channel_id, expected_version
        );
        let body = policy.clone();
        self.with_retry("ApplyPolicy", Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS), |http, timeout| {
            let url = url.clone();
            let body = body.clone();
            let req = self.auth(http.put(&url).timeout(timeout).json(&body));
            async move {
                let resp = req.send().await.map_err(|e| NodeApiError::IoFailure(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(Self::classify_status(resp.status()));
                }
                resp.json::<PolicyApplyResult>()
                    .await
                    .map_err(|e| NodeApiError::IoFailure(e.to_string()))
            }
        })
        .await
    }

    async fn close_channel(&self, channel_id: &str, force: bool) -> Result<CloseResult, NodeApiError> {
        let url = format!("{}/v1/channels/{}/close?force={}", self.base_url, channel_id, force);
        self.with_retry("CloseChannel", Duration::from_secs(CLOSE_CALL_TIMEOUT_SECS), |http, timeout| {
            let url = url.clone();
            let req = self.auth(http.post(&url).timeout(timeout));
            async move {
                let resp = req.send().await.map_err(|e| NodeApiError::IoFailure(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(Self::classify_status(resp.status()));
                }
                resp.json::<CloseResult>()
                    .await
                    .map_err(|e| NodeApiError::IoFailure(e.to_string()))
            }
        })
        .await
    }

    async fn get_forwards_since(&self, since: f64) -> Result<Vec<ForwardEvent>, NodeApiError> {
        let url = format!("{}/v1/forwards?since={}", self.base_url, since);
        self.with_retry("GetForwardsSince", Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS), |http, timeout| {
            let url = url.clone();
            let req = self.auth(http.get(&url).timeout(timeout));
            async move {
                let resp = req.send().await.map_err(|e| NodeApiError::IoFailure(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(Self::classify_status(resp.status()));
                }
                resp.json::<Vec<ForwardEvent>>()
                    .await
                    .map_err(|e| NodeApiError::IoFailure(e.to_string()))
            }
        })
        .await
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records calls and returns preset / scripted responses, mirroring the
    /// teacher's `MockLdkClient`.
    pub struct MockNodeClient {
        pub channels: Vec<RemoteChannel>,
        pub policies: Mutex<std::collections::HashMap<ChannelId, RemotePolicy>>,
        pub forwards: Vec<ForwardEvent>,
        /// Scripted responses for apply_policy, consumed in order per channel.
        pub apply_script: Mutex<std::collections::HashMap<ChannelId, Vec<Result<PolicyApplyResult, NodeApiError>>>>,
        pub apply_calls: Mutex<Vec<(ChannelId, u64)>>,
        pub close_calls: Mutex<Vec<ChannelId>>,
    }

    impl MockNodeClient {
        pub fn new() -> Self {
            Self {
                channels: Vec::new(),
                policies: Mutex::new(std::collections::HashMap::new()),
                forwards: Vec::new(),
                apply_script: Mutex::new(std::collections::HashMap::new()),
                apply_calls: Mutex::new(Vec::new()),
                close_calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_policy(self, policy: RemotePolicy) -> Self {
            self.policies.lock().unwrap().insert(policy.channel_id.clone(), policy);
            self
        }

        pub fn script_apply(&self, channel_id: &str, results: Vec<Result<PolicyApplyResult, NodeApiError>>) {
            self.apply_script.lock().unwrap().insert(channel_id.to_string(), results);
        }
    }

    #[async_trait::async_trait]
    impl NodeClient for MockNodeClient {
        async fn list_channels(&self) -> Result<Vec<RemoteChannel>, NodeApiError> {
            Ok(self.channels.clone())
        }

        async fn get_policy(&self, channel_id: &str) -> Result<RemotePolicy, NodeApiError> {
            self.policies
                .lock()
                .unwrap()
                .get(channel_id)
                .cloned()
                .ok_or_else(|| NodeApiError::MalformedArgument("unknown channel".into()))
        }

        async fn apply_policy(
            &self,
            policy: &RemotePolicy,
            expected_version: u64,
        ) -> Result<PolicyApplyResult, NodeApiError> {
            self.apply_calls
                .lock()
                .unwrap()
                .push((policy.channel_id.clone(), expected_version));

            let scripted = {
                let mut script = self.apply_script.lock().unwrap();
                script.get_mut(&policy.channel_id).and_then(|v| {
                    if v.is_empty() {
                        None
                    } else {
                        Some(v.remove(0))
                    }
                })
            };

            if let Some(result) = scripted {
                if let Ok(ref ok) = result {
                    let mut policies = self.policies.lock().unwrap();
                    let mut stored = policy.clone();
                    stored.version = ok.new_version;
                    policies.insert(policy.channel_id.clone(), stored);
                }
                return result;
            }

            let mut policies = self.policies.lock().unwrap();
            let current = policies.get(&policy.channel_id).cloned();
            match current {
                Some(c) if c.version != expected_version => Err(NodeApiError::VersionConflict),
                _ => {
                    let new_version = expected_version + 1;
                    let mut stored = policy.clone();
                    stored.version = new_version;
                    policies.insert(policy.channel_id.clone(), stored);
                    Ok(PolicyApplyResult { new_version })
                }
            }
        }

        async fn close_channel(&self, channel_id: &str, _force: bool) -> Result<CloseResult, NodeApiError> {
            self.close_calls.lock().unwrap().push(channel_id.to_string());
            Ok(CloseResult { closing_txid: Some("mock_txid".to_string()) })
        }

        async fn get_forwards_since(&self, _since: f64) -> Result<Vec<ForwardEvent>, NodeApiError> {
            Ok(self.forwards.clone())
        }
    }

    #[tokio::test]
    async fn apply_policy_conflict_on_stale_version() {
        let mock = MockNodeClient::new().with_policy(RemotePolicy {
            channel_id: "ch1".into(),
            base_fee_msat: 1000,
            fee_rate_ppm: 100,
            min_htlc_msat: 1,
            max_htlc_msat: 1_000_000_000,
            time_lock_delta: 40,
            disabled: false,
            version: 5,
        });

        let proposed = RemotePolicy { fee_rate_ppm: 200, ..mock.get_policy("ch1").await.unwrap() };
        let result = mock.apply_policy(&proposed, 4).await;
        assert!(matches!(result, Err(NodeApiError::VersionConflict)));
    }

    #[tokio::test]
    async fn apply_policy_succeeds_on_matching_version() {
        let mock = MockNodeClient::new().with_policy(RemotePolicy {
            channel_id: "ch1".into(),
            base_fee_msat: 1000,
            fee_rate_ppm: 100,
            min_htlc_msat: 1,
            max_htlc_msat: 1_000_000_000,
            time_lock_delta: 40,
            disabled: false,
            version: 5,
        });

        let proposed = RemotePolicy { fee_rate_ppm: 200, ..mock.get_policy("ch1").await.unwrap() };
        let result = mock.apply_policy(&proposed, 5).await.unwrap();
        assert_eq!(result.new_version, 6);
    }
}
