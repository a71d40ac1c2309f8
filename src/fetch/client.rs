//! CI service access
//!
//! [`CiService`] is the seam between the pipeline and the network. The
//! production implementation talks to a Hydra instance over blocking `ureq`
//! requests, each one moved onto tokio's blocking pool so a worker task only
//! ever has one request in flight.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Bodies larger than this are refused (evaluation build lists are large)
const MAX_BODY_BYTES: u64 = 256 * 1024 * 1024;

/// Failure to obtain a JSON document from the CI service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid JSON from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Read-only JSON access to a CI service instance
#[async_trait]
pub trait CiService: Send + Sync {
    /// Base URL of the instance, without trailing slash
    fn base_url(&self) -> &str;

    /// GET `{base}{path}` with `Accept: application/json`
    async fn get_json(&self, path: &str) -> Result<Value, FetchError>;
}

/// Hydra client over `ureq`
pub struct HydraClient {
    base_url: String,
    agent: ureq::Agent,
}

impl HydraClient {
    /// Create a client with per-request connect and read timeouts
    pub fn new(base_url: &str, connect_timeout: Duration, read_timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(connect_timeout))
            .timeout_recv_response(Some(read_timeout))
            .timeout_recv_body(Some(read_timeout))
            .http_status_as_error(false)
            .build();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: config.into(),
        }
    }

    fn get_blocking(agent: &ureq::Agent, url: &str) -> Result<Value, FetchError> {
        let mut response = agent
            .get(url)
            .header("Accept", "application/json")
            .call()
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_string()
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        // Hydra answers some misses (e.g. no latest build) with a JSON error
        // document and a 404; those are data, not transport failures.
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(value),
            Err(_) if !status.is_success() => Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
            Err(e) => Err(FetchError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl CiService for HydraClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let agent = self.agent.clone();
        let request_url = url.clone();
        tokio::task::spawn_blocking(move || Self::get_blocking(&agent, &request_url))
            .await
            .map_err(|e| FetchError::Transport {
                url,
                reason: e.to_string(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = HydraClient::new(
            "https://hydra.nixos.org/",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert_eq!(client.base_url(), "https://hydra.nixos.org");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let client = HydraClient::new(
            "http://127.0.0.1:1",
            Duration::from_millis(200),
            Duration::from_millis(200),
        );
        let err = client.get_json("/build/1").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { ref url, .. } if url == "http://127.0.0.1:1/build/1"));
    }
}
