// crates/network/src/client.rs
//! Thin reqwest wrapper used by the probe and the remote endpoint
//!
//! Requests are sent exactly once. Non-2xx answers become
//! [`NetworkError::Status`] so callers classify them in one place.

use crate::error::{NetworkError, NetworkResult};
use reqwest::{redirect, Response, Url};
use serde::Serialize;
use std::time::Duration;

/// Header carrying the record id on every push
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Whole-request deadline, connect included
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// 0 disables redirects
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("VoteSync/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 5,
        }
    }
}

impl ClientConfig {
    fn redirect_policy(&self) -> redirect::Policy {
        match self.max_redirects {
            0 => redirect::Policy::none(),
            n => redirect::Policy::limited(n),
        }
    }
}

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
}

impl Client {
    pub fn new() -> NetworkResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> NetworkResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout.min(config.timeout))
            .user_agent(config.user_agent.as_str())
            .redirect(config.redirect_policy())
            .build()
            .map_err(NetworkError::Http)?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// True when `url` answers a HEAD request with a 2xx status
    pub async fn is_accessible(&self, url: &str) -> bool {
        match self.http.head(url).send().await.map_err(NetworkError::from) {
            Ok(response) => ensure_success(response).is_ok(),
            Err(e) => {
                log::trace!("Probe of {} failed: {}", url, e);
                false
            }
        }
    }

    /// Sends `body` as JSON with a PUT, tagged with `idempotency_key`
    pub async fn put_json<T>(&self, url: Url, body: &T, idempotency_key: &str) -> NetworkResult<Response>
    where
        T: Serialize + ?Sized,
    {
        let response = self
            .http
            .put(url)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(body)
            .send()
            .await?;
        ensure_success(response)
    }
}

fn ensure_success(response: Response) -> NetworkResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(NetworkError::Status {
        status: status.as_u16(),
        reason: status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("status {}", status.as_u16())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_identify_votesync() {
        let config = ClientConfig::default();
        assert!(config.user_agent.starts_with("VoteSync/"));
        assert!(config.connect_timeout <= config.timeout);
    }

    #[test]
    fn test_builds_without_redirects() {
        let client = Client::with_config(ClientConfig {
            max_redirects: 0,
            user_agent: "probe".to_string(),
            ..ClientConfig::default()
        })
        .expect("client");
        assert_eq!(client.config().max_redirects, 0);
        assert_eq!(client.config().user_agent, "probe");
    }

    #[tokio::test]
    async fn test_closed_port_is_not_accessible() {
        let client = Client::with_config(ClientConfig {
            timeout: Duration::from_secs(2),
            ..ClientConfig::default()
        })
        .expect("client");
        // Port 9 on loopback is the discard service and normally closed
        assert!(!client.is_accessible("http://127.0.0.1:9/").await);
    }
}
