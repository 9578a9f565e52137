// crates/network/src/remote.rs
//! Remote upsert endpoint contract and its HTTP implementation

use crate::client::Client;
use crate::error::{NetworkError, NetworkResult};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// One record pushed to the backend
///
/// Pushing the same request twice must be harmless: the backend upserts by
/// `(record_type, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub record_type: String,
    pub id: String,
    pub payload: serde_json::Value,
}

/// Why the backend did not accept a push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// True for transient failures (transport, timeout, 5xx)
    pub retryable: bool,
    pub reason: String,
}

impl Rejection {
    /// A transient failure worth retrying later
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            retryable: true,
            reason: reason.into(),
        }
    }

    /// A validation failure or conflict the server decided authoritatively
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            retryable: false,
            reason: reason.into(),
        }
    }
}

impl From<NetworkError> for Rejection {
    fn from(err: NetworkError) -> Self {
        Self {
            retryable: err.is_retryable(),
            reason: err.to_string(),
        }
    }
}

/// Result of a single push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    Rejected(Rejection),
}

impl PushOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Accepted)
    }
}

impl From<NetworkResult<()>> for PushOutcome {
    fn from(result: NetworkResult<()>) -> Self {
        match result {
            Ok(()) => PushOutcome::Accepted,
            Err(e) => PushOutcome::Rejected(e.into()),
        }
    }
}

/// Idempotent per-record upsert consumed by the sync orchestrator
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Pushes one record; never panics, every failure is a [`Rejection`]
    async fn push(&self, request: &PushRequest) -> PushOutcome;
}

/// `PUT {base_url}/{record_type}/{id}` with the payload as JSON body
pub struct HttpRemoteEndpoint {
    client: Client,
    base_url: Url,
}

impl HttpRemoteEndpoint {
    /// Creates an endpoint rooted at `base_url`
    pub fn new(client: Client, base_url: &str) -> NetworkResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(NetworkError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self { client, base_url })
    }

    /// Builds the per-record URL, percent-encoding both segments
    pub fn record_url(&self, record_type: &str, id: &str) -> NetworkResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| NetworkError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(record_type)
            .push(id);
        Ok(url)
    }

    async fn send(&self, request: &PushRequest) -> NetworkResult<()> {
        let url = self.record_url(&request.record_type, &request.id)?;
        self.client
            .put_json(url, &request.payload, &request.id)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteEndpoint for HttpRemoteEndpoint {
    async fn push(&self, request: &PushRequest) -> PushOutcome {
        let outcome = PushOutcome::from(self.send(request).await);
        if let PushOutcome::Rejected(rejection) = &outcome {
            log::debug!(
                "Push of {}/{} rejected (retryable={}): {}",
                request.record_type,
                request.id,
                rejection.retryable,
                rejection.reason
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(base: &str) -> HttpRemoteEndpoint {
        let client = Client::new().expect("Failed to create client");
        HttpRemoteEndpoint::new(client, base).expect("valid base url")
    }

    #[test]
    fn test_record_url_appends_segments() {
        let remote = endpoint("https://api.example.com/v1/");
        let url = remote.record_url("vote", "abc-123").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/vote/abc-123");
    }

    #[test]
    fn test_record_url_encodes_segments() {
        let remote = endpoint("https://api.example.com/sync");
        let url = remote.record_url("profile", "a/b c").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/sync/profile/a%2Fb%20c");
    }

    #[test]
    fn test_invalid_base_url() {
        let client = Client::new().expect("Failed to create client");
        assert!(matches!(
            HttpRemoteEndpoint::new(client.clone(), "not a url"),
            Err(NetworkError::InvalidUrl(_))
        ));
        assert!(HttpRemoteEndpoint::new(client, "mailto:ops@example.com").is_err());
    }

    #[test]
    fn test_rejection_from_network_error() {
        let rejection = Rejection::from(NetworkError::Status {
            status: 422,
            reason: "Unprocessable Entity".to_string(),
        });
        assert!(!rejection.retryable);
        assert!(rejection.reason.contains("422"));

        let rejection = Rejection::from(NetworkError::NetworkUnavailable);
        assert!(rejection.retryable);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_retryable() {
        let remote = endpoint("http://127.0.0.1:9/");
        let outcome = remote
            .push(&PushRequest {
                record_type: "vote".to_string(),
                id: "v1".to_string(),
                payload: serde_json::json!({"candidateId": "c1"}),
            })
            .await;

        match outcome {
            PushOutcome::Rejected(rejection) => assert!(rejection.retryable),
            PushOutcome::Accepted => panic!("nothing listens on the discard port"),
        }
    }
}
