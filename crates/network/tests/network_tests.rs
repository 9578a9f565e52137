// crates/network/tests/network_tests.rs
//! Integration tests for the HTTP remote endpoint against a local mock server

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use votesync_network::{
    Client, ClientConfig, ConnectivityMonitor, HttpRemoteEndpoint, NetworkSignal, PushOutcome,
    PushRequest, RemoteEndpoint,
};

#[derive(Debug, Clone)]
struct CapturedRequest {
    request_line: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Serves every request with `status` and records what it received
async fn mock_server(status: u16) -> (String, Arc<Mutex<Vec<CapturedRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                let header_end = loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };

                let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let mut lines = head.split("\r\n");
                let request_line = lines.next().unwrap_or_default().to_string();
                let headers: Vec<(String, String)> = lines
                    .filter_map(|l| l.split_once(':'))
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .collect();
                let content_length = headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.parse::<usize>().ok())
                    .unwrap_or(0);

                while buf.len() < header_end + content_length {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

                sink.lock().unwrap().push(CapturedRequest {
                    request_line,
                    headers,
                    body,
                });

                let response = format!(
                    "HTTP/1.1 {} Mock\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/api/sync", addr), captured)
}

fn vote_request() -> PushRequest {
    PushRequest {
        record_type: "vote".to_string(),
        id: "vote-42".to_string(),
        payload: serde_json::json!({"candidateId": "c-7", "electionId": "e-1"}),
    }
}

fn test_client() -> Client {
    Client::with_config(ClientConfig {
        timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    })
    .expect("client")
}

#[tokio::test]
async fn test_push_accepted_sends_put_with_idempotency_key() -> Result<(), Box<dyn std::error::Error>> {
    let (base, captured) = mock_server(200).await;
    let remote = HttpRemoteEndpoint::new(test_client(), &base)?;

    let outcome = remote.push(&vote_request()).await;
    assert_eq!(outcome, PushOutcome::Accepted);

    let requests = captured.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request.request_line.starts_with("PUT /api/sync/vote/vote-42 "));
    assert_eq!(request.header("idempotency-key"), Some("vote-42"));
    assert!(request
        .header("content-type")
        .is_some_and(|v| v.starts_with("application/json")));

    let body: serde_json::Value = serde_json::from_str(&request.body)?;
    assert_eq!(body["candidateId"], "c-7");
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_retryable() -> Result<(), Box<dyn std::error::Error>> {
    let (base, _) = mock_server(503).await;
    let remote = HttpRemoteEndpoint::new(test_client(), &base)?;

    match remote.push(&vote_request()).await {
        PushOutcome::Rejected(rejection) => {
            assert!(rejection.retryable);
            assert!(rejection.reason.contains("503"));
        }
        PushOutcome::Accepted => panic!("503 must not be accepted"),
    }
    Ok(())
}

#[tokio::test]
async fn test_throttling_is_retryable() -> Result<(), Box<dyn std::error::Error>> {
    let (base, _) = mock_server(429).await;
    let remote = HttpRemoteEndpoint::new(test_client(), &base)?;

    match remote.push(&vote_request()).await {
        PushOutcome::Rejected(rejection) => assert!(rejection.retryable),
        PushOutcome::Accepted => panic!("429 must not be accepted"),
    }
    Ok(())
}

#[tokio::test]
async fn test_conflict_is_permanent() -> Result<(), Box<dyn std::error::Error>> {
    let (base, _) = mock_server(409).await;
    let remote = HttpRemoteEndpoint::new(test_client(), &base)?;

    match remote.push(&vote_request()).await {
        PushOutcome::Rejected(rejection) => {
            assert!(!rejection.retryable);
            assert!(rejection.reason.contains("409"));
        }
        PushOutcome::Accepted => panic!("409 must not be accepted"),
    }
    Ok(())
}

#[tokio::test]
async fn test_repeated_push_is_sent_each_time() -> Result<(), Box<dyn std::error::Error>> {
    let (base, captured) = mock_server(204).await;
    let remote = HttpRemoteEndpoint::new(test_client(), &base)?;

    assert!(remote.push(&vote_request()).await.is_accepted());
    assert!(remote.push(&vote_request()).await.is_accepted());

    let requests = captured.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].header("idempotency-key"), requests[1].header("idempotency-key"));
    Ok(())
}

#[tokio::test]
async fn test_connectivity_probe_against_local_server() {
    let (base, _) = mock_server(200).await;
    let monitor = ConnectivityMonitor::with_urls(test_client(), vec![base]);
    let mut changes = monitor.subscribe();

    assert!(!monitor.is_online());
    assert!(monitor.probe().await);
    assert!(monitor.is_online());

    changes.changed().await.expect("monitor alive");
    assert!(*changes.borrow_and_update());
}

#[tokio::test]
async fn test_connectivity_falls_back_to_second_url() {
    let (base, _) = mock_server(200).await;
    let monitor = ConnectivityMonitor::with_urls(
        test_client(),
        vec!["http://127.0.0.1:9/".to_string(), base],
    );

    assert!(monitor.probe().await);
}
