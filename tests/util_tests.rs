//! Tests for the backoff executor and timeout helper.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use genstudio::error::GenError;
use genstudio::provider::http::{status_to_error, HttpRequest};
use genstudio::util::retry::BackoffPolicy;
use genstudio::util::timeout::with_timeout;
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn policy(max_attempts: u32, initial_ms: u64, max_ms: u64) -> BackoffPolicy {
    BackoffPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(initial_ms),
        max_backoff: Duration::from_millis(max_ms),
        multiplier: 2.0,
    }
}

fn rate_limited(retry_after_ms: Option<u64>) -> GenError {
    GenError::RateLimited {
        status: 429,
        retry_after_ms,
    }
}

/// Runs `policy` over a scripted sequence of failures, then succeeds.
/// Returns the result and the gaps between attempts in milliseconds.
async fn run_script(
    policy: &BackoffPolicy,
    failures: Vec<GenError>,
) -> (Result<&'static str, GenError>, Vec<u128>) {
    let script = Arc::new(Mutex::new(failures.into_iter()));
    let instants = Arc::new(Mutex::new(Vec::new()));

    let result = policy
        .execute(|| {
            let script = script.clone();
            let instants = instants.clone();
            async move {
                instants.lock().unwrap().push(Instant::now());
                match script.lock().unwrap().next() {
                    Some(err) => Err(err),
                    None => Ok("done"),
                }
            }
        })
        .await;

    let instants = instants.lock().unwrap();
    let gaps = instants
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis())
        .collect();
    (result, gaps)
}

#[tokio::test(start_paused = true)]
async fn rate_limits_are_retried_with_doubling_delays() {
    let (result, gaps) = run_script(
        &policy(5, 100, 1000),
        vec![rate_limited(None), rate_limited(None), rate_limited(None)],
    )
    .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(gaps, vec![100, 200, 400]);
}

#[tokio::test(start_paused = true)]
async fn provider_hint_replaces_delay_but_never_shrinks_the_next_one() {
    let (result, gaps) = run_script(
        &policy(5, 100, 1000),
        vec![
            rate_limited(Some(300)),
            rate_limited(None),
            GenError::Timeout(50),
        ],
    )
    .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(gaps, vec![300, 300, 400]);
}

#[tokio::test(start_paused = true)]
async fn hints_and_growth_are_capped() {
    let (result, gaps) = run_script(
        &policy(6, 400, 1000),
        vec![
            rate_limited(Some(60_000)),
            rate_limited(None),
            rate_limited(None),
            rate_limited(None),
        ],
    )
    .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(gaps, vec![1000, 1000, 1000, 1000]);
}

#[tokio::test(start_paused = true)]
async fn resource_exhausted_hint_sets_the_sleep() {
    let body = serde_json::json!({
        "error": {
            "code": 429,
            "status": "RESOURCE_EXHAUSTED",
            "details": [{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "2s"}]
        }
    })
    .to_string();

    let (result, gaps) = run_script(
        &BackoffPolicy::default(),
        vec![status_to_error("gemini", 429, &body)],
    )
    .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(gaps, vec![2000]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_rate_limit_reports_attempt_count() {
    let calls = Arc::new(AtomicU32::new(0));

    let err = policy(3, 10, 100)
        .execute(|| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GenError::RateLimited {
                    status: 429,
                    retry_after_ms: Some(20),
                })
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match err {
        GenError::RateLimitExhausted { status, attempts } => {
            assert_eq!(status, 429);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected rate limit exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_transport_faults_keep_the_last_cause() {
    let err = policy(2, 10, 100)
        .execute(|| async { Err::<(), _>(GenError::Timeout(5)) })
        .await
        .unwrap_err();

    match err {
        GenError::TransportExhausted { attempts, source } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*source, GenError::Timeout(5)));
        }
        other => panic!("expected transport exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn other_failures_are_returned_after_one_attempt() {
    let calls = Arc::new(AtomicU32::new(0));

    let err = policy(5, 1, 2)
        .execute(|| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GenError::provider("gemini", 400, "bad request"))
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, GenError::Provider { status: 400, .. }));
}

#[tokio::test]
async fn zero_attempt_budget_is_rejected_without_calling() {
    let calls = Arc::new(AtomicU32::new(0));

    let err = policy(0, 1, 2)
        .execute(|| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, GenError>(())
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(matches!(err, GenError::InvalidArgument(_)));
}

#[tokio::test]
async fn http_send_retries_429_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let request = HttpRequest::post_json(
        "test",
        format!("{}/generate", server.uri()),
        &serde_json::json!({"prompt": "x"}),
    )
    .unwrap();
    let response = policy(4, 1, 5)
        .send(&reqwest::Client::new(), &request)
        .await
        .unwrap();

    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn http_send_treats_resource_exhausted_body_as_rate_limit() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "error": {"code": 503, "status": "RESOURCE_EXHAUSTED", "message": "quota"}
        })))
        .expect(3)
        .mount(&server)
        .await;

    let request = HttpRequest::get("test", server.uri());
    let err = policy(3, 1, 5)
        .send(&reqwest::Client::new(), &request)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GenError::RateLimitExhausted { status: 503, attempts: 3 }
    ));
}

#[tokio::test]
async fn http_send_does_not_retry_client_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": "Invalid token"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = policy(5, 1, 5)
        .send(&reqwest::Client::new(), &HttpRequest::get("test", server.uri()))
        .await
        .unwrap_err();

    match err {
        GenError::Provider { status, message, .. } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid token");
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn unbuildable_request_fails_on_first_attempt() {
    let err = policy(5, 1000, 30_000)
        .send(&reqwest::Client::new(), &HttpRequest::get("test", "not a url"))
        .await
        .unwrap_err();

    assert!(matches!(err, GenError::Network(ref e) if e.is_builder()), "{err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn refused_connections_are_retried_until_exhausted() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = policy(2, 1, 5)
        .send(&reqwest::Client::new(), &HttpRequest::get("test", format!("http://{addr}")))
        .await
        .unwrap_err();

    match err {
        GenError::TransportExhausted { attempts, source } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*source, GenError::Network(_)));
        }
        other => panic!("expected transport exhaustion, got {other:?}"),
    }
}

/// Answers every connection with a header promising more body than it sends.
async fn truncated_body_server() -> (String, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicU32::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\npartial")
                .await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}/"), connections)
}

#[tokio::test]
async fn body_cut_short_is_retried_as_transport_fault() {
    let (url, connections) = truncated_body_server().await;

    let err = policy(3, 1, 5)
        .send_text(&reqwest::Client::new(), &HttpRequest::get("test", url))
        .await
        .unwrap_err();

    match err {
        GenError::TransportExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, GenError::Network(_)));
        }
        other => panic!("expected transport exhaustion, got {other:?}"),
    }
    assert_eq!(connections.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn send_bytes_returns_headers_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![1u8, 2, 3]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (headers, bytes) = policy(2, 1, 5)
        .send_bytes(&reqwest::Client::new(), &HttpRequest::get("test", server.uri()))
        .await
        .unwrap();

    assert_eq!(headers.get("content-type").unwrap(), "image/png");
    assert_eq!(bytes, vec![1u8, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn with_timeout_passes_through_fast_futures() {
    let value = with_timeout(Duration::from_secs(1), async { Ok::<_, GenError>(7) })
        .await
        .unwrap();
    assert_eq!(value, 7);
}
