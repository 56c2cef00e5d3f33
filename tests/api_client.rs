//! End-to-end behavior of the API client against mock backends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use user_api_client::resilience::CircuitState;
use user_api_client::{ApiClient, ApiError, UserSummary};

mod common;

fn summary() -> UserSummary {
    UserSummary::new(1, "Test User", "test@example.com")
}

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_users_decodes_list() {
    let backend = common::start_mock_backend(200, common::ONE_USER).await;
    let client = ApiClient::new(common::test_config(&backend.base_url())).unwrap();

    let users = blocking({
        let client = client.clone();
        move || client.fetch_users()
    })
    .await
    .unwrap();

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, 1);
    assert_eq!(users[0].name.as_deref(), Some("Leanne Graham"));
    assert_eq!(users[0].city(), Some("Gwenborough"));

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/users");

    assert_eq!(client.metrics().counter("api.fetch.users.count"), 1);
    assert_eq!(client.metrics().timer("api.fetch.users.time").count, 1);
    assert_eq!(client.metrics().counter("api.fetch.users.error.count"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_minimal_user() {
    let backend = common::start_mock_backend(
        200,
        r#"[{"id":1,"name":"Test User","email":"test@example.com"}]"#,
    )
    .await;
    let client = ApiClient::new(common::test_config(&backend.base_url())).unwrap();

    let users = client.fetch_users_async().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, 1);
    assert_eq!(users[0].name.as_deref(), Some("Test User"));
    assert_eq!(users[0].email.as_deref(), Some("test@example.com"));
    assert!(users[0].address.is_none());
    assert!(client.metrics().counter("api.fetch.users.async.count") >= 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_users_retries_then_succeeds() {
    let calls = Arc::new(AtomicU32::new(0));
    let backend = common::start_programmable_backend({
        let calls = calls.clone();
        move |_| {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    (503, "unavailable".to_string())
                } else {
                    (200, common::ONE_USER.to_string())
                }
            }
        }
    })
    .await;
    let client = ApiClient::new(common::test_config(&backend.base_url())).unwrap();

    let users = client.fetch_users_async().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(backend.hits(), 3);
    assert_eq!(client.metrics().counter("api.fetch.users.async.count"), 1);
    assert_eq!(client.metrics().counter("api.fetch.users.async.error.count"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_persistent_error_status_after_all_attempts() {
    let backend = common::start_mock_backend(503, "unavailable").await;
    let client = ApiClient::new(common::test_config(&backend.base_url())).unwrap();

    let err = blocking({
        let client = client.clone();
        move || client.fetch_users()
    })
    .await
    .unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 503, .. }));
    assert_eq!(err.status_code(), 503);
    assert_eq!(err.endpoint(), "/users");
    assert_eq!(backend.hits(), 3);
    assert_eq!(client.metrics().counter("api.fetch.users.error.count"), 1);
    assert_eq!(client.metrics().timer("api.fetch.users.error.time").count, 1);
    assert_eq!(client.metrics().counter("api.fetch.users.count"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_list_retried_then_returned() {
    let backend = common::start_mock_backend(200, "[]").await;
    let client = ApiClient::new(common::test_config(&backend.base_url())).unwrap();

    let users = client.fetch_users_async().await.unwrap();
    assert!(users.is_empty());
    assert_eq!(backend.hits(), 3);
    assert_eq!(client.metrics().counter("api.fetch.users.async.count"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_list_accepted_when_retry_on_empty_disabled() {
    let backend = common::start_mock_backend(200, "[]").await;
    let mut config = common::test_config(&backend.base_url());
    config.retry.retry_on_empty_result = false;
    let client = ApiClient::new(config).unwrap();

    assert!(client.fetch_users_async().await.unwrap().is_empty());
    assert_eq!(backend.hits(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_body_is_missing_body() {
    let backend = common::start_mock_backend(200, "").await;
    let client = ApiClient::new(common::test_config(&backend.base_url())).unwrap();

    let err = client.fetch_users_async().await.unwrap_err();
    assert!(matches!(err, ApiError::MissingBody { .. }));
    assert_eq!(err.status_code(), 500);
    assert_eq!(backend.hits(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_body_is_not_retried() {
    let backend = common::start_mock_backend(200, "{not json").await;
    let client = ApiClient::new(common::test_config(&backend.base_url())).unwrap();

    let err = client.fetch_users_async().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }));
    assert_eq!(err.status_code(), 500);
    assert_eq!(backend.hits(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_refused_is_io_error() {
    let addr = common::closed_port().await;
    let client = ApiClient::new(common::test_config(&format!("http://{addr}"))).unwrap();

    let err = client.fetch_users_async().await.unwrap_err();
    assert!(matches!(err, ApiError::Io { .. }));
    assert!(err.is_transient());
    assert_eq!(err.status_code(), 500);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_backend_times_out() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        (200, common::ONE_USER.to_string())
    })
    .await;
    let mut config = common::test_config(&backend.base_url());
    config.timeouts.read_ms = 100;
    config.timeouts.write_ms = 100;
    config.retry.max_attempts = 1;
    let client = ApiClient::new(config).unwrap();

    let err = client.fetch_users_async().await.unwrap_err();
    assert!(matches!(err, ApiError::Io { .. }));
    assert!(err.is_timeout());
    assert!(err.is_transient());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_post_summary_returns_true() {
    let backend = common::start_mock_backend(201, r#"{"id": 101}"#).await;
    let client = ApiClient::new(common::test_config(&backend.base_url())).unwrap();

    let posted = blocking({
        let client = client.clone();
        move || client.post_user_summary(&summary())
    })
    .await
    .unwrap();
    assert!(posted);

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/posts");
    assert_eq!(requests[0].header("content-type"), Some("application/json"));

    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["user_id"], 1);
    assert_eq!(body["full_name"], "Test User");
    assert_eq!(body["contact_email"], "test@example.com");
    assert_eq!(body["location"], "");

    assert_eq!(client.metrics().counter("api.post.user.count"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_post_summary_failure_after_retries() {
    let backend = common::start_mock_backend(500, "boom").await;
    let client = ApiClient::new(common::test_config(&backend.base_url())).unwrap();

    let err = client.post_user_summary_async(summary()).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 500, .. }));
    assert_eq!(err.endpoint(), "/posts");
    assert_eq!(backend.hits(), 3);
    assert_eq!(client.metrics().counter("api.post.user.async.error.count"), 1);
    assert_eq!(client.metrics().counter("api.post.user.async.count"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_circuit_opens_and_fails_fast() {
    let backend = common::start_mock_backend(500, "boom").await;
    let mut config = common::test_config(&backend.base_url());
    config.circuit_breaker.sliding_window_size = 2;
    config.circuit_breaker.minimum_number_of_calls = 2;
    config.circuit_breaker.wait_in_open_ms = 60_000;
    let client = ApiClient::new(config).unwrap();

    let err = client.fetch_users_async().await.unwrap_err();
    assert!(matches!(err, ApiError::CircuitOpen { .. }));
    assert_eq!(err.status_code(), 503);
    assert_eq!(backend.hits(), 2);
    assert_eq!(client.circuit_breaker().state(), CircuitState::Open);

    let err = client.post_user_summary_async(summary()).await.unwrap_err();
    assert!(matches!(err, ApiError::CircuitOpen { .. }));
    assert_eq!(backend.hits(), 2);
    assert!(client.circuit_breaker_metrics().not_permitted_calls >= 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_counts_reflect_running_and_queued_calls() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        (201, "{}".to_string())
    })
    .await;
    let mut config = common::test_config(&backend.base_url());
    config.dispatcher.max_requests = 1;
    config.dispatcher.max_requests_per_host = 1;
    let client = ApiClient::new(config).unwrap();

    let pending: Vec<_> = (0..3).map(|_| client.post_user_summary_async(summary())).collect();

    assert!(
        common::eventually(Duration::from_secs(2), || {
            client.active_connection_count() == 1 && client.queued_request_count() == 2
        })
        .await
    );

    for fut in pending {
        assert!(fut.await.unwrap());
    }
    assert_eq!(client.active_connection_count(), 0);
    assert_eq!(client.queued_request_count(), 0);
    assert_eq!(backend.hits(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_queue_runs_on_caller_thread() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        (201, "{}".to_string())
    })
    .await;
    let mut config = common::test_config(&backend.base_url());
    config.dispatcher.queue_capacity = 1;
    let client = ApiClient::new(config).unwrap();

    let queued = client.post_user_summary_async(summary());
    assert!(!queued.is_finished());

    let overflow = blocking({
        let client = client.clone();
        move || client.post_user_summary_async(summary())
    })
    .await;
    assert!(overflow.is_finished());

    assert!(overflow.await.unwrap());
    assert!(queued.await.unwrap());
    assert_eq!(client.metrics().counter("api.post.user.async.count"), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_drains_then_rejects() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        (201, "{}".to_string())
    })
    .await;
    let client = ApiClient::new(common::test_config(&backend.base_url())).unwrap();

    let in_flight = client.post_user_summary_async(summary());
    blocking({
        let client = client.clone();
        move || client.shutdown()
    })
    .await;

    assert!(client.is_shut_down());
    assert!(in_flight.await.unwrap());

    let err = client.fetch_users_async().await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { .. }));

    let again = client.clone();
    blocking(move || again.shutdown()).await;
    assert_eq!(backend.hits(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_forced_shutdown_during_blocking_call() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        (200, common::ONE_USER.to_string())
    })
    .await;
    let mut config = common::test_config(&backend.base_url());
    config.shutdown_grace_secs = 0;
    config.timeouts.read_ms = 5_000;
    let client = ApiClient::new(config).unwrap();

    let caller = std::thread::spawn({
        let client = client.clone();
        move || client.fetch_users()
    });
    assert!(common::eventually(Duration::from_secs(2), || client.active_connection_count() == 1).await);

    let closing = client.clone();
    blocking(move || closing.shutdown()).await;

    let joined = blocking(move || caller.join()).await;
    let err = joined.expect("blocking caller panicked").unwrap_err();
    assert!(matches!(err, ApiError::Unexpected { .. }));
    assert_eq!(err.status_code(), 500);
    assert_eq!(err.endpoint(), "/users");
    assert_eq!(client.metrics().counter("api.fetch.users.error.count"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_shutdowns_drain_queued_posts() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        (201, "{}".to_string())
    })
    .await;
    let mut config = common::test_config(&backend.base_url());
    config.dispatcher.max_requests = 1;
    config.dispatcher.max_requests_per_host = 1;
    let client = ApiClient::new(config).unwrap();

    let first = client.post_user_summary_async(summary());
    let second = client.post_user_summary_async(summary());
    assert!(common::eventually(Duration::from_secs(2), || client.queued_request_count() == 1).await);

    let shutdowns: Vec<_> = (0..2u64)
        .map(|i| {
            let client = client.clone();
            tokio::task::spawn_blocking(move || {
                std::thread::sleep(Duration::from_millis(50 * i));
                client.shutdown();
                client.active_connection_count() + client.queued_request_count()
            })
        })
        .collect();

    for shutdown in shutdowns {
        assert_eq!(shutdown.await.unwrap(), 0);
    }
    assert!(first.await.unwrap());
    assert!(second.await.unwrap());
    assert_eq!(backend.hits(), 2);
}
