//! Blocking session against a mock server
//!
//! The mock server runs on its own runtime; the blocking client is driven from
//! the plain test thread.

#![cfg(feature = "blocking")]

mod common;

use dialtone::{BlockingSession, Error, PageConfig, Request, RetryConfig, SessionConfig};
use dialtone_core::sleep::RecordingSleeper;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn blocking_session(uri: &str, sleeper: Arc<RecordingSleeper>) -> BlockingSession {
    BlockingSession::builder()
        .config(
            SessionConfig::builder()
                .base_url(uri)
                .access_token(common::test_token())
                .retry(common::test_retry())
                .build(),
        )
        .sleeper(sleeper)
        .build()
        .expect("Failed to build session")
}

#[test]
fn test_blocking_retry_then_success() {
    let runtime = Runtime::new().unwrap();
    let mock_server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/people/me"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/people/me"))
            .and(header(
                "authorization",
                format!("Bearer {}", common::test_token()).as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "p-1"})))
            .expect(1)
            .mount(&server)
            .await;
        server
    });

    let sleeper = Arc::new(RecordingSleeper::new());
    let session = blocking_session(&mock_server.uri(), sleeper.clone());

    let response = session.get("people/me", &[]).expect("Request failed");

    assert_eq!(response.body().unwrap()["id"], "p-1");
    assert_eq!(response.retries_taken(), 1);
    assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1)]);

    drop(session);
    runtime.block_on(mock_server.verify());
}

#[test]
fn test_blocking_pagination_matches_async_semantics() {
    let runtime = Runtime::new().unwrap();
    let mock_server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param_is_missing("cursor"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": ["a", "b"],
                "next": "cursor-2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("cursor", "cursor-2"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;
        server
    });

    let session = blocking_session(&mock_server.uri(), Arc::new(RecordingSleeper::new()));
    let mut pages = session
        .follow_pagination::<String>(
            Request::builder(dialtone::http::Method::GET, "items")
                .query("pageSize", 2)
                .build(),
            PageConfig::body_cursor("items"),
        )
        .expect("First page failed");

    assert_eq!(pages.next().unwrap().unwrap(), "a");
    assert_eq!(pages.next().unwrap().unwrap(), "b");

    let err = pages.next().unwrap().unwrap_err();
    match err {
        Error::PaginationBroken {
            page,
            items_yielded,
            source,
        } => {
            assert_eq!(page, 2);
            assert_eq!(items_yielded, 2);
            assert_eq!(source.attempts(), Some(3));
        }
        other => panic!("Expected PaginationBroken, got {other:?}"),
    }
    assert!(pages.next().is_none());

    drop(pages);
    drop(session);
    runtime.block_on(mock_server.verify());
}

#[test]
fn test_blocking_max_elapsed_stops_retries() {
    let runtime = Runtime::new().unwrap();
    let mock_server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/licenses"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;
        server
    });

    let sleeper = Arc::new(RecordingSleeper::new());
    let session = BlockingSession::builder()
        .config(
            SessionConfig::builder()
                .base_url(mock_server.uri())
                .access_token(common::test_token())
                .retry(RetryConfig {
                    initial_delay: Duration::from_secs(5),
                    jitter: 0.0,
                    max_elapsed: Some(Duration::from_secs(1)),
                    ..common::test_retry()
                })
                .build(),
        )
        .sleeper(sleeper.clone())
        .build()
        .expect("Failed to build session");

    let err = session.get("licenses", &[]).unwrap_err();

    assert!(matches!(err, Error::Server(ref api) if api.status == 502));
    assert_eq!(err.attempts(), Some(1));
    assert!(sleeper.recorded().is_empty());

    drop(session);
    runtime.block_on(mock_server.verify());
}
