use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use activity_feed_core::FeedError;
use activity_feed_core::FeedStreamEvent;
use activity_feed_core::GENERIC_LOAD_ERROR;
use activity_feed_core::StreamStatus;
use activity_feed_core::loader::ResumeCursor;
use assert_matches::assert_matches;
use feed_test_support::item;
use feed_test_support::request::RequestExt;
use feed_test_support::responses::ev_batch;
use feed_test_support::responses::ev_comment;
use feed_test_support::responses::ev_item;
use feed_test_support::responses::mount_activity_list;
use feed_test_support::responses::mount_activity_list_error;
use feed_test_support::responses::mount_activity_stream;
use feed_test_support::responses::mount_activity_stream_sequence;
use feed_test_support::responses::sse;
use feed_test_support::responses::sse_response;
use feed_test_support::responses::start_mock_server;
use feed_test_support::wait_until;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::ResponseTemplate;

use super::TEST_TOKEN;
use super::test_loader;

#[tokio::test]
async fn load_initial_keeps_server_order() {
    let server = start_mock_server().await;
    let recorder = mount_activity_list(
        &server,
        &[item("c1", "Hello world", 1), item("c2", "Newer", 5)],
    )
    .await;

    let items = test_loader(&server.uri(), 0)
        .load_initial()
        .await
        .expect("load succeeds");

    let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);

    let request = recorder.single_request();
    assert_eq!(request.query_value("limit").as_deref(), Some("50"));
    assert_eq!(request.bearer_token().as_deref(), Some(TEST_TOKEN));
}

#[tokio::test]
async fn load_failure_carries_detail_and_is_not_retried() {
    let server = start_mock_server().await;
    let recorder = mount_activity_list_error(&server, 500, json!({ "detail": "boom" })).await;

    let err = test_loader(&server.uri(), 5)
        .load_initial()
        .await
        .expect_err("load fails");

    assert_eq!(
        err,
        FeedError::FetchFailed {
            status: Some(500),
            detail: Some("boom".to_string()),
        }
    );
    assert_eq!(err.user_message(), "boom");
    assert_eq!(recorder.requests().len(), 1);
}

#[tokio::test]
async fn load_failure_without_detail_uses_generic_message() {
    let server = start_mock_server().await;
    mount_activity_list_error(&server, 503, json!({ "error": "unavailable" })).await;

    let err = test_loader(&server.uri(), 0)
        .load_initial()
        .await
        .expect_err("load fails");
    assert_eq!(err.user_message(), GENERIC_LOAD_ERROR);

    let unreachable = test_loader("http://127.0.0.1:9", 0)
        .load_initial()
        .await
        .expect_err("nothing listens on port 9");
    assert_eq!(
        unreachable,
        FeedError::FetchFailed {
            status: None,
            detail: None,
        }
    );
    assert_eq!(unreachable.user_message(), GENERIC_LOAD_ERROR);
}

#[tokio::test]
async fn stream_reconnects_with_since_until_budget_is_spent() {
    let server = start_mock_server().await;
    let recorder = mount_activity_stream_sequence(
        &server,
        vec![
            sse_response(sse(vec![ev_item(&item("c2", "streamed", 7))])),
            ResponseTemplate::new(503),
        ],
    )
    .await;

    let events: Vec<FeedStreamEvent> = test_loader(&server.uri(), 2)
        .stream_events(ResumeCursor::default())
        .collect()
        .await;

    let items: Vec<String> = events
        .iter()
        .filter_map(|event| match event {
            FeedStreamEvent::Items(items) => Some(items.iter().map(|item| item.id.clone())),
            FeedStreamEvent::Status(_) => None,
        })
        .flatten()
        .collect();
    assert_eq!(items, vec!["c2".to_string()]);

    let attempts: Vec<u64> = events
        .iter()
        .filter_map(|event| match event {
            FeedStreamEvent::Status(StreamStatus::Reconnecting { attempt, .. }) => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2]);
    assert_matches!(
        events.first(),
        Some(FeedStreamEvent::Status(StreamStatus::Connecting))
    );
    assert_matches!(
        events.last(),
        Some(FeedStreamEvent::Status(StreamStatus::Disconnected {
            error: FeedError::Stream(reason)
        })) if reason.contains("503")
    );

    // The clean close after c2 is free; the three 503s spend the budget.
    let requests = recorder.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].query_value("since"), None);
    assert_eq!(
        requests[1].query_value("since").as_deref(),
        Some("2026-02-07T00:07:00Z")
    );
    assert_eq!(
        requests[1].header_value("accept").as_deref(),
        Some("text/event-stream")
    );
}

#[tokio::test]
async fn unauthorized_stream_is_not_retried() {
    let server = start_mock_server().await;
    let recorder = mount_activity_stream_sequence(
        &server,
        vec![ResponseTemplate::new(401).set_body_json(json!({ "detail": "Not authenticated" }))],
    )
    .await;

    let events: Vec<FeedStreamEvent> = test_loader(&server.uri(), 5)
        .stream_events(ResumeCursor::default())
        .collect()
        .await;

    assert_eq!(events.len(), 2, "connecting then disconnected: {events:?}");
    assert_matches!(
        &events[1],
        FeedStreamEvent::Status(StreamStatus::Disconnected {
            error: FeedError::Stream(reason)
        }) if reason.contains("Not authenticated")
    );
    assert_eq!(recorder.requests().len(), 1);
}

#[tokio::test]
async fn subscription_forwards_every_item_until_cancelled() {
    let server = start_mock_server().await;
    mount_activity_stream_sequence(
        &server,
        vec![
            sse_response(sse(vec![
                ev_batch(&[item("c1", "one", 1), item("c2", "two", 2)]),
                ev_comment(&item("c3", "three", 3)),
            ])),
            sse_response(String::new()).set_delay(Duration::from_secs(30)),
        ],
    )
    .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = test_loader(&server.uri(), 5).subscribe_stream(move |item| {
        sink.lock().expect("lock").push(item.id);
    });

    let complete = wait_until(Duration::from_secs(5), || {
        seen.lock().expect("lock").len() == 3
    })
    .await;
    assert!(complete, "expected three items, saw {:?}", seen.lock().expect("lock"));
    assert_eq!(
        *seen.lock().expect("lock"),
        vec!["c1".to_string(), "c2".to_string(), "c3".to_string()]
    );

    assert!(!subscription.is_finished());
    subscription.cancel();
    tokio::time::timeout(Duration::from_secs(5), subscription.join())
        .await
        .expect("subscription stops after cancel");
}

#[tokio::test]
async fn empty_stream_reconnects_quietly() {
    let server = start_mock_server().await;
    let recorder = mount_activity_stream(&server, String::new()).await;

    let mut stream = test_loader(&server.uri(), 0).stream_events(ResumeCursor::default());
    let mut events = Vec::new();
    let _ = tokio::time::timeout(Duration::from_millis(500), async {
        while let Some(event) = stream.next().await {
            events.push(event);
        }
    })
    .await;
    drop(stream);

    assert!(
        recorder.requests().len() >= 2,
        "stream should reconnect after a clean close"
    );
    assert!(
        events.iter().all(|event| matches!(
            event,
            FeedStreamEvent::Status(StreamStatus::Connecting | StreamStatus::Connected)
        )),
        "{events:?}"
    );
}
