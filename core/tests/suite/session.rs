use std::time::Duration;

use activity_feed_core::FeedError;
use activity_feed_core::FeedPhase;
use activity_feed_core::FeedSession;
use activity_feed_core::FeedView;
use activity_feed_core::StreamStatus;
use assert_matches::assert_matches;
use feed_test_support::item;
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
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use wiremock::ResponseTemplate;

use super::FakeAuthenticator;
use super::test_loader;

#[tokio::test]
async fn session_merges_stream_into_loaded_feed() {
    let server = start_mock_server().await;
    mount_activity_list(&server, &[item("c1", "Hello world", 1)]).await;
    mount_activity_stream_sequence(
        &server,
        vec![
            sse_response(sse(vec![
                ev_comment(&item("c2", "from the stream", 3)),
                ev_item(&item("c1", "edited", 1)),
                ev_item(&item("c1", "edited", 1)),
            ])),
            sse_response(String::new()).set_delay(Duration::from_secs(30)),
        ],
    )
    .await;

    let session = FeedSession::new(test_loader(&server.uri(), 5), FakeAuthenticator::signed_in());
    let (tx, mut rx) = watch::channel(FeedView::new());
    let cancel = CancellationToken::new();

    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { session.run(tx, cancel).await })
    };

    let view = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|view| {
            view.items().is_some_and(|items| {
                items.len() == 2
                    && items.get("c1").map(|item| item.message.as_str()) == Some("edited")
            })
        }),
    )
    .await
    .expect("stream items merged in time")
    .expect("session still publishing")
    .clone();

    let messages: Vec<&str> = view
        .items()
        .expect("loaded")
        .iter()
        .map(|item| item.message.as_str())
        .collect();
    assert_eq!(messages, vec!["from the stream", "edited"]);

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("session stops after cancel")
        .expect("session task joins");
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn empty_stream_keeps_session_live_without_error() {
    let server = start_mock_server().await;
    mount_activity_list(&server, &[]).await;
    let stream = mount_activity_stream(&server, String::new()).await;

    let session = FeedSession::new(test_loader(&server.uri(), 1), FakeAuthenticator::signed_in());
    let (tx, mut rx) = watch::channel(FeedView::new());
    let cancel = CancellationToken::new();
    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { session.run(tx, cancel).await })
    };

    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|view| matches!(view.phase(), FeedPhase::Loaded(_))),
    )
    .await
    .expect("feed loads in time")
    .expect("session still publishing");
    let reconnected = wait_until(Duration::from_secs(5), || stream.requests().len() >= 3).await;
    assert!(reconnected, "stream should keep reconnecting after clean closes");

    assert!(!run.is_finished(), "session must not give up on an empty stream");
    let view = rx.borrow().clone();
    assert_matches!(view.phase(), FeedPhase::Loaded(items) if items.is_empty());
    assert_matches!(
        view.stream_status(),
        Some(StreamStatus::Connecting | StreamStatus::Connected)
    );

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("session stops after cancel")
        .expect("session task joins");
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn feed_stays_loaded_when_stream_is_rejected() {
    let server = start_mock_server().await;
    mount_activity_list(&server, &[item("c1", "Hello world", 1)]).await;
    mount_activity_stream_sequence(
        &server,
        vec![ResponseTemplate::new(401).set_body_json(json!({ "detail": "Not authenticated" }))],
    )
    .await;

    let session = FeedSession::new(test_loader(&server.uri(), 5), FakeAuthenticator::signed_in());
    let (tx, rx) = watch::channel(FeedView::new());

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        session.run(tx, CancellationToken::new()),
    )
    .await
    .expect("session ends once the stream gives up");
    assert_eq!(result, Ok(()));

    let view = rx.borrow().clone();
    assert_matches!(view.phase(), FeedPhase::Loaded(items) if items.len() == 1);
    assert_matches!(
        view.stream_status(),
        Some(StreamStatus::Disconnected {
            error: FeedError::Stream(reason)
        }) if reason.contains("Not authenticated")
    );
}

#[tokio::test]
async fn failed_fetch_is_published_and_returned() {
    let server = start_mock_server().await;
    mount_activity_list_error(&server, 500, json!({ "detail": "boom" })).await;
    mount_activity_stream(&server, String::new()).await;

    let session = FeedSession::new(test_loader(&server.uri(), 0), FakeAuthenticator::signed_in());
    let (tx, rx) = watch::channel(FeedView::new());

    let result = session.run(tx, CancellationToken::new()).await;
    let expected = FeedError::FetchFailed {
        status: Some(500),
        detail: Some("boom".to_string()),
    };
    assert_eq!(result, Err(expected.clone()));
    assert_eq!(rx.borrow().phase(), &FeedPhase::Failed(expected));
}

#[tokio::test]
async fn signed_out_session_never_loads() {
    let server = start_mock_server().await;
    let list = mount_activity_list(&server, &[item("c1", "Hello world", 1)]).await;
    let stream = mount_activity_stream(&server, String::new()).await;

    let session = FeedSession::new(
        test_loader(&server.uri(), 0),
        FakeAuthenticator::signed_out(false),
    );
    let (tx, rx) = watch::channel(FeedView::new());

    let result = session.run(tx, CancellationToken::new()).await;
    assert_eq!(result, Err(FeedError::AuthRequired));
    assert_eq!(rx.borrow().phase(), &FeedPhase::Unauthenticated);
    assert!(list.requests().is_empty());
    assert!(stream.requests().is_empty());

    assert_eq!(session.load_once().await.phase(), &FeedPhase::Unauthenticated);
}

#[tokio::test]
async fn load_once_signs_in_then_loads() {
    let server = start_mock_server().await;
    mount_activity_list(&server, &[item("c1", "Hello world", 1)]).await;

    let session = FeedSession::new(
        test_loader(&server.uri(), 0),
        FakeAuthenticator::signed_out(true),
    );

    let view = session.load_once().await;
    let titles: Vec<Option<&str>> = view
        .items()
        .expect("loaded")
        .iter()
        .map(|item| item.task_title.as_deref())
        .collect();
    assert_eq!(titles, vec![Some("CI hardening")]);
    assert_eq!(view.stream_status(), None);
}
