use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use activity_feed_api::ActivityItem;
use activity_feed_api::TASK_COMMENTS_PATH;
use activity_feed_api::TASK_COMMENTS_STREAM_PATH;
use serde_json::Value;
use serde_json::json;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::Respond;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

pub async fn start_mock_server() -> MockServer {
    MockServer::start().await
}

/// Requests answered by the mock it was mounted with, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ResponseMock {
    requests: Arc<Mutex<Vec<wiremock::Request>>>,
}

impl ResponseMock {
    pub fn requests(&self) -> Vec<wiremock::Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn single_request(&self) -> wiremock::Request {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one request");
        requests
            .into_iter()
            .next()
            .expect("one request was recorded")
    }

    fn record(&self, request: &wiremock::Request) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
    }
}

/// Answers the n-th request with the n-th template; the last one repeats.
struct SequenceResponder {
    recorder: ResponseMock,
    responses: Vec<ResponseTemplate>,
    calls: AtomicUsize,
}

impl Respond for SequenceResponder {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        self.recorder.record(request);
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.responses.len().saturating_sub(1));
        self.responses
            .get(index)
            .cloned()
            .unwrap_or_else(|| ResponseTemplate::new(404))
    }
}

/// Frame JSON payloads as a `text/event-stream` body.
pub fn sse(events: Vec<Value>) -> String {
    events
        .into_iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

pub fn ev_item(item: &ActivityItem) -> Value {
    json!(item)
}

pub fn ev_comment(item: &ActivityItem) -> Value {
    json!({ "comment": item })
}

pub fn ev_batch(items: &[ActivityItem]) -> Value {
    json!({ "items": items })
}

pub fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

pub async fn mount_activity_list(server: &MockServer, items: &[ActivityItem]) -> ResponseMock {
    mount_activity_list_response(
        server,
        ResponseTemplate::new(200).set_body_json(json!({ "items": items })),
    )
    .await
}

pub async fn mount_activity_list_error(
    server: &MockServer,
    status: u16,
    body: Value,
) -> ResponseMock {
    mount_activity_list_response(server, ResponseTemplate::new(status).set_body_json(body)).await
}

pub async fn mount_activity_list_response(
    server: &MockServer,
    response: ResponseTemplate,
) -> ResponseMock {
    mount_sequence(server, TASK_COMMENTS_PATH, vec![response]).await
}

/// Every stream connection gets `body` and then EOF.
pub async fn mount_activity_stream(server: &MockServer, body: String) -> ResponseMock {
    mount_activity_stream_sequence(server, vec![sse_response(body)]).await
}

/// The n-th stream connection gets the n-th response; the last repeats.
pub async fn mount_activity_stream_sequence(
    server: &MockServer,
    responses: Vec<ResponseTemplate>,
) -> ResponseMock {
    mount_sequence(server, TASK_COMMENTS_STREAM_PATH, responses).await
}

async fn mount_sequence(
    server: &MockServer,
    relative: &str,
    responses: Vec<ResponseTemplate>,
) -> ResponseMock {
    let recorder = ResponseMock::default();
    Mock::given(method("GET"))
        .and(path(format!("/{relative}")))
        .respond_with(SequenceResponder {
            recorder: recorder.clone(),
            responses,
            calls: AtomicUsize::new(0),
        })
        .mount(server)
        .await;
    recorder
}
