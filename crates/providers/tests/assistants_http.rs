//! The assistants adapter against an in-process HTTP double.
//!
//! The double speaks just enough of the REST surface for each test and
//! serves the run stream in deliberately awkward chunks.

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fr_domain::config::OpenAiConfig;
use fr_domain::error::Error;
use fr_providers::{AssistantProvider, OpenAiAssistantsProvider, RunEvent, RunStatus, ToolKind};
use futures_util::StreamExt;
use std::collections::HashMap;

const RUN_STREAM: &str = concat!(
    "event: thread.run.created\n",
    "data: {\"id\":\"run_1\",\"status\":\"queued\"}\n\n",
    "event: thread.run.step.created\n",
    "data: {\"id\":\"step_1\",\"type\":\"tool_calls\"}\n\n",
    "event: thread.run.step.delta\n",
    "data: {\"id\":\"step_1\",\"delta\":{\"step_details\":{\"type\":\"tool_calls\",\"tool_calls\":[{\"index\":0,\"type\":\"file_search\"}]}}}\n\n",
    "event: thread.message.delta\n",
    "data: {\"id\":\"msg_1\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"Caf\u{e9} margins\"}}]}}\n\n",
    "event: thread.message.completed\n",
    "data: {\"id\":\"msg_1\",\"content\":[{\"type\":\"text\",\"text\":{\"value\":\"Caf\u{e9} margins\",\"annotations\":[]}}]}\n\n",
    "event: thread.run.completed\n",
    "data: {\"id\":\"run_1\",\"status\":\"completed\"}\n\n",
    "event: done\n",
    "data: [DONE]\n\n",
);

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer sk-test")
        && headers.get("openai-beta").and_then(|v| v.to_str().ok()) == Some("assistants=v2")
}

/// Split the stream every 7 bytes so frames and lines straddle chunk
/// boundaries.
fn chunked_stream() -> Body {
    let chunks: Vec<Result<Bytes, std::io::Error>> = RUN_STREAM
        .as_bytes()
        .chunks(7)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Body::from_stream(futures_util::stream::iter(chunks))
}

async fn create_message(headers: HeaderMap, Path(_thread): Path<String>) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "{\"error\":{\"message\":\"bad key\"}}").into_response();
    }
    Json(serde_json::json!({ "id": "msg_user_1", "role": "user" })).into_response()
}

async fn create_run(Path(_thread): Path<String>, Json(body): Json<serde_json::Value>) -> Response {
    if body["stream"] == true {
        return Response::builder()
            .header("content-type", "text/event-stream")
            .body(chunked_stream())
            .unwrap();
    }
    Json(serde_json::json!({ "id": "run_2", "status": "queued" })).into_response()
}

async fn list_steps(
    Path((_thread, _run)): Path<(String, String)>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let with_content = q.contains_key("include[]");
    let content = if with_content {
        serde_json::json!([{ "type": "text", "text": "<<2>> chunk" }])
    } else {
        serde_json::Value::Null
    };
    Json(serde_json::json!({
        "data": [{
            "id": "step_1",
            "type": "tool_calls",
            "step_details": { "type": "tool_calls", "tool_calls": [{
                "id": "call_1",
                "type": "file_search",
                "file_search": { "results": [{ "file_id": "file_42", "score": 0.7, "content": content }] }
            }]}
        }]
    }))
}

async fn get_file(Path(file_id): Path<String>) -> Response {
    if file_id == "file_missing" {
        return (StatusCode::NOT_FOUND, "no such file").into_response();
    }
    Json(serde_json::json!({ "id": file_id, "filename": "pricing.pdf", "bytes": 1024 })).into_response()
}

/// Start the double and return its base URL.
async fn spawn_double() -> String {
    let app = Router::new()
        .route("/v1/threads/:thread/messages", post(create_message))
        .route("/v1/threads/:thread/runs", post(create_run))
        .route("/v1/threads/:thread/runs/:run/steps", get(list_steps))
        .route("/v1/files/:file_id", get(get_file));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1")
}

fn provider(base_url: String, key: &str) -> OpenAiAssistantsProvider {
    let cfg = OpenAiConfig {
        base_url,
        ..Default::default()
    };
    OpenAiAssistantsProvider::new(&cfg, key.into()).unwrap()
}

async fn connected() -> OpenAiAssistantsProvider {
    provider(spawn_double().await, "sk-test")
}

#[tokio::test]
async fn append_message_sends_key_and_beta_header() {
    let provider = connected().await;
    let id = provider.append_message("thread_1", "hello").await.unwrap();
    assert_eq!(id, "msg_user_1");
}

#[tokio::test]
async fn rejected_request_surfaces_status_and_body() {
    let wrong = provider(spawn_double().await, "sk-wrong");
    let err = wrong.append_message("thread_1", "hello").await.unwrap_err();
    match err {
        Error::Provider { message, .. } => {
            assert!(message.starts_with("HTTP 401"));
            assert!(message.contains("bad key"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn streamed_run_survives_arbitrary_chunking() {
    let provider = connected().await;
    let stream = provider.stream_run("thread_1", "asst_1").await.unwrap();
    let events: Vec<RunEvent> = stream.map(|e| e.unwrap()).collect().await;

    assert_eq!(events[0], RunEvent::RunCreated { run_id: "run_1".into() });
    assert_eq!(events[1], RunEvent::StepCreated { step_type: "tool_calls".into() });
    assert_eq!(events[2], RunEvent::StepDelta { tool_kinds: vec![ToolKind::FileSearch] });
    assert_eq!(events[3], RunEvent::ToolCallCreated { kind: ToolKind::FileSearch });
    assert_eq!(events[4], RunEvent::TextCreated);
    assert_eq!(events[5], RunEvent::TextDelta { value: "Caf\u{e9} margins".into() });
    assert!(matches!(&events[6], RunEvent::MessageDone { message } if message.text == "Caf\u{e9} margins"));
    assert_eq!(
        events[7],
        RunEvent::RunFinished { status: RunStatus::Completed, last_error: None }
    );
    assert_eq!(events.len(), 8);
}

#[tokio::test]
async fn blocking_run_returns_run_info() {
    let provider = connected().await;
    let run = provider.create_run("thread_1", "asst_1").await.unwrap();
    assert_eq!(run.id, "run_2");
    assert_eq!(run.status, RunStatus::Queued);
}

#[tokio::test]
async fn run_steps_request_chunk_content_only_when_asked() {
    let provider = connected().await;

    let with = provider.list_run_steps("thread_1", "run_1", true).await.unwrap();
    let result = &with[0].tool_calls[0].file_search_results[0];
    assert_eq!(result.content.as_deref(), Some("<<2>> chunk"));

    let without = provider.list_run_steps("thread_1", "run_1", false).await.unwrap();
    assert!(without[0].tool_calls[0].file_search_results[0].content.is_none());
}

#[tokio::test]
async fn file_metadata_lookup_and_failure() {
    let provider = connected().await;
    let meta = provider.file_metadata("file_42").await.unwrap();
    assert_eq!(meta.filename, "pricing.pdf");
    assert_eq!(meta.bytes, Some(1024));

    let err = provider.file_metadata("file_missing").await.unwrap_err();
    assert!(err.to_string().contains("HTTP 404"));
}
