//! OpenAI Assistants (v2) adapter.
//!
//! Threads, messages, runs, run steps and file metadata over the REST API,
//! plus the named-event SSE stream a run emits when opened with
//! `stream: true`.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use fr_domain::config::OpenAiConfig;
use fr_domain::error::{Error, Result};
use fr_domain::stream::BoxStream;
use fr_domain::trace::TraceEvent;
use serde_json::Value;

use crate::sse::SseBlock;
use crate::traits::{
    Annotation, AnnotationKind, AssistantProvider, CompletedMessage, FileMetadata,
    FileSearchResult, RunEvent, RunInfo, RunStatus, RunStep, ThreadMessage, ToolCallTrace,
    ToolKind,
};
use crate::util::{from_reqwest, resolve_api_key};

/// Query value asking run-step listings to include retrieved chunk text.
const CHUNK_CONTENT_INCLUDE: &str = "step_details.tool_calls[*].file_search.results[*].content";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiAssistantsProvider {
    id: String,
    base_url: String,
    api_key: String,
    beta_header: String,
    client: reqwest::Client,
}

impl OpenAiAssistantsProvider {
    pub fn from_config(cfg: &OpenAiConfig) -> Result<Self> {
        let api_key = resolve_api_key(cfg)?;
        Self::new(cfg, api_key)
    }

    /// Build with an explicit key, bypassing config/env resolution.
    pub fn new(cfg: &OpenAiConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: "openai".into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            beta_header: cfg.beta_header.clone(),
            client,
        })
    }

    // ── Internal: request plumbing ────────────────────────────────

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", &self.beta_header)
    }

    /// Send and check the status.  Non-2xx responses become
    /// [`Error::Provider`] carrying the response body.
    async fn send(&self, operation: &str, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let start = Instant::now();
        let resp = req.send().await.map_err(from_reqwest)?;
        let status = resp.status();

        TraceEvent::ProviderRequest {
            provider: self.id.clone(),
            operation: operation.to_string(),
            status: status.as_u16(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
        .emit();

        if !status.is_success() {
            let body = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), body),
            });
        }
        Ok(resp)
    }

    async fn send_json(&self, operation: &str, req: reqwest::RequestBuilder) -> Result<Value> {
        let resp = self.send(operation, req).await?;
        let text = resp.text().await.map_err(from_reqwest)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn missing(&self, what: &str) -> Error {
        Error::Provider {
            provider: self.id.clone(),
            message: format!("missing '{what}' in response"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(|x| x.as_str())
}

fn parse_run(v: &Value) -> Option<RunInfo> {
    Some(RunInfo {
        id: str_field(v, "id")?.to_string(),
        status: RunStatus::from_wire(str_field(v, "status").unwrap_or("")),
        last_error: v
            .get("last_error")
            .and_then(|e| str_field(e, "message"))
            .map(String::from),
    })
}

fn parse_annotation(v: &Value) -> Option<Annotation> {
    let text = str_field(v, "text").unwrap_or("").to_string();
    let kind = match str_field(v, "type")? {
        "file_citation" => {
            let fc = v.get("file_citation")?;
            AnnotationKind::FileCitation {
                file_id: str_field(fc, "file_id")?.to_string(),
                quote: str_field(fc, "quote").map(String::from),
            }
        }
        "file_path" => AnnotationKind::FilePath {
            file_id: v
                .get("file_path")
                .and_then(|fp| str_field(fp, "file_id"))
                .unwrap_or("")
                .to_string(),
        },
        other => AnnotationKind::Other(other.to_string()),
    };
    Some(Annotation {
        text,
        start_index: v.get("start_index").and_then(|x| x.as_u64()).map(|n| n as usize),
        end_index: v.get("end_index").and_then(|x| x.as_u64()).map(|n| n as usize),
        kind,
    })
}

/// Text and annotations of the first text part of a message's content.
fn parse_message_text(content: Option<&Value>) -> (String, Vec<Annotation>) {
    let part = content
        .and_then(|c| c.as_array())
        .and_then(|parts| parts.iter().find(|p| str_field(p, "type") == Some("text")))
        .and_then(|p| p.get("text"));

    match part {
        Some(text) => {
            let value = str_field(text, "value").unwrap_or("").to_string();
            let annotations = text
                .get("annotations")
                .and_then(|a| a.as_array())
                .map(|arr| arr.iter().filter_map(parse_annotation).collect())
                .unwrap_or_default();
            (value, annotations)
        }
        None => (String::new(), Vec::new()),
    }
}

fn parse_thread_message(v: &Value) -> Option<ThreadMessage> {
    let (text, annotations) = parse_message_text(v.get("content"));
    Some(ThreadMessage {
        id: str_field(v, "id")?.to_string(),
        role: str_field(v, "role").unwrap_or("assistant").to_string(),
        created_at: v.get("created_at").and_then(|x| x.as_i64()).unwrap_or(0),
        text,
        annotations,
    })
}

fn parse_file_search_result(v: &Value) -> Option<FileSearchResult> {
    let content = v.get("content").and_then(|c| c.as_array()).map(|parts| {
        parts
            .iter()
            .filter(|p| str_field(p, "type") == Some("text"))
            .filter_map(|p| str_field(p, "text"))
            .collect::<String>()
    });
    Some(FileSearchResult {
        file_id: str_field(v, "file_id")?.to_string(),
        score: v.get("score").and_then(|s| s.as_f64()),
        content,
    })
}

fn parse_tool_call(v: &Value) -> Option<ToolCallTrace> {
    let kind = ToolKind::from_wire(str_field(v, "type")?);
    let file_search_results = match kind {
        ToolKind::FileSearch => v
            .get("file_search")
            .and_then(|fs| fs.get("results"))
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(parse_file_search_result).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    Some(ToolCallTrace {
        kind,
        file_search_results,
    })
}

fn parse_run_step(v: &Value) -> Option<RunStep> {
    let details = v.get("step_details");
    let tool_calls = details
        .and_then(|d| d.get("tool_calls"))
        .and_then(|t| t.as_array())
        .map(|arr| arr.iter().filter_map(parse_tool_call).collect())
        .unwrap_or_default();
    Some(RunStep {
        id: str_field(v, "id")?.to_string(),
        step_type: str_field(v, "type").unwrap_or("").to_string(),
        tool_calls,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE streaming helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Translates named stream events into [`RunEvent`]s.
///
/// Deltas do not say when a text part or tool call is new, so the parser
/// remembers which `(id, index)` pairs it has already announced.
#[derive(Default)]
pub(crate) struct RunStreamParser {
    text_parts: HashSet<(String, u64)>,
    tool_calls: HashMap<(String, u64), ToolKind>,
}

impl RunStreamParser {
    pub(crate) fn parse(&mut self, block: &SseBlock) -> Vec<Result<RunEvent>> {
        let Some(event) = block.event.as_deref() else {
            return Vec::new();
        };
        if event == "done" || block.data.trim() == "[DONE]" {
            return Vec::new();
        }

        let v: Value = match serde_json::from_str(&block.data) {
            Ok(v) => v,
            Err(e) => return vec![Err(Error::Json(e))],
        };

        match event {
            "thread.run.created" => match str_field(&v, "id") {
                Some(id) => vec![Ok(RunEvent::RunCreated {
                    run_id: id.to_string(),
                })],
                None => Vec::new(),
            },
            "thread.run.step.created" => vec![Ok(RunEvent::StepCreated {
                step_type: str_field(&v, "type").unwrap_or("unknown").to_string(),
            })],
            "thread.run.step.delta" => self.step_delta(&v),
            "thread.message.delta" => self.message_delta(&v),
            "thread.message.completed" => {
                let (text, annotations) = parse_message_text(v.get("content"));
                match str_field(&v, "id") {
                    Some(id) => vec![Ok(RunEvent::MessageDone {
                        message: CompletedMessage {
                            id: id.to_string(),
                            text,
                            annotations,
                        },
                    })],
                    None => Vec::new(),
                }
            }
            "thread.run.completed"
            | "thread.run.failed"
            | "thread.run.cancelled"
            | "thread.run.expired"
            | "thread.run.incomplete"
            | "thread.run.requires_action" => {
                let status = str_field(&v, "status")
                    .map(RunStatus::from_wire)
                    .unwrap_or_else(|| RunStatus::from_wire(event.trim_start_matches("thread.run.")));
                let last_error = v
                    .get("last_error")
                    .and_then(|e| str_field(e, "message"))
                    .map(String::from);
                vec![Ok(RunEvent::RunFinished { status, last_error })]
            }
            "error" => vec![Err(Error::Provider {
                provider: "openai".into(),
                message: str_field(&v, "message")
                    .map(String::from)
                    .unwrap_or_else(|| block.data.clone()),
            })],
            _ => Vec::new(),
        }
    }

    fn step_delta(&mut self, v: &Value) -> Vec<Result<RunEvent>> {
        let step_id = str_field(v, "id").unwrap_or("").to_string();
        let calls = v
            .get("delta")
            .and_then(|d| d.get("step_details"))
            .and_then(|d| d.get("tool_calls"))
            .and_then(|t| t.as_array());

        let mut kinds = Vec::new();
        let mut created = Vec::new();
        for call in calls.into_iter().flatten() {
            let index = call.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
            let key = (step_id.clone(), index);
            let kind = match str_field(call, "type") {
                Some(t) => ToolKind::from_wire(t),
                None => match self.tool_calls.get(&key) {
                    Some(k) => k.clone(),
                    None => continue,
                },
            };
            if !self.tool_calls.contains_key(&key) {
                self.tool_calls.insert(key, kind.clone());
                created.push(kind.clone());
            }
            kinds.push(kind);
        }

        let mut out = vec![Ok(RunEvent::StepDelta { tool_kinds: kinds })];
        out.extend(
            created
                .into_iter()
                .map(|kind| Ok(RunEvent::ToolCallCreated { kind })),
        );
        out
    }

    fn message_delta(&mut self, v: &Value) -> Vec<Result<RunEvent>> {
        let message_id = str_field(v, "id").unwrap_or("").to_string();
        let parts = v
            .get("delta")
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_array());

        let mut out = Vec::new();
        for part in parts.into_iter().flatten() {
            if str_field(part, "type") != Some("text") {
                continue;
            }
            let index = part.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
            if self.text_parts.insert((message_id.clone(), index)) {
                out.push(Ok(RunEvent::TextCreated));
            }
            let value = part
                .get("text")
                .and_then(|t| str_field(t, "value"))
                .unwrap_or("");
            if !value.is_empty() {
                out.push(Ok(RunEvent::TextDelta {
                    value: value.to_string(),
                }));
            }
        }
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl AssistantProvider for OpenAiAssistantsProvider {
    async fn append_message(&self, thread_id: &str, text: &str) -> Result<String> {
        let req = self
            .request(reqwest::Method::POST, &format!("/threads/{thread_id}/messages"))
            .json(&serde_json::json!({ "role": "user", "content": text }));
        let v = self.send_json("messages.create", req).await?;
        str_field(&v, "id")
            .map(String::from)
            .ok_or_else(|| self.missing("id"))
    }

    async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<BoxStream<'static, Result<RunEvent>>> {
        tracing::debug!(provider = %self.id, thread_id, assistant_id, "opening streamed run");

        let req = self
            .request(reqwest::Method::POST, &format!("/threads/{thread_id}/runs"))
            .header("Accept", "text/event-stream")
            .json(&serde_json::json!({ "assistant_id": assistant_id, "stream": true }));
        let resp = self.send("runs.stream", req).await?;

        let mut parser = RunStreamParser::default();
        Ok(crate::sse::sse_response_stream(resp, move |block| {
            parser.parse(block)
        }))
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunInfo> {
        let req = self
            .request(reqwest::Method::POST, &format!("/threads/{thread_id}/runs"))
            .json(&serde_json::json!({ "assistant_id": assistant_id }));
        let v = self.send_json("runs.create", req).await?;
        parse_run(&v).ok_or_else(|| self.missing("id"))
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunInfo> {
        let req = self.request(
            reqwest::Method::GET,
            &format!("/threads/{thread_id}/runs/{run_id}"),
        );
        let v = self.send_json("runs.retrieve", req).await?;
        parse_run(&v).ok_or_else(|| self.missing("id"))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        let req = self.request(
            reqwest::Method::POST,
            &format!("/threads/{thread_id}/runs/{run_id}/cancel"),
        );
        self.send("runs.cancel", req).await?;
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let req = self
            .request(reqwest::Method::GET, &format!("/threads/{thread_id}/messages"))
            .query(&[("order", "desc"), ("limit", "100")]);
        let v = self.send_json("messages.list", req).await?;
        let data = v
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| self.missing("data"))?;
        Ok(data.iter().filter_map(parse_thread_message).collect())
    }

    async fn list_run_steps(
        &self,
        thread_id: &str,
        run_id: &str,
        include_chunk_content: bool,
    ) -> Result<Vec<RunStep>> {
        let mut req = self
            .request(
                reqwest::Method::GET,
                &format!("/threads/{thread_id}/runs/{run_id}/steps"),
            )
            .query(&[("order", "asc"), ("limit", "100")]);
        if include_chunk_content {
            req = req.query(&[("include[]", CHUNK_CONTENT_INCLUDE)]);
        }
        let v = self.send_json("runs.steps.list", req).await?;
        let data = v
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| self.missing("data"))?;
        Ok(data.iter().filter_map(parse_run_step).collect())
    }

    async fn file_metadata(&self, file_id: &str) -> Result<FileMetadata> {
        let req = self.request(reqwest::Method::GET, &format!("/files/{file_id}"));
        let v = self.send_json("files.retrieve", req).await?;
        Ok(FileMetadata {
            id: str_field(&v, "id").unwrap_or(file_id).to_string(),
            filename: str_field(&v, "filename")
                .map(String::from)
                .ok_or_else(|| self.missing("filename"))?,
            bytes: v.get("bytes").and_then(|b| b.as_u64()),
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
