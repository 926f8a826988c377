//! How a session reaches the gateway.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;

use fr_domain::config::ClientConfig;
use fr_domain::stream::BoxStream;
use fr_domain::wire::MessageList;

use crate::error::ClientError;

/// Body of `POST /v1/chat/turn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnPayload {
    pub thread_id: String,
    pub message: String,
    pub assistant_id: String,
    pub streaming: bool,
}

/// A successful turn response: an SSE byte stream, or the whole message
/// listing when the server answered with JSON.
pub enum TurnResponse {
    Stream(BoxStream<'static, Result<Vec<u8>, ClientError>>),
    Messages(MessageList),
}

impl std::fmt::Debug for TurnResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnResponse::Stream(_) => f.write_str("TurnResponse::Stream(..)"),
            TurnResponse::Messages(list) => f.debug_tuple("TurnResponse::Messages").field(list).finish(),
        }
    }
}

#[async_trait]
pub trait TurnTransport: Send + Sync {
    async fn send_turn(&self, payload: &TurnPayload) -> Result<TurnResponse, ClientError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// reqwest transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ReqwestTransport {
    /// No request timeout is set on the client: a turn's lifetime is
    /// bounded by the session.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url, token })
    }

    /// Build from `[client]`, reading the bearer token from `token_env`.
    pub fn from_config(cfg: &ClientConfig) -> Result<Self, ClientError> {
        let token = std::env::var(&cfg.token_env).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(env = %cfg.token_env, "no gateway token set; requests will be rejected");
        }
        Self::new(cfg.base_url.clone(), token)
    }

    fn authorized(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// `GET /v1/chat/messages`, newest first.
    pub async fn list_messages(&self, thread_id: &str) -> Result<MessageList, ClientError> {
        let resp = self
            .authorized(self.http.get(format!("{}/v1/chat/messages", self.base_url)))
            .query(&[("threadId", thread_id)])
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl TurnTransport for ReqwestTransport {
    async fn send_turn(&self, payload: &TurnPayload) -> Result<TurnResponse, ClientError> {
        let resp = self
            .authorized(self.http.post(format!("{}/v1/chat/turn", self.base_url)))
            .json(payload)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let is_sse = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        if is_sse {
            let body = resp
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ClientError::from));
            Ok(TurnResponse::Stream(Box::pin(body)))
        } else {
            Ok(TurnResponse::Messages(resp.json().await?))
        }
    }
}

/// Map a non-2xx response to [`ClientError::Status`], preferring the
/// server's `{error}` text over the raw body.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or_else(|| format!("HTTP {}: {body}", status.as_u16()));
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_camel_case() {
        let v = serde_json::to_value(TurnPayload {
            thread_id: "t".into(),
            message: "m".into(),
            assistant_id: "a".into(),
            streaming: true,
        })
        .unwrap();
        assert_eq!(v["threadId"], "t");
        assert_eq!(v["assistantId"], "a");
        assert_eq!(v["streaming"], true);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let t = ReqwestTransport::new("http://localhost:3210/", None).unwrap();
        assert_eq!(t.base_url, "http://localhost:3210");
    }
}
