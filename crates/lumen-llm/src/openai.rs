//! OpenAI-compatible chat completion transport.
//!
//! Speaks the `/chat/completions` wire shape: JSON request, JSON reply on the
//! single-shot path, `data:`-framed server-sent events carrying content
//! deltas on the streaming path.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{instrument, warn};

use lumen_core::errors::TransportError;

use crate::transport::{ChatRequest, ChatTransport, Completion, FragmentStream};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub proxy: Option<String>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            proxy: None,
        }
    }

    /// Point at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

pub struct OpenAiTransport {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiTransport {
    pub fn new(config: OpenAiConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder().connect_timeout(CONNECT_TIMEOUT);
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| TransportError::Connection(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, TransportError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status: status.as_u16(), body });
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, TransportError> {
        let response = self.send(request).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Malformed("response carried no choices".into()))?;
        Ok(Completion {
            content: choice.message.content,
            prompt_tokens: parsed.usage.prompt_tokens,
            completion_tokens: parsed.usage.completion_tokens,
        })
    }

    #[instrument(skip_all, fields(model = %request.model))]
    async fn open_stream(&self, request: &ChatRequest) -> Result<FragmentStream, TransportError> {
        let response = self.send(request).await?;
        Ok(Box::pin(DeltaStream::new(response.bytes_stream())))
    }
}

fn classify(e: &reqwest::Error) -> TransportError {
    if e.is_body() || e.is_decode() {
        TransportError::Stream(e.to_string())
    } else {
        TransportError::Connection(e.to_string())
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: ReportedUsage,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Default)]
struct ReportedUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct StreamEvent {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Adapts an SSE byte stream into content fragments.
///
/// Events are framed by blank lines; each `data:` line carries one JSON delta
/// event, except the literal `[DONE]` sentinel which ends the stream. Byte
/// chunks can split frames (and multibyte characters) anywhere, so framing is
/// done on raw bytes.
struct DeltaStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    buffer: Vec<u8>,
    ready: VecDeque<String>,
    done: bool,
}

impl DeltaStream {
    fn new(inner: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static) -> Self {
        Self { inner: Box::pin(inner), buffer: Vec::new(), ready: VecDeque::new(), done: false }
    }

    fn drain_frames(&mut self) {
        while let Some(end) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let frame = String::from_utf8_lossy(&frame[..end]);
            if parse_frame(&frame, &mut self.ready) {
                self.done = true;
                break;
            }
        }
    }

    fn drain_trailing(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let frame = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
        if parse_frame(&frame, &mut self.ready) {
            self.done = true;
        }
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

/// Parse one SSE frame, pushing content fragments. Returns true on `[DONE]`.
fn parse_frame(frame: &str, out: &mut VecDeque<String>) -> bool {
    for line in frame.lines() {
        let Some(data) = line.strip_prefix("data:") else { continue };
        let data = data.trim();
        if data == "[DONE]" {
            return true;
        }
        match serde_json::from_str::<StreamEvent>(data) {
            Ok(event) => {
                for choice in event.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            out.push_back(content);
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "skipping unparseable stream event"),
        }
    }
    false
}

impl Stream for DeltaStream {
    type Item = Result<String, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(fragment) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(fragment)));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    this.drain_frames();
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(classify(&e))));
                }
                Poll::Ready(None) => {
                    this.drain_trailing();
                    this.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};

    fn event(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    async fn collect(chunks: Vec<&[u8]>) -> Vec<String> {
        let source = stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
                .collect::<Vec<Result<Bytes, reqwest::Error>>>(),
        );
        let mut fragments = DeltaStream::new(source);
        let mut collected = Vec::new();
        while let Some(item) = fragments.next().await {
            collected.push(item.unwrap());
        }
        collected
    }

    #[test]
    fn parse_frame_extracts_delta_content() {
        let mut out = VecDeque::new();
        let done = parse_frame(
            r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
            &mut out,
        );
        assert!(!done);
        assert_eq!(out.pop_front().as_deref(), Some("Hello"));
    }

    #[test]
    fn parse_frame_detects_done_sentinel() {
        let mut out = VecDeque::new();
        assert!(parse_frame("data: [DONE]", &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn parse_frame_skips_empty_deltas_and_comments() {
        let mut out = VecDeque::new();
        let frame = ": keep-alive\ndata: {\"choices\":[{\"delta\":{}}]}";
        assert!(!parse_frame(frame, &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn parse_frame_tolerates_garbage_lines() {
        let mut out = VecDeque::new();
        assert!(!parse_frame("data: not json at all", &mut out));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn delta_stream_yields_fragments_in_order() {
        let body = format!("{}{}data: [DONE]\n\n", event("Hi"), event(" there"));
        let fragments = collect(vec![body.as_bytes()]).await;
        assert_eq!(fragments, vec!["Hi", " there"]);
    }

    #[tokio::test]
    async fn delta_stream_reassembles_split_frames() {
        let body = event("split across chunks");
        let (left, right) = body.as_bytes().split_at(17);
        let fragments = collect(vec![left, right, b"data: [DONE]\n\n"]).await;
        assert_eq!(fragments, vec!["split across chunks"]);
    }

    #[tokio::test]
    async fn delta_stream_survives_multibyte_split() {
        let body = event("héllo");
        // Split inside the two-byte é.
        let split = body.find('\u{e9}').unwrap() + 1;
        let (left, right) = body.as_bytes().split_at(split);
        let fragments = collect(vec![left, right]).await;
        assert_eq!(fragments, vec!["héllo"]);
    }

    #[tokio::test]
    async fn delta_stream_stops_after_done() {
        let body = format!("{}data: [DONE]\n\n{}", event("kept"), event("ignored"));
        let fragments = collect(vec![body.as_bytes()]).await;
        assert_eq!(fragments, vec!["kept"]);
    }

    #[tokio::test]
    async fn delta_stream_handles_missing_done() {
        let fragments = collect(vec![event("tail").as_bytes()]).await;
        assert_eq!(fragments, vec!["tail"]);
    }

    #[test]
    fn config_builders() {
        let config = OpenAiConfig::new("sk-test")
            .with_base_url("http://localhost:8080/v1/")
            .with_proxy("http://proxy:3128");
        assert_eq!(config.base_url, "http://localhost:8080/v1/");
        assert_eq!(config.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(config.api_key.expose_secret(), "sk-test");
    }

    #[test]
    fn transport_builds_with_defaults() {
        let transport = OpenAiTransport::new(OpenAiConfig::new("sk-test")).unwrap();
        assert_eq!(transport.name(), "openai");
    }
}
