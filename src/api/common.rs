//! Request pipeline and stream dispatcher.
//!
//! One generic entry point drives all four adapters: decode the inbound
//! body, convert, fill the default model, resolve the upstream credential,
//! send, then translate either the buffered unary body or each arriving
//! byte chunk. The dispatcher owns the per-request parse buffer and the
//! adapter stream state; adapters never hold anything between requests.

use std::pin::Pin;
use std::sync::Arc;

use axum::response::Response;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use smallvec::SmallVec;

use crate::auth::resolve_token;
use crate::error::{stream_error_payload, GatewayError};
use crate::observability::log_request_complete;
use crate::protocol::{ChatAdapter, IngressProtocol};
use crate::state::AppState;
use crate::stream::{OutboundFrame, StreamFraming};
use crate::transport::error_excerpt;

pub(crate) fn ok_json_response(body: Bytes) -> Response {
    let mut response = Response::new(axum::body::Body::from(body));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

fn stream_ok_response(body: axum::body::Body, framing: StreamFraming) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(framing.content_type()),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

fn ingress_name(ingress: IngressProtocol) -> &'static str {
    match ingress {
        IngressProtocol::Ollama => "ollama",
        IngressProtocol::OpenAiChat => "openai_chat",
        IngressProtocol::Anthropic => "anthropic",
        IngressProtocol::OpenAiResponses => "openai_responses",
    }
}

/// Drive one chat request through an adapter.
///
/// # Errors
///
/// Every §7 error kind surfaces here; the per-ingress handler maps it to
/// the protocol-native HTTP error.
pub(crate) async fn handle_chat<A>(
    adapter: A,
    state: Arc<AppState>,
    body: Bytes,
) -> Result<Response, GatewayError>
where
    A: ChatAdapter + Send + 'static,
    A::StreamState: 'static,
{
    let started = std::time::Instant::now();
    let request_id = state.request_id();

    let token = resolve_token(state.auth.as_ref())?;

    let inbound: A::Request = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::InvalidRequest(format!("Malformed request body: {e}")))?;

    let stream = adapter.wants_stream(&inbound);
    let vision = adapter.detect_vision_request(&inbound);
    let mut payload = adapter.convert_request(&inbound)?;
    if payload.model().is_empty() {
        payload.set_model(&state.models.current().model_id);
    }
    payload.set_stream(stream);
    let model = payload.model().to_string();

    tracing::debug!(
        %request_id,
        ingress = ingress_name(A::INGRESS),
        model,
        stream,
        vision,
        "forwarding chat request"
    );

    let upstream_body = payload.to_body()?;
    let response = state
        .transport
        .send_chat(&token, &state.config.editor, vision, upstream_body)
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = error_excerpt(response).await;
        return Err(GatewayError::Upstream {
            status: status.as_u16(),
            message,
        });
    }

    if !stream {
        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(format!("Failed to read response body: {e}")))?;
        let (prompt_tokens, completion_tokens) = usage_snapshot(&body_bytes);
        let result = adapter.parse_response(&body_bytes)?;
        log_request_complete(
            ingress_name(A::INGRESS),
            &model,
            prompt_tokens,
            completion_tokens,
            started,
        );
        return Ok(ok_json_response(Bytes::from(result.to_string())));
    }

    Ok(stream_ok_response(
        axum::body::Body::from_stream(dispatch_stream(adapter, response.bytes_stream())),
        A::FRAMING,
    ))
}

fn usage_snapshot(body: &[u8]) -> (u64, u64) {
    #[derive(serde::Deserialize)]
    struct UsageOnly {
        #[serde(default)]
        usage: Option<crate::protocol::upstream::UpstreamUsage>,
    }
    serde_json::from_slice::<UsageOnly>(body)
        .ok()
        .and_then(|b| b.usage)
        .map_or((0, 0), |usage| {
            (usage.prompt_tokens, usage.completion_tokens)
        })
}

// ---------------------------------------------------------------------------
// Stream dispatcher
// ---------------------------------------------------------------------------

struct PendingChunks {
    chunks: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingChunks {
    fn new() -> Self {
        Self {
            chunks: SmallVec::new(),
            head: 0,
        }
    }

    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.chunks.len() {
            return None;
        }
        let chunk = std::mem::take(&mut self.chunks[self.head]);
        self.head += 1;
        if self.head == self.chunks.len() {
            self.chunks.clear();
            self.head = 0;
        }
        Some(chunk)
    }

    fn push(&mut self, chunk: Bytes) {
        self.chunks.push(chunk);
    }
}

struct DispatchState<A: ChatAdapter, S> {
    source: Pin<Box<S>>,
    adapter: A,
    parse_state: A::StreamState,
    buffer: String,
    utf8_remainder: Vec<u8>,
    frames: Vec<OutboundFrame>,
    pending: PendingChunks,
    finished: bool,
}

/// Glue between the upstream byte stream and the adapter's chunk parser.
///
/// Yields wire-framed chunks in adapter emission order; at end of stream
/// it runs the adapter's drain pass and appends the protocol terminator.
/// A parse failure or transport error mid-stream emits one final error
/// frame and closes.
fn dispatch_stream<A, S, E>(adapter: A, source: S) -> impl Stream<Item = Result<Bytes, std::convert::Infallible>> + Send
where
    A: ChatAdapter + Send + 'static,
    A::StreamState: 'static,
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut initial = PendingChunks::new();
    if let Some(preamble) = A::FRAMING.preamble() {
        initial.push(Bytes::from_static(preamble.as_bytes()));
    }

    let state = DispatchState {
        source: Box::pin(source),
        adapter,
        parse_state: A::StreamState::default(),
        buffer: String::new(),
        utf8_remainder: Vec::new(),
        frames: Vec::with_capacity(8),
        pending: initial,
        finished: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                return Some((Ok(chunk), st));
            }
            if st.finished {
                return None;
            }

            match st.source.as_mut().next().await {
                Some(Ok(bytes)) => {
                    push_utf8(&mut st.buffer, &mut st.utf8_remainder, &bytes);
                    if let Err(e) = st.adapter.parse_stream_chunk(
                        &mut st.buffer,
                        &mut st.parse_state,
                        &mut st.frames,
                    ) {
                        tracing::warn!("stream translation failed: {e}");
                        fail_stream(&mut st, &e);
                        continue;
                    }
                    flush_frames::<A>(&mut st.frames, &mut st.pending);
                }
                Some(Err(e)) => {
                    let err = GatewayError::Transport(format!("Upstream read failed: {e}"));
                    tracing::warn!("{err}");
                    fail_stream(&mut st, &err);
                }
                None => {
                    st.adapter.finish_stream(&mut st.parse_state, &mut st.frames);
                    flush_frames::<A>(&mut st.frames, &mut st.pending);
                    if let Some(terminator) = A::FRAMING.terminator() {
                        st.pending.push(Bytes::from_static(terminator.as_bytes()));
                    }
                    st.finished = true;
                }
            }
        }
    })
}

fn flush_frames<A: ChatAdapter>(frames: &mut Vec<OutboundFrame>, pending: &mut PendingChunks) {
    for frame in frames.drain(..) {
        pending.push(Bytes::from(A::FRAMING.encode(&frame)));
    }
}

/// Bytes were already written; emit one final error frame and close.
fn fail_stream<A: ChatAdapter>(st: &mut DispatchState<A, impl Sized>, err: &GatewayError) {
    st.frames.clear();
    let payload = stream_error_payload(err, A::INGRESS);
    st.pending
        .push(Bytes::from(A::FRAMING.encode(&OutboundFrame::json(&payload))));
    st.finished = true;
}

/// Append upstream bytes to the parse buffer, holding back any trailing
/// incomplete UTF-8 sequence until its continuation arrives.
fn push_utf8(buffer: &mut String, remainder: &mut Vec<u8>, bytes: &[u8]) {
    if remainder.is_empty() {
        match std::str::from_utf8(bytes) {
            Ok(text) => buffer.push_str(text),
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                // Safety: valid_up_to is a valid UTF-8 boundary.
                buffer.push_str(unsafe { std::str::from_utf8_unchecked(&bytes[..valid_up_to]) });
                remainder.extend_from_slice(&bytes[valid_up_to..]);
            }
        }
        return;
    }

    remainder.extend_from_slice(bytes);
    match std::str::from_utf8(remainder) {
        Ok(text) => {
            buffer.push_str(text);
            remainder.clear();
        }
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            // Safety: valid_up_to is a valid UTF-8 boundary.
            buffer.push_str(unsafe { std::str::from_utf8_unchecked(&remainder[..valid_up_to]) });
            remainder.drain(..valid_up_to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_utf8_handles_split_codepoint() {
        let text = "héllo";
        let bytes = text.as_bytes();
        // Split inside the two-byte 'é'.
        let mut buffer = String::new();
        let mut remainder = Vec::new();
        push_utf8(&mut buffer, &mut remainder, &bytes[..2]);
        assert_eq!(buffer, "h");
        assert_eq!(remainder, vec![bytes[1]]);
        push_utf8(&mut buffer, &mut remainder, &bytes[2..]);
        assert_eq!(buffer, "héllo");
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_usage_snapshot() {
        let body = br#"{"usage":{"prompt_tokens":7,"completion_tokens":3}}"#;
        assert_eq!(usage_snapshot(body), (7, 3));
        assert_eq!(usage_snapshot(b"{}"), (0, 0));
        assert_eq!(usage_snapshot(b"not json"), (0, 0));
    }

    #[test]
    fn test_pending_chunks_fifo() {
        let mut pending = PendingChunks::new();
        pending.push(Bytes::from_static(b"a"));
        pending.push(Bytes::from_static(b"b"));
        assert_eq!(pending.pop_front(), Some(Bytes::from_static(b"a")));
        assert_eq!(pending.pop_front(), Some(Bytes::from_static(b"b")));
        assert_eq!(pending.pop_front(), None);
    }

    #[tokio::test]
    async fn test_dispatch_stream_ollama_end_to_end() {
        use crate::protocol::ollama::OllamaAdapter;

        let upstream = futures_util::stream::iter(vec![
            Ok::<Bytes, std::convert::Infallible>(Bytes::from_static(
                b"data: {\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            )),
            Ok(Bytes::from_static(b"data: [DONE]\n\n")),
        ]);
        let chunks: Vec<Bytes> = dispatch_stream(OllamaAdapter, upstream)
            .map(Result::unwrap)
            .collect()
            .await;

        // Preamble newline, one content frame, one terminal frame.
        assert_eq!(chunks[0], Bytes::from_static(b"\n"));
        let content: serde_json::Value =
            serde_json::from_slice(chunks[1].strip_suffix(b"\n\n").unwrap()).unwrap();
        assert_eq!(content["message"]["content"], "Hi");
        let terminal: serde_json::Value =
            serde_json::from_slice(chunks[2].strip_suffix(b"\n\n").unwrap()).unwrap();
        assert_eq!(terminal["done"], true);
        assert_eq!(chunks.len(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_stream_openai_appends_done() {
        use crate::protocol::openai_chat::OpenAiChatAdapter;

        let upstream = futures_util::stream::iter(vec![Ok::<Bytes, std::convert::Infallible>(
            Bytes::from_static(
                b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"}}]}\n\ndata: [DONE]\n\n",
            ),
        )]);
        let chunks: Vec<Bytes> = dispatch_stream(OpenAiChatAdapter, upstream)
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with(b"data: {"));
        assert_eq!(chunks[1], Bytes::from_static(b"data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_dispatch_stream_parse_error_emits_error_frame() {
        use crate::protocol::anthropic::AnthropicAdapter;

        let upstream = futures_util::stream::iter(vec![Ok::<Bytes, std::convert::Infallible>(
            Bytes::from_static(b"data: {corrupt\n\n"),
        )]);
        let chunks: Vec<Bytes> = dispatch_stream(AnthropicAdapter, upstream)
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        let payload: serde_json::Value =
            serde_json::from_slice(chunks[0].strip_prefix(b"data: ").unwrap()).unwrap();
        assert_eq!(payload["type"], "error");
    }
}
