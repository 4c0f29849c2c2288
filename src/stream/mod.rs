//! Outbound frame model and per-protocol wire framing.

pub mod sse;

/// One adapter-native event, serialized and ready to frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundFrame {
    pub data: String,
}

impl OutboundFrame {
    #[must_use]
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            data: value.to_string(),
        }
    }

    #[must_use]
    pub fn raw(data: String) -> Self {
        Self { data }
    }
}

/// How a protocol frames its stream on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFraming {
    /// JSON frames separated by a blank line (Ollama).
    Ndjson,
    /// `data: <json>\n\n` frames, no terminator sentinel.
    Sse,
    /// `data: <json>\n\n` frames closed by `data: [DONE]\n\n`.
    SseWithDone,
}

impl StreamFraming {
    /// Bytes written before the first frame.
    #[must_use]
    pub fn preamble(self) -> Option<&'static str> {
        match self {
            StreamFraming::Ndjson => Some("\n"),
            StreamFraming::Sse | StreamFraming::SseWithDone => None,
        }
    }

    /// Encode one frame for the wire.
    #[must_use]
    pub fn encode(self, frame: &OutboundFrame) -> String {
        match self {
            StreamFraming::Ndjson => {
                let mut out = String::with_capacity(frame.data.len() + 2);
                out.push_str(&frame.data);
                out.push_str("\n\n");
                out
            }
            StreamFraming::Sse | StreamFraming::SseWithDone => {
                let mut out = String::with_capacity(10 + frame.data.len());
                out.push_str("data: ");
                out.push_str(&frame.data);
                out.push_str("\n\n");
                out
            }
        }
    }

    /// Sentinel written after the last frame, if the protocol has one.
    #[must_use]
    pub fn terminator(self) -> Option<&'static str> {
        match self {
            StreamFraming::SseWithDone => Some("data: [DONE]\n\n"),
            StreamFraming::Ndjson | StreamFraming::Sse => None,
        }
    }

    /// Content type of the response body.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            StreamFraming::Ndjson => "application/x-ndjson",
            StreamFraming::Sse | StreamFraming::SseWithDone => "text/event-stream",
        }
    }
}
