//! SSE frame splitter for the upstream byte stream.
//!
//! Incoming bytes accumulate in a string buffer owned by the stream
//! dispatcher. Frames are separated by a blank line; the incomplete tail
//! stays buffered until the next chunk arrives. Only `data: ` lines are
//! significant; a payload of `[DONE]` terminates the stream.

use memchr::memmem;
use std::sync::LazyLock;

static FRAME_TERMINATOR: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(b"\n\n"));

/// One complete `data:` payload extracted from the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataPayload {
    /// A JSON-encoded upstream frame (not yet parsed).
    Json(String),
    /// The `[DONE]` stream terminator.
    Done,
}

/// Drain complete frames out of `buffer`, leaving the incomplete tail.
///
/// Each complete frame is processed line by line; empty frames (leading
/// blank lines) are skipped silently.
pub fn drain_data_payloads(buffer: &mut String, out: &mut Vec<DataPayload>) {
    let mut consumed = 0;
    loop {
        let Some(rel) = FRAME_TERMINATOR.find(&buffer.as_bytes()[consumed..]) else {
            break;
        };
        let frame_end = consumed + rel;
        collect_frame_payloads(&buffer[consumed..frame_end], out);
        consumed = frame_end + 2;
    }
    if consumed > 0 {
        buffer.drain(..consumed);
    }
}

fn collect_frame_payloads(frame: &str, out: &mut Vec<DataPayload>) {
    for line in frame.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some(payload) = line.strip_prefix("data: ") else {
            continue;
        };
        if payload.trim() == "[DONE]" {
            out.push(DataPayload::Done);
        } else {
            out.push(DataPayload::Json(payload.to_string()));
        }
    }
}
