use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const HEX: &[u8; 16] = b"0123456789abcdef";

static CALL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static MESSAGE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static FUNCTION_CALL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static RESPONSE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Next tool call id: `call_` + 16 hex digits.
#[inline]
pub(crate) fn next_call_id() -> String {
    next_generated_id("call_", &CALL_ID_COUNTER)
}

/// Next Anthropic-style message id: `msg_` + 16 hex digits.
#[inline]
pub(crate) fn next_message_id() -> String {
    next_generated_id("msg_", &MESSAGE_ID_COUNTER)
}

/// Next Responses function-call item id: `fc_` + 16 hex digits.
#[inline]
pub(crate) fn next_function_call_id() -> String {
    next_generated_id("fc_", &FUNCTION_CALL_ID_COUNTER)
}

/// Next Responses envelope id: `resp_` + 16 hex digits.
#[inline]
pub(crate) fn next_response_id() -> String {
    next_generated_id("resp_", &RESPONSE_ID_COUNTER)
}

pub(crate) fn next_generated_id(prefix: &str, counter: &AtomicU64) -> String {
    let id = counter.fetch_add(1, Ordering::Relaxed);
    let mut out = String::with_capacity(prefix.len() + 16);
    out.push_str(prefix);
    push_u64_hex_16(&mut out, id);
    out
}

#[inline]
fn push_u64_hex_16(out: &mut String, mut value: u64) {
    let mut buf = [b'0'; 16];
    let mut idx = 16;
    while idx > 0 {
        idx -= 1;
        let nibble = usize::try_from(value & 0x0f).unwrap_or(0);
        buf[idx] = HEX[nibble];
        value >>= 4;
    }
    for byte in buf {
        out.push(char::from(byte));
    }
}

/// Render an upstream `created` epoch-seconds value as an RFC-3339 timestamp.
///
/// Falls back to the current time when `created` is absent or out of range.
pub(crate) fn rfc3339_from_epoch_secs(created: Option<u64>) -> String {
    let timestamp = created
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(chrono::Utc::now);
    timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::{next_call_id, next_generated_id, rfc3339_from_epoch_secs};
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_generated_id_is_prefixed_fixed_width_hex() {
        static COUNTER: AtomicU64 = AtomicU64::new(0x1234_abcd);
        assert_eq!(next_generated_id("msg_", &COUNTER), "msg_000000001234abcd");
    }

    #[test]
    fn test_call_ids_are_unique_and_prefixed() {
        let first = next_call_id();
        let second = next_call_id();
        assert!(first.starts_with("call_"));
        assert!(second.starts_with("call_"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_rfc3339_from_epoch_secs() {
        let rendered = rfc3339_from_epoch_secs(Some(1_700_000_000));
        assert!(rendered.starts_with("2023-11-14T"));
        assert!(rendered.ends_with('Z'));
    }

    #[test]
    fn test_rfc3339_from_epoch_secs_fallback() {
        // Absent timestamps fall back to "now", which is after 2024.
        let rendered = rfc3339_from_epoch_secs(None);
        assert!(rendered.as_str() >= "2024");
    }
}
