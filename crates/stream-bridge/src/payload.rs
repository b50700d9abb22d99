//! Publish wire format, DLQ envelope, and acknowledgment parsing.
//!
//! The publish payload is a canonical JSON splice:
//!
//! ```text
//! {"message":{"payload":<original bytes>},"redis":{"payload":{"id":"<id>"}}}
//! ```
//!
//! The original bytes pass through verbatim. The single exception is a
//! top-level `struct_data` key whose value is a JSON-encoded string: it is
//! replaced in place by its embedded value.

use crate::message::{Ack, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Builds the publish payload into `scratch`, then copies it out to an
/// exactly-sized buffer for the transport.
pub fn build_publish_payload(msg: &Message, scratch: &mut Vec<u8>) -> Vec<u8> {
    scratch.clear();
    scratch.extend_from_slice(b"{\"message\":{\"payload\":");
    match rewrite_struct_data(&msg.payload) {
        Some(rewritten) => scratch.extend_from_slice(&rewritten),
        None => scratch.extend_from_slice(&msg.payload),
    }
    scratch.extend_from_slice(b"},\"redis\":{\"payload\":{\"id\":");
    match serde_json::to_vec(&msg.id) {
        Ok(quoted) => scratch.extend_from_slice(&quoted),
        Err(_) => scratch.extend_from_slice(b"\"\""),
    }
    scratch.extend_from_slice(b"}}}");
    scratch.as_slice().to_vec()
}

/// Returns a re-serialized payload with `struct_data` expanded, or `None`
/// when the rewrite does not apply and the bytes should pass verbatim.
fn rewrite_struct_data(payload: &[u8]) -> Option<Vec<u8>> {
    let mut value: Value = serde_json::from_slice(payload).ok()?;
    let obj = value.as_object_mut()?;
    let embedded = match obj.get("struct_data") {
        Some(Value::String(s)) => serde_json::from_str::<Value>(s).ok()?,
        _ => return None,
    };
    obj.insert("struct_data".to_string(), embedded);
    serde_json::to_vec(&value).ok()
}

/// Envelope published to the dead-letter topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEnvelope {
    pub original_message: String,
    pub error: String,
    /// RFC3339 UTC.
    pub timestamp: String,
    pub message_id: String,
    pub attempts: u32,
}

pub fn build_dlq_envelope(msg: &Message, error: &str) -> DlqEnvelope {
    DlqEnvelope {
        original_message: String::from_utf8_lossy(&msg.payload).into_owned(),
        error: error.to_string(),
        timestamp: rfc3339_utc(SystemTime::now()),
        message_id: msg.id.clone(),
        attempts: msg.attempts,
    }
}

/// Parses `{"id":"...","ack":true|false}` from the subscription topic.
pub fn parse_ack(payload: &[u8]) -> Result<Ack, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Formats a `SystemTime` as RFC3339 UTC with second precision.
///
/// Civil-from-days per Howard Hinnant's algorithm; the pack carries no time
/// crate, and second precision is all the DLQ envelope needs.
pub(crate) fn rfc3339_utc(t: SystemTime) -> String {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let days = secs.div_euclid(86_400);
    let rem = secs.rem_euclid(86_400);
    let (hour, min, sec) = (rem / 3600, (rem % 3600) / 60, rem % 60);

    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!(
        "{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}Z"
    )
}
