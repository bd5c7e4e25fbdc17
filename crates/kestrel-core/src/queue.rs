use crate::{CoreError, Result};

/// Longest key the memcache text protocol accepts
pub const MAX_KEY_LENGTH: usize = 250;

/// `/close/t=<u64>/open` is the longest suffix a queue name ever receives
const MAX_SUFFIX_LENGTH: usize = "/close/t=".len() + 20 + "/open".len();

/// Longest queue name that still fits every command key
pub const MAX_QUEUE_NAME_LENGTH: usize = MAX_KEY_LENGTH - MAX_SUFFIX_LENGTH;

/// Check that a queue name can be carried in a protocol key.
///
/// Names must be non-empty, contain no whitespace or control characters
/// and no `/`, which separates the name from command options.
pub fn validate_queue_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| CoreError::InvalidQueueName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if name.len() > MAX_QUEUE_NAME_LENGTH {
        return Err(invalid(&format!(
            "longer than {} bytes",
            MAX_QUEUE_NAME_LENGTH
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control())
    {
        return Err(invalid(&format!("contains forbidden character {:?}", c)));
    }
    if name.contains('/') {
        return Err(invalid("contains '/'"));
    }

    Ok(())
}

/// Only textual payloads are supported; returns the payload as `&str`.
pub fn validate_payload(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data).map_err(|e| CoreError::InvalidPayload(e.valid_up_to()))
}
