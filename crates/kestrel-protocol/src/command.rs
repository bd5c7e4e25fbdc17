//! Key encoding for queue operations.
//!
//! Kestrel reads queue commands out of the memcache key: the queue name is
//! followed by `/`-separated options such as `open`, `close`, `abort`,
//! `peek` and `t=<milliseconds>`.

use std::time::Duration;

fn with_timeout(mut key: String, timeout: Option<Duration>) -> String {
    if let Some(timeout) = timeout {
        // Clamped so the suffix never exceeds 20 digits
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        key.push_str(&format!("/t={}", millis));
    }
    key
}

/// Plain fetch, acknowledged by the server as soon as it is returned
pub fn fetch_key(queue: &str, timeout: Option<Duration>) -> String {
    with_timeout(queue.to_string(), timeout)
}

/// Reliable fetch: closes the previous open read and opens a new one
pub fn next_key(queue: &str, timeout: Option<Duration>) -> String {
    let mut key = with_timeout(format!("{}/close", queue), timeout);
    key.push_str("/open");
    key
}

/// Return the head item without removing it
pub fn peek_key(queue: &str, timeout: Option<Duration>) -> String {
    with_timeout(format!("{}/peek", queue), timeout)
}

/// Release the open read back onto the queue
pub fn abort_key(queue: &str) -> String {
    format!("{}/abort", queue)
}

/// Acknowledge the open read without fetching another item
pub fn finish_key(queue: &str) -> String {
    format!("{}/close", queue)
}

/// Queue name carried by a command key (everything before the first `/`)
pub fn queue_of(key: &str) -> &str {
    key.split('/').next().unwrap_or(key)
}
