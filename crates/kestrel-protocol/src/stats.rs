//! Parsers for the two statistics formats a Kestrel server emits.
//!
//! `STATS` produces memcache-style lines:
//!
//! ```text
//! STAT uptime 3012
//! STAT queue_jobs_items 4
//! ```
//!
//! `DUMP_STATS` produces one block per queue:
//!
//! ```text
//! queue 'jobs' {
//!   items=4
//!   bytes=96
//! }
//! ```
//!
//! Both parsers skip fragments they cannot understand instead of failing.

use crate::{ProtocolError, Result};
use kestrel_core::{QueueStats, StatValue, StatsSnapshot};
use std::collections::BTreeMap;
use tracing::debug;

const QUEUE_STAT_PREFIX: &str = "queue_";

/// Split one flat stats line into name and raw value
pub fn parse_stat_line(line: &str) -> Result<(&str, &str)> {
    let line = line.trim();
    let line = line.strip_prefix("STAT ").unwrap_or(line);

    match line.split_once(char::is_whitespace) {
        Some((name, value)) if !value.trim().is_empty() => Ok((name, value.trim())),
        _ => Err(ProtocolError::Parse(format!("stat line without value: {:?}", line))),
    }
}

/// Server-level counters from `STATS` output; `queue_*` entries are left out.
pub fn parse_flat(text: &str) -> BTreeMap<String, StatValue> {
    let mut stats = BTreeMap::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "END" {
            continue;
        }

        match parse_stat_line(trimmed) {
            Ok((name, _)) if name.starts_with(QUEUE_STAT_PREFIX) => {}
            Ok((name, value)) => {
                stats.insert(name.to_string(), StatValue::parse(value));
            }
            Err(e) => debug!("Skipping stats fragment: {}", e),
        }
    }

    stats
}

fn parse_queue_block(body: &str) -> QueueStats {
    let mut counters = QueueStats::new();

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((key, value)) = line.split_once('=') else {
            debug!("Skipping dump line without '=': {:?}", line);
            continue;
        };

        match value.trim().parse::<i64>() {
            Ok(value) => {
                counters.insert(key.trim().to_string(), value);
            }
            Err(e) => debug!("Skipping non-integer counter {:?}: {}", line, e),
        }
    }

    counters
}

/// Per-queue counters from `DUMP_STATS` output
pub fn parse_dump(text: &str) -> BTreeMap<String, QueueStats> {
    let mut queues = BTreeMap::new();
    let mut rest = text;

    while let Some(start) = rest.find("queue '") {
        rest = &rest[start + "queue '".len()..];

        let Some(name_end) = rest.find('\'') else {
            debug!("Unterminated queue name in dump stats");
            break;
        };
        let name = &rest[..name_end];
        let after_name = rest[name_end + 1..].trim_start();

        let Some(block) = after_name.strip_prefix('{') else {
            debug!("Queue {:?} is not followed by a block", name);
            rest = &rest[name_end + 1..];
            continue;
        };
        let Some(block_end) = block.find('}') else {
            debug!("Unterminated block for queue {:?}", name);
            break;
        };

        queues.insert(name.to_string(), parse_queue_block(&block[..block_end]));
        rest = &block[block_end + 1..];
    }

    queues
}

/// Combine flat and dump output into one snapshot
pub fn parse_snapshot(flat: &str, dump: &str) -> StatsSnapshot {
    StatsSnapshot {
        server: parse_flat(flat),
        queues: parse_dump(dump),
    }
}
