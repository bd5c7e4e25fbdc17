use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Server-level counter: numeric when the server reports a number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(i64),
    Text(String),
}

impl StatValue {
    /// Coerce a raw value to an integer when possible, else keep the text
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(value) => StatValue::Int(value),
            Err(_) => StatValue::Text(raw.to_string()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StatValue::Int(value) => Some(*value),
            StatValue::Text(_) => None,
        }
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Int(value) => write!(f, "{}", value),
            StatValue::Text(value) => f.write_str(value),
        }
    }
}

/// Counters for one queue, as reported by `DUMP_STATS`
pub type QueueStats = BTreeMap<String, i64>;

/// Structured view of server and per-queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Server-wide counters (never includes `queue_*` entries)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub server: BTreeMap<String, StatValue>,
    /// Per-queue counters keyed by queue name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub queues: BTreeMap<String, QueueStats>,
}

impl StatsSnapshot {
    /// True when no server contributed anything; serializes as `{}`
    pub fn is_empty(&self) -> bool {
        self.server.is_empty() && self.queues.is_empty()
    }

    pub fn server_stat(&self, name: &str) -> Option<&StatValue> {
        self.server.get(name)
    }

    pub fn queue(&self, name: &str) -> Option<&QueueStats> {
        self.queues.get(name)
    }

    /// Fold another snapshot in; entries from `other` win on conflicts.
    pub fn merge(&mut self, other: StatsSnapshot) {
        self.server.extend(other.server);
        for (name, counters) in other.queues {
            self.queues.entry(name).or_default().extend(counters);
        }
    }
}
