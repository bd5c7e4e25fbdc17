use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Requests understood by a Kestrel server over the memcache text protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `get <key>`
    Get { key: String },

    /// `set <key> <flags> <exptime> <bytes>` followed by the data block
    Set {
        key: String,
        flags: u32,
        expire_secs: u64,
        data: Bytes,
    },

    /// `delete <key>`
    Delete { key: String },

    /// `flush_all`
    FlushAll,

    /// `FLUSH <queue>`
    Flush { queue: String },

    /// `RELOAD`
    Reload,

    /// `SHUTDOWN` (the server closes without replying)
    Shutdown,

    /// `VERSION`
    Version,

    /// `STATS`
    Stats,

    /// `DUMP_STATS`
    DumpStats,
}

impl Request {
    /// Whether the server answers this request at all
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Request::Shutdown)
    }

    /// Serialize the request, including the trailing CRLF
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Request::Set {
                key,
                flags,
                expire_secs,
                data,
            } => {
                let header = format!("set {} {} {} {}\r\n", key, flags, expire_secs, data.len());
                dst.reserve(header.len() + data.len() + 2);
                dst.put_slice(header.as_bytes());
                dst.put_slice(data);
            }
            other => {
                let line = other.to_string();
                dst.reserve(line.len() + 2);
                dst.put_slice(line.as_bytes());
            }
        }
        dst.put_slice(b"\r\n");
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Get { key } => write!(f, "get {}", key),
            Request::Set { key, data, .. } => write!(f, "set {} ({} bytes)", key, data.len()),
            Request::Delete { key } => write!(f, "delete {}", key),
            Request::FlushAll => f.write_str("flush_all"),
            Request::Flush { queue } => write!(f, "FLUSH {}", queue),
            Request::Reload => f.write_str("RELOAD"),
            Request::Shutdown => f.write_str("SHUTDOWN"),
            Request::Version => f.write_str("VERSION"),
            Request::Stats => f.write_str("STATS"),
            Request::DumpStats => f.write_str("DUMP_STATS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(request: &Request) -> String {
        let mut buffer = BytesMut::new();
        request.write_to(&mut buffer);
        String::from_utf8(buffer.to_vec()).unwrap()
    }

    #[test]
    fn test_encode_get() {
        let request = Request::Get {
            key: "jobs/close/open".to_string(),
        };
        assert_eq!(encode(&request), "get jobs/close/open\r\n");
    }

    #[test]
    fn test_encode_set() {
        let request = Request::Set {
            key: "jobs".to_string(),
            flags: 0,
            expire_secs: 60,
            data: Bytes::from_static(b"task-1"),
        };
        assert_eq!(encode(&request), "set jobs 0 60 6\r\ntask-1\r\n");
    }

    #[test]
    fn test_set_counts_bytes_not_chars() {
        let request = Request::Set {
            key: "jobs".to_string(),
            flags: 0,
            expire_secs: 0,
            data: Bytes::from("héllo"),
        };
        assert_eq!(encode(&request), "set jobs 0 0 6\r\nhéllo\r\n");
    }

    #[test]
    fn test_encode_admin_verbs() {
        assert_eq!(encode(&Request::FlushAll), "flush_all\r\n");
        assert_eq!(
            encode(&Request::Flush {
                queue: "jobs".to_string()
            }),
            "FLUSH jobs\r\n"
        );
        assert_eq!(encode(&Request::Reload), "RELOAD\r\n");
        assert_eq!(encode(&Request::Shutdown), "SHUTDOWN\r\n");
        assert_eq!(encode(&Request::Version), "VERSION\r\n");
        assert_eq!(encode(&Request::Stats), "STATS\r\n");
        assert_eq!(encode(&Request::DumpStats), "DUMP_STATS\r\n");
    }

    #[test]
    fn test_shutdown_expects_no_reply() {
        assert!(!Request::Shutdown.expects_reply());
        assert!(Request::Version.expects_reply());
    }
}
