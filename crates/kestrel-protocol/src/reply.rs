/// Single-line server replies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Stored,
    NotStored,
    Deleted,
    NotFound,
    End,
    Ok,
    Version(String),
    Stat { name: String, value: String },
    Error,
    ClientError(String),
    ServerError(String),
    /// Anything else, e.g. a `DUMP_STATS` body line
    Other(String),
}

impl Reply {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let (word, rest) = match line.split_once(' ') {
            Some((word, rest)) => (word, Some(rest)),
            None => (line, None),
        };

        match (word, rest) {
            ("STORED", None) => Reply::Stored,
            ("NOT_STORED", None) => Reply::NotStored,
            ("DELETED", None) => Reply::Deleted,
            ("NOT_FOUND", None) => Reply::NotFound,
            ("END", None) => Reply::End,
            ("OK", None) => Reply::Ok,
            ("ERROR", None) => Reply::Error,
            ("VERSION", Some(version)) => Reply::Version(version.trim().to_string()),
            ("CLIENT_ERROR", rest) => Reply::ClientError(rest.unwrap_or_default().to_string()),
            ("SERVER_ERROR", rest) => Reply::ServerError(rest.unwrap_or_default().to_string()),
            ("STAT", Some(rest)) => match rest.split_once(' ') {
                Some((name, value)) => Reply::Stat {
                    name: name.to_string(),
                    value: value.trim().to_string(),
                },
                None => Reply::Other(line.to_string()),
            },
            _ => Reply::Other(line.to_string()),
        }
    }

    /// `ERROR`, `CLIENT_ERROR` or `SERVER_ERROR`
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Reply::Error | Reply::ClientError(_) | Reply::ServerError(_)
        )
    }
}
