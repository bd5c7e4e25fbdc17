use crate::{ClientError, Result};
use kestrel_core::{Endpoint, DEFAULT_SERVER};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of every Kestrel server, in routing order
    pub servers: Vec<String>,
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            servers: vec![DEFAULT_SERVER.to_string()],
            connect_timeout_ms: 3000,
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClientError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| ClientError::ConfigError(e.to_string()))
    }

    /// Replace the server list, keeping the other settings
    pub fn with_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.servers = servers.into_iter().map(Into::into).collect();
        self
    }

    /// Parsed endpoints; fails on the first malformed entry
    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.servers
            .iter()
            .map(|server| server.trim().parse::<Endpoint>().map_err(ClientError::from))
            .collect()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_points_at_local_server() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoints().unwrap(), vec![Endpoint::default()]);
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "servers:\n  - 10.0.0.1:22133\n  - kestrel-2\nconnect_timeout_ms: 500").unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.endpoints().unwrap(),
            vec![
                Endpoint::new("10.0.0.1", 22133),
                Endpoint::new("kestrel-2", 22133)
            ]
        );
        assert_eq!(config.connect_timeout_ms, 500);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = ClientConfig::from_yaml("connect_timeout_ms: 100").unwrap();
        assert_eq!(config.servers, vec![DEFAULT_SERVER.to_string()]);
    }

    #[test]
    fn test_bad_endpoint_is_config_error() {
        let config = ClientConfig::default().with_servers(["localhost:notaport"]);
        assert!(matches!(config.endpoints(), Err(ClientError::ConfigError(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClientConfig::from_file(dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ClientError::ConfigError(_))));
    }
}
