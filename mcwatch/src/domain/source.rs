//! Where the monitor gets its server list from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;

use super::server::ServerConfig;
use crate::Result;

/// A read-only snapshot of the configured servers, fetched once per cycle.
#[async_trait]
pub trait ServerSource: Send + Sync {
    async fn load_servers(&self) -> Result<Vec<ServerConfig>>;
}

/// An in-memory server list that can be swapped at runtime.
#[derive(Debug, Default)]
pub struct StaticServerSource {
    servers: RwLock<Vec<ServerConfig>>,
}

impl StaticServerSource {
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        Self {
            servers: RwLock::new(servers),
        }
    }

    pub fn replace(&self, servers: Vec<ServerConfig>) {
        *self.servers.write() = servers;
    }
}

#[async_trait]
impl ServerSource for StaticServerSource {
    async fn load_servers(&self) -> Result<Vec<ServerConfig>> {
        Ok(self.servers.read().clone())
    }
}

/// Reads servers from a JSON file on every load, so edits apply on the next cycle.
///
/// The file holds either a bare array of servers or `{"servers": [...]}`.
#[derive(Debug, Clone)]
pub struct JsonServerSource {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServersFile {
    List(Vec<ServerConfig>),
    Wrapped { servers: Vec<ServerConfig> },
}

impl JsonServerSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ServerSource for JsonServerSource {
    async fn load_servers(&self) -> Result<Vec<ServerConfig>> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let servers = match serde_json::from_str(&raw)? {
            ServersFile::List(servers) => servers,
            ServersFile::Wrapped { servers } => servers,
        };
        Ok(servers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_source_reads_both_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        let source = JsonServerSource::new(&path);

        tokio::fs::write(&path, r#"[{"id": 1, "name": "A", "host": "a"}]"#)
            .await
            .unwrap();
        let servers = source.load_servers().await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "A");

        tokio::fs::write(
            &path,
            r#"{"servers": [{"id": 2, "name": "B", "host": "b", "port": 25570, "enabled": false}]}"#,
        )
        .await
        .unwrap();
        let servers = source.load_servers().await.unwrap();
        assert_eq!(servers[0].port, 25570);
        assert!(!servers[0].enabled);
    }

    #[tokio::test]
    async fn test_json_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        let source = JsonServerSource::new(&path);
        assert!(matches!(
            source.load_servers().await,
            Err(crate::Error::Io(_))
        ));

        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(
            source.load_servers().await,
            Err(crate::Error::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_static_source_replace() {
        let source = StaticServerSource::default();
        assert!(source.load_servers().await.unwrap().is_empty());
        source.replace(vec![ServerConfig {
            id: 9,
            name: "N".into(),
            host: "h".into(),
            port: 1,
            enabled: true,
            bindings: vec![],
        }]);
        assert_eq!(source.load_servers().await.unwrap()[0].id, 9);
    }
}
