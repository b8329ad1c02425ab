use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Base URL of the document content service. Tree changes are not
    /// forwarded anywhere when unset.
    pub content_sync_url: Option<String>,
    pub notification_timeout_secs: u64,
    /// How long an upload may stay unconfirmed before its blob is reclaimed.
    pub pending_file_grace_secs: u64,
    pub deleted_project_retention_days: u64,
    /// Interval of the background garbage collector; zero disables it.
    pub gc_interval_secs: u64,
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("treestore.db")
    }

    #[must_use]
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }

    #[must_use]
    pub fn pending_file_grace(&self) -> Duration {
        Duration::from_secs(self.pending_file_grace_secs)
    }

    #[must_use]
    pub fn gc_interval(&self) -> Option<Duration> {
        (self.gc_interval_secs > 0).then(|| Duration::from_secs(self.gc_interval_secs))
    }

    #[must_use]
    pub fn deleted_project_retention(&self) -> Duration {
        Duration::from_secs(self.deleted_project_retention_days * 24 * 60 * 60)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            content_sync_url: None,
            notification_timeout_secs: 10,
            pending_file_grace_secs: 60 * 60,
            deleted_project_retention_days: 90,
            gc_interval_secs: 60 * 60,
        }
    }
}
