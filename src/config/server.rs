use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_MEDIA_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/svg+xml",
    "video/3gpp",
    "video/mp4",
    "audio/mpeg",
    "audio/x-wav",
    "audio/x-m4a",
    "text/csv",
    "application/xml",
    "application/zip",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Public base URL for external access (e.g., "https://forms.example.com").
    /// Used when building absolute links. If not set, links are derived from the Host header.
    pub public_base_url: Option<String>,
    /// Enketo preview endpoint that preview redirects point at.
    pub enketo_preview_url: String,
    /// Content types accepted for form media uploads.
    pub supported_media_upload_types: Vec<String>,
    pub max_upload_bytes: usize,
    /// Origins allowed on the data API. A single "*" allows any origin.
    pub cors_allowed_origins: Vec<String>,
    /// Peer addresses whose `X-Forwarded-For` / `X-Real-IP` headers are trusted.
    pub trusted_proxies: Vec<IpAddr>,
}

impl ServerConfig {
    /// Loads a TOML file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("formdesk.db")
    }

    #[must_use]
    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    /// Comma-joined `accept` list: ".ext,mime" for every supported type.
    #[must_use]
    pub fn media_upload_accept(&self) -> String {
        let mut parts = Vec::with_capacity(self.supported_media_upload_types.len() * 2);
        for mime in &self.supported_media_upload_types {
            let ext = mime.rsplit('/').next().unwrap_or(mime);
            parts.push(format!(".{ext}"));
            parts.push(mime.clone());
        }
        parts.join(",")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
            enketo_preview_url: "https://enketo.example.org/preview".to_string(),
            supported_media_upload_types: DEFAULT_MEDIA_TYPES.iter().map(|s| s.to_string()).collect(),
            max_upload_bytes: 25 * 1024 * 1024,
            cors_allowed_origins: vec!["*".to_string()],
            trusted_proxies: Vec::new(),
        }
    }
}
