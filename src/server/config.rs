//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};

use serde::Deserialize;

/// HTTP server configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Path prefix channels are mounted under ("/" or "/frames")
    pub base_path: String,

    /// Channel served when the channel segment is empty
    pub default_channel: String,

    /// Path of the JSON status endpoint
    pub status_path: String,

    /// Largest accepted publish body in bytes
    pub max_body_size: usize,

    /// Value of `Access-Control-Allow-Origin`
    pub allow_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8800)),
            base_path: "/".to_string(),
            default_channel: "channel0".to_string(),
            status_path: "/_status".to_string(),
            max_body_size: 8 * 1024 * 1024, // 8MB
            allow_origin: "*".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the path prefix, normalized to a leading slash and no trailing one
    pub fn base_path(mut self, path: &str) -> Self {
        let trimmed = path.trim_matches('/');
        self.base_path = format!("/{}", trimmed);
        self
    }

    /// Set the default channel
    pub fn default_channel(mut self, name: impl Into<String>) -> Self {
        self.default_channel = name.into();
        self
    }

    /// Set the status endpoint path
    pub fn status_path(mut self, path: impl Into<String>) -> Self {
        self.status_path = path.into();
        self
    }

    /// Set the maximum publish body size
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Set the CORS origin header value
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow_origin = origin.into();
        self
    }

    /// Base path without its trailing slash; empty when mounted at the root
    pub(crate) fn mount_prefix(&self) -> &str {
        self.base_path.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8800);
        assert_eq!(config.base_path, "/");
        assert_eq!(config.default_channel, "channel0");
        assert_eq!(config.status_path, "/_status");
        assert_eq!(config.max_body_size, 8 * 1024 * 1024);
        assert_eq!(config.allow_origin, "*");
        assert_eq!(config.mount_prefix(), "");
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:8801".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 8801);
    }

    #[test]
    fn test_builder_base_path_normalized() {
        assert_eq!(ServerConfig::default().base_path("frames/").base_path, "/frames");
        assert_eq!(ServerConfig::default().base_path("/a/b").base_path, "/a/b");
        assert_eq!(ServerConfig::default().base_path("/").base_path, "/");
        assert_eq!(ServerConfig::default().base_path("/frames").mount_prefix(), "/frames");
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .default_channel("lobby")
            .status_path("/status")
            .max_body_size(1024)
            .allow_origin("https://example.com");

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.default_channel, "lobby");
        assert_eq!(config.status_path, "/status");
        assert_eq!(config.max_body_size, 1024);
        assert_eq!(config.allow_origin, "https://example.com");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"bind_addr": "127.0.0.1:8080", "base_path": "/frames"}"#)
                .unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.base_path, "/frames");
        assert_eq!(config.default_channel, "channel0");
    }
}
