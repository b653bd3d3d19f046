//! Listener and CORS settings, read from the `server` section of the
//! config file.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8088;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Browser origins allowed to call the read endpoints; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl HttpServerConfig {
    /// Listening address; fails on a host that is not an IP literal
    pub fn bind_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| format!("server.host {:?} is not an IP address", self.host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_section_uses_loopback() {
        let config: HttpServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, HttpServerConfig::default());
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8088");
    }

    #[test]
    fn test_hostname_is_rejected() {
        let config = HttpServerConfig {
            host: "localhost".into(),
            ..Default::default()
        };
        assert!(config.bind_addr().unwrap_err().contains("localhost"));
    }
}
