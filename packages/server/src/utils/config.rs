use std::env;
use std::net::SocketAddr;

/// Process-level settings, read once at startup after `.env` is loaded.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub cors_origin: String,
    pub snapshot_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            cors_origin: "http://localhost:3000".to_string(),
            snapshot_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let bind_addr = match env::var("SERVER_ADDR") {
            Ok(addr) => addr.parse()?,
            Err(_) => defaults.bind_addr,
        };
        Ok(Self {
            bind_addr,
            cors_origin: env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            snapshot_dir: env::var("SNAPSHOT_DIR").ok().filter(|d| !d.is_empty()),
        })
    }
}
