use crate::transport::{http, tcp, udp};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub http_addr: String,
    pub tcp_addr: String,
    pub udp_addr: String,
    /// File the store is loaded from at start and saved to at shutdown
    #[serde(default)]
    pub data_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    pub request_channel_capacity: usize,
    pub http_max_body_bytes: usize,
    pub http_timeout_ms: u64,
    pub udp_buffer_size: usize,
    pub tcp_max_frame_bytes: usize,
}

impl LimitsConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                http_addr: "0.0.0.0:8080".to_string(),
                tcp_addr: "0.0.0.0:8081".to_string(),
                udp_addr: "0.0.0.0:8082".to_string(),
                data_path: None,
            },
            limits: LimitsConfig {
                request_channel_capacity: 1024,
                http_max_body_bytes: http::DEFAULT_MAX_BODY,
                http_timeout_ms: http::DEFAULT_TIMEOUT.as_millis() as u64,
                udp_buffer_size: udp::DEFAULT_BUFFER_SIZE,
                tcp_max_frame_bytes: tcp::DEFAULT_MAX_FRAME,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        Self::load(Some(path))
    }

    /// Defaults, then the file at `path` (required if given), then
    /// `KEYSTORE__SECTION__KEY` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("KEYSTORE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
