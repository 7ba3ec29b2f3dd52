//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (first of `linkpulse.toml`,
//!   `/etc/linkpulse/linkpulse.toml`, `~/.config/linkpulse/linkpulse.toml`)
//! - Environment variables (`LINKPULSE__PORT`, `LINKPULSE__HUB__PING_INTERVAL_MS`, ...)

use anyhow::{bail, Context, Result};
use linkpulse_core::HubConfig;
use linkpulse_transport::WebSocketConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

const CONFIG_PATHS: [&str; 3] = [
    "linkpulse.toml",
    "/etc/linkpulse/linkpulse.toml",
    "~/.config/linkpulse/linkpulse.toml",
];

const ENV_PREFIX: &str = "LINKPULSE";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Hub tuning.
    #[serde(default)]
    pub hub: HubSettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Hub queue depths and timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Broadcast queue depth. Updates beyond it are dropped.
    #[serde(default = "default_capacity")]
    pub broadcast_capacity: usize,

    /// Register/subscribe queue depth.
    #[serde(default = "default_capacity")]
    pub control_capacity: usize,

    /// Per-connection outbound queue depth.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// Write timeout in milliseconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Read deadline in milliseconds.
    #[serde(default = "default_pong_wait")]
    pub pong_wait_ms: u64,

    /// Keepalive period in milliseconds. Must be shorter than `pong_wait_ms`.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,

    /// Refresher period in milliseconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    /// Window, in days, of every analytics snapshot.
    #[serde(default = "default_window_days")]
    pub snapshot_window_days: u32,

    /// Topics one connection may subscribe to at once.
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_connection: usize,

    /// Topics with subscribers tracked at once.
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws/analytics".to_string()
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_capacity() -> usize {
    256
}

fn default_outbound_capacity() -> usize {
    64
}

fn default_write_timeout() -> u64 {
    1_000
}

fn default_pong_wait() -> u64 {
    60_000
}

fn default_ping_interval() -> u64 {
    54_000
}

fn default_refresh_interval() -> u64 {
    30_000
}

fn default_window_days() -> u32 {
    7
}

fn default_max_subscriptions() -> usize {
    100
}

fn default_max_topics() -> usize {
    10_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            hub: HubSettings::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_capacity(),
            control_capacity: default_capacity(),
            outbound_capacity: default_outbound_capacity(),
            write_timeout_ms: default_write_timeout(),
            pong_wait_ms: default_pong_wait(),
            ping_interval_ms: default_ping_interval(),
            refresh_interval_ms: default_refresh_interval(),
            snapshot_window_days: default_window_days(),
            max_subscriptions_per_connection: default_max_subscriptions(),
            max_topics: default_max_topics(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, with
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load() -> Result<Self> {
        let file = CONFIG_PATHS
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists());

        Self::build(file.as_deref())
    }

    /// Load configuration from a specific file, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the result
    /// is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = shellexpand::tilde(&path.as_ref().to_string_lossy()).into_owned();
        if !Path::new(&path).exists() {
            bail!("Config file not found: {}", path);
        }
        Self::build(Some(&path))
    }

    fn build(file: Option<&str>) -> Result<Self> {
        use config::{Environment, File, FileFormat};

        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .with_context(|| match file {
                Some(path) => format!("Failed to load config file: {}", path),
                None => "Failed to load config from environment".to_string(),
            })?;

        config.validate()?;
        if let Some(path) = file {
            tracing::info!("Configuration loaded from: {}", path);
        }
        Ok(config)
    }

    /// Reject settings the hub cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let hub = &self.hub;
        if hub.ping_interval_ms >= hub.pong_wait_ms {
            bail!(
                "hub.ping_interval_ms ({}) must be shorter than hub.pong_wait_ms ({})",
                hub.ping_interval_ms,
                hub.pong_wait_ms
            );
        }
        for (name, value) in [
            ("hub.broadcast_capacity", hub.broadcast_capacity),
            ("hub.control_capacity", hub.control_capacity),
            ("hub.outbound_capacity", hub.outbound_capacity),
            (
                "hub.max_subscriptions_per_connection",
                hub.max_subscriptions_per_connection,
            ),
            ("hub.max_topics", hub.max_topics),
            ("transport.max_message_size", self.transport.max_message_size),
        ] {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }
        if hub.ping_interval_ms == 0 || hub.refresh_interval_ms == 0 || hub.write_timeout_ms == 0 {
            bail!("hub timers must be greater than zero");
        }
        if self.transport.max_message_size > linkpulse_protocol::codec::MAX_MESSAGE_SIZE {
            bail!(
                "transport.max_message_size may not exceed {} bytes",
                linkpulse_protocol::codec::MAX_MESSAGE_SIZE
            );
        }
        if !self.transport.websocket_path.starts_with('/') {
            bail!("transport.websocket_path must start with '/'");
        }
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Hub settings in the form the hub takes them.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            broadcast_capacity: self.hub.broadcast_capacity,
            control_capacity: self.hub.control_capacity,
            ping_interval: Duration::from_millis(self.hub.ping_interval_ms),
            refresh_interval: Duration::from_millis(self.hub.refresh_interval_ms),
            snapshot_window_days: self.hub.snapshot_window_days,
            max_subscriptions_per_connection: self.hub.max_subscriptions_per_connection,
            max_topics: self.hub.max_topics,
            ..HubConfig::default()
        }
    }

    /// Per-connection WebSocket settings.
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            read_timeout: Duration::from_millis(self.hub.pong_wait_ms),
            write_timeout: self.write_timeout(),
            max_message_size: self.transport.max_message_size,
        }
    }

    /// Bound on every write to a connection.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.hub.write_timeout_ms)
    }
}
