// src/config.rs

//! Manages gateway configuration: loading from TOML, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Socket options applied to every accepted connection.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SocketConfig {
    #[serde(default = "default_no_delay")]
    pub no_delay: bool,
    /// Kernel receive buffer, and the size of each read.
    #[serde(default = "default_buffer_size")]
    pub recv_buffer_size: usize,
    #[serde(default = "default_buffer_size")]
    pub send_buffer_size: usize,
    /// Upper bound for a single read in milliseconds. `0` disables it.
    #[serde(default)]
    pub recv_timeout_ms: u64,
    /// Upper bound for a single write in milliseconds. `0` disables it.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            no_delay: default_no_delay(),
            recv_buffer_size: default_buffer_size(),
            send_buffer_size: default_buffer_size(),
            recv_timeout_ms: 0,
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl SocketConfig {
    pub fn recv_timeout(&self) -> Option<Duration> {
        (self.recv_timeout_ms > 0).then(|| Duration::from_millis(self.recv_timeout_ms))
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        (self.send_timeout_ms > 0).then(|| Duration::from_millis(self.send_timeout_ms))
    }
}

fn default_no_delay() -> bool {
    true
}
fn default_buffer_size() -> usize {
    8192
}
fn default_send_timeout_ms() -> u64 {
    30_000
}

/// Protocol decoding policy.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProtocolConfig {
    /// Reject frames whose checksum does not match instead of only logging them.
    #[serde(default)]
    pub verify_checksum: bool,
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9388
}

/// An upstream broker endpoint. Parsed and validated, not yet used.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

/// The main configuration struct for the gateway.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Idle timeout, in seconds, a new connection starts with. `0` disables it.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Added to the idle timeout each time it is rearmed by traffic.
    #[serde(default = "default_idle_grace_secs")]
    pub idle_grace_secs: u64,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// How long `stop` waits for connection workers to finish.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub load_balancer_brokers: Vec<BrokerEndpoint>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    38888
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_keep_alive_secs() -> u64 {
    60
}
fn default_idle_grace_secs() -> u64 {
    30
}
fn default_max_clients() -> usize {
    10000
}
fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            keep_alive_secs: default_keep_alive_secs(),
            idle_grace_secs: default_idle_grace_secs(),
            max_clients: default_max_clients(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            socket: SocketConfig::default(),
            protocol: ProtocolConfig::default(),
            metrics: MetricsConfig::default(),
            load_balancer_brokers: Vec::new(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file and validates it.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// The `host:port` the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }

    /// Replaces the listen port and validates the result again.
    pub fn override_port(&mut self, port: u16) -> Result<()> {
        self.port = port;
        self.validate()
            .with_context(|| format!("Port override {port} is not usable"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.socket.recv_buffer_size == 0 || self.socket.send_buffer_size == 0 {
            return Err(anyhow!("socket buffer sizes cannot be 0"));
        }
        if self.metrics.enabled && self.metrics.port == self.port {
            return Err(anyhow!(
                "metrics port {} collides with the gateway port",
                self.metrics.port
            ));
        }
        for broker in &self.load_balancer_brokers {
            if broker.host.trim().is_empty() || broker.port == 0 {
                return Err(anyhow!(
                    "invalid load balancer broker '{}:{}'",
                    broker.host,
                    broker.port
                ));
            }
        }

        if self.keep_alive_secs == 0 {
            warn!("keep_alive_secs is 0: idle connections will never be dropped.");
        }
        Ok(())
    }
}
