//! Runtime configuration

use anyhow::{Result, bail, ensure};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Runtime configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    /// Registry limits
    #[serde(default)]
    pub runtime: RegistryConfig,

    /// Per-state dwell times
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Transport selection
    #[serde(default)]
    pub transport: TransportConfig,

    /// Credentials
    #[serde(default)]
    pub security: SecurityConfig,
}

impl RuntimeConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Load configuration from file without an async runtime
    pub fn load_blocking(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate TOML
    pub fn parse(content: &str) -> Result<Self> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot honour
    pub fn validate(&self) -> Result<()> {
        ensure!(self.runtime.max_sessions > 0, "runtime.max_sessions must be at least 1");
        ensure!(
            self.runtime.retained_sessions > 0,
            "runtime.retained_sessions must be at least 1"
        );
        ensure!(self.runtime.event_capacity > 0, "runtime.event_capacity must be at least 1");
        ensure!(self.runtime.outbound_queue > 0, "runtime.outbound_queue must be at least 1");

        let t = &self.timeouts;
        for (name, value) in [
            ("connect_ms", t.connect_ms),
            ("auth_ms", t.auth_ms),
            ("idle_ms", t.idle_ms),
            ("closing_ms", t.closing_ms),
            ("keepalive_ms", t.keepalive_ms),
        ] {
            ensure!(value > 0, "timeouts.{} must be greater than zero", name);
        }
        ensure!(
            t.keepalive_ms < t.idle_ms,
            "timeouts.keepalive_ms ({}) must be shorter than timeouts.idle_ms ({})",
            t.keepalive_ms,
            t.idle_ms
        );

        if self.transport.kind == TransportKind::Websocket
            && self.transport.rendezvous_url.is_none()
        {
            bail!("transport.rendezvous_url is required for the websocket transport");
        }

        if let Some(key) = &self.security.preshared_key {
            hex::decode(key).map_err(|e| anyhow::anyhow!("security.preshared_key: {}", e))?;
        }

        Ok(())
    }
}

/// Session registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Maximum number of non-terminal sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Terminal sessions kept queryable before pruning
    #[serde(default = "default_retained_sessions")]
    pub retained_sessions: usize,

    /// How long cleanup waits for sessions to close (ms)
    #[serde(default = "default_grace_period")]
    pub grace_period_ms: u64,

    /// Buffered state events per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Outbound data-plane frames buffered per session
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

fn default_max_sessions() -> usize {
    16
}

fn default_retained_sessions() -> usize {
    64
}

fn default_grace_period() -> u64 {
    3_000
}

fn default_event_capacity() -> usize {
    64
}

fn default_outbound_queue() -> usize {
    256
}

impl RegistryConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            retained_sessions: default_retained_sessions(),
            grace_period_ms: default_grace_period(),
            event_capacity: default_event_capacity(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

/// Dwell time of each non-terminal state
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// Connecting (ms)
    #[serde(default = "default_connect")]
    pub connect_ms: u64,

    /// Authenticating (ms)
    #[serde(default = "default_auth")]
    pub auth_ms: u64,

    /// Active without inbound traffic (ms)
    #[serde(default = "default_idle")]
    pub idle_ms: u64,

    /// Closing (ms)
    #[serde(default = "default_closing")]
    pub closing_ms: u64,

    /// Interval between keepalive pings while active (ms)
    #[serde(default = "default_keepalive")]
    pub keepalive_ms: u64,
}

fn default_connect() -> u64 {
    15_000
}

fn default_auth() -> u64 {
    10_000
}

fn default_idle() -> u64 {
    45_000
}

fn default_closing() -> u64 {
    2_000
}

fn default_keepalive() -> u64 {
    15_000
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn auth(&self) -> Duration {
        Duration::from_millis(self.auth_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn closing(&self) -> Duration {
        Duration::from_millis(self.closing_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect(),
            auth_ms: default_auth(),
            idle_ms: default_idle(),
            closing_ms: default_closing(),
            keepalive_ms: default_keepalive(),
        }
    }
}

/// Which transport the runtime dials peers with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Websocket,
}

/// Transport configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,

    /// Rendezvous base URL (websocket)
    #[serde(default)]
    pub rendezvous_url: Option<String>,

    /// Bearer token for the rendezvous service
    #[serde(default)]
    pub token: Option<String>,

    /// Static peer directory: peer id -> "host:port" (tcp)
    #[serde(default)]
    pub peers: HashMap<String, String>,
}

/// Security configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Identifier presented to peers
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Pre-shared key (hex)
    #[serde(default)]
    pub preshared_key: Option<String>,
}

fn default_client_id() -> String {
    "remdesk-client".to_string()
}

impl SecurityConfig {
    /// Decoded pre-shared key; empty when none is configured
    pub fn key_bytes(&self) -> Result<Vec<u8>> {
        match &self.preshared_key {
            Some(key) => Ok(hex::decode(key)?),
            None => Ok(Vec::new()),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            preshared_key: None,
        }
    }
}
