use {
    agentfield_protocol::{HANDSHAKE_TIMEOUT_MS, methods, roles, scopes},
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

use crate::{Error, Result};

/// Top-level configuration for the gateway session client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayClientConfig {
    /// Gateway WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Default per-call deadline for `rpc()`.
    pub request_timeout_ms: u64,
    /// How long to wait for the hello-ok after sending `connect`.
    pub handshake_timeout_ms: u64,
    /// Queue calls issued while not connected instead of failing them.
    pub queue_while_disconnected: bool,
    pub reconnect: ReconnectConfig,
    pub client: ClientIdentityConfig,
    /// Capabilities requested during the handshake.
    pub caps: Vec<String>,
    /// `"operator"` or `"node"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub scopes: Vec<String>,
    /// Payload fields that identify an event stream for sequence tracking.
    /// Empty means one connection-wide stream.
    pub stream_key_fields: Vec<String>,
    /// Method used for targeted resync after a sequence gap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resync_method: Option<String>,
    /// Treat gateway silence beyond two tick intervals as a dropped link.
    pub tick_watchdog: bool,
    /// Default tenant used by the console when none is given on the CLI.
    pub tenant: TenantConfig,
    #[serde(skip_serializing)]
    pub auth: AuthConfig,
}

impl Default for GatewayClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:18789/ws".into(),
            request_timeout_ms: 30_000,
            handshake_timeout_ms: HANDSHAKE_TIMEOUT_MS,
            queue_while_disconnected: true,
            reconnect: ReconnectConfig::default(),
            client: ClientIdentityConfig::default(),
            caps: Vec::new(),
            role: Some(roles::OPERATOR.into()),
            scopes: vec![scopes::READ.into(), scopes::WRITE.into()],
            stream_key_fields: vec!["sessionKey".into(), "runId".into()],
            resync_method: Some(methods::SNAPSHOT_GET.into()),
            tick_watchdog: true,
            tenant: TenantConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl GatewayClientConfig {
    /// Check invariants the client relies on.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| Error::invalid(format!("url `{}`: {e}", self.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::invalid(format!(
                "url scheme must be ws or wss, got `{}`",
                url.scheme()
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::invalid("request_timeout_ms must be positive"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(Error::invalid("handshake_timeout_ms must be positive"));
        }
        if let Some(role) = &self.role
            && role != roles::OPERATOR
            && role != roles::NODE
        {
            return Err(Error::invalid(format!("unknown role `{role}`")));
        }
        self.reconnect.validate()
    }
}

/// Exponential backoff with jitter for automatic reconnects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay randomized in either direction (0.0–1.0).
    pub jitter: f64,
    /// `None` retries forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::invalid("reconnect.jitter must be within 0.0..=1.0"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::invalid("reconnect.multiplier must be >= 1.0"));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(Error::invalid(
                "reconnect.initial_delay_ms must not exceed max_delay_ms",
            ));
        }
        Ok(())
    }
}

/// Identity advertised in the handshake `client` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientIdentityConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub version: String,
    pub platform: String,
    pub mode: String,
}

impl Default for ClientIdentityConfig {
    fn default() -> Self {
        Self {
            id: "agentfield-console".into(),
            display_name: None,
            version: env!("CARGO_PKG_VERSION").into(),
            platform: std::env::consts::OS.into(),
            mode: "operator".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token: Option<Secret<String>>,
    pub password: Option<Secret<String>>,
}
