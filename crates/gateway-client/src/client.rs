//! The session client the rest of the console talks to.

use std::{sync::Arc, time::Duration};

use {
    agentfield_config::GatewayClientConfig,
    agentfield_protocol::{EventFrame, Features, Policy, ServerInfo, Snapshot, StateVersion},
    serde::de::DeserializeOwned,
    serde_json::Value,
    tokio::sync::watch,
};

use crate::{
    Error, Result,
    connection::{Connection, ConnectionState, Core},
    context::TenantContext,
    dispatcher::Subscription,
    sequence::SequenceGap,
    transport::{Transport, WsTransport},
};

/// Per-call overrides for [`GatewayClient::rpc`].
#[derive(Debug, Clone, Default)]
pub struct RpcOptions {
    /// Falls back to `request_timeout_ms`.
    pub timeout: Option<Duration>,
    /// Sent as `params.idempotencyKey` so the gateway can deduplicate a
    /// retried call whose first response never arrived.
    pub idempotency_key: Option<String>,
    /// Falls back to `queue_while_disconnected`.
    pub queue_if_disconnected: Option<bool>,
}

impl RpcOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Generate a fresh idempotency key.
    #[must_use]
    pub fn idempotent(self) -> Self {
        self.idempotency_key(uuid::Uuid::new_v4().to_string())
    }

    /// Fail with [`Error::NotConnected`] instead of queueing.
    #[must_use]
    pub fn no_queue(mut self) -> Self {
        self.queue_if_disconnected = Some(false);
        self
    }
}

/// Gateway session client.
///
/// Hold one per authenticated tenant context. Switching tenant means
/// `disconnect()` and a new `connect()`; dropping the client disconnects it.
pub struct GatewayClient {
    core: Arc<Core>,
}

impl GatewayClient {
    /// Client over the WebSocket transport. Fails on an invalid config.
    pub fn new(config: GatewayClientConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(WsTransport::new()))
    }

    pub fn with_transport(
        config: GatewayClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(Core::new(config, transport)),
        })
    }

    pub fn config(&self) -> &GatewayClientConfig {
        &self.core.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Connect and complete the handshake.
    ///
    /// Transport failures are retried with backoff while this waits; it
    /// fails on a handshake rejection, or once `reconnect.max_attempts` is
    /// exhausted.
    pub async fn connect(&self, context: TenantContext) -> Result<()> {
        self.core.connect(context).await
    }

    /// Leave the terminal `error` state using the last context.
    pub async fn reconnect(&self) -> Result<()> {
        self.core.reconnect().await
    }

    /// Close the link and reject every pending and queued call. Safe to call
    /// from any state, any number of times.
    pub fn disconnect(&self) {
        self.core.disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.core.subscribe_state()
    }

    // ── Calls ────────────────────────────────────────────────────────────

    /// Send `method` and wait for its response payload.
    pub async fn rpc(&self, method: &str, params: Value, options: RpcOptions) -> Result<Value> {
        let params = attach_idempotency_key(params, options.idempotency_key.as_deref())?;
        self.core.call(method, params, options).await
    }

    /// [`rpc`](Self::rpc) with a typed response.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        options: RpcOptions,
    ) -> Result<T> {
        let payload = self.rpc(method, params, options).await?;
        Ok(serde_json::from_value(payload)?)
    }

    pub fn pending_count(&self) -> usize {
        self.core.pending.len()
    }

    /// Calls waiting for the next `connected`.
    pub fn queued_count(&self) -> usize {
        self.core.queued_count()
    }

    // ── Events ───────────────────────────────────────────────────────────

    /// Subscribe to a gateway event by name, or `"*"` for all. Handlers run
    /// on the client's read loop and must not block.
    pub fn on(
        &self,
        event: impl Into<String>,
        handler: impl Fn(&EventFrame) + Send + Sync + 'static,
    ) -> Subscription {
        self.core.dispatcher.on(event, handler)
    }

    /// Called once per detected `seq` gap, before any targeted resync.
    pub fn on_gap(&self, hook: impl Fn(&SequenceGap) + Send + Sync + 'static) {
        self.core.add_gap_hook(Arc::new(hook));
    }

    // ── Introspection ────────────────────────────────────────────────────

    pub fn connection(&self) -> Option<Connection> {
        self.core.connection()
    }

    /// Snapshot from the latest handshake.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.core.with_connection(|c| c.snapshot.clone())
    }

    pub fn features(&self) -> Option<Features> {
        self.core.with_connection(|c| c.features.clone())
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.core.with_connection(|c| c.server.clone())
    }

    pub fn policy(&self) -> Option<Policy> {
        self.core.with_connection(|c| c.policy)
    }

    pub fn last_state_version(&self) -> Option<StateVersion> {
        self.core.with_connection(|c| c.last_state_version).flatten()
    }

    pub fn supports_method(&self, method: &str) -> bool {
        self.core
            .with_connection(|c| c.features.has_method(method))
            .unwrap_or(false)
    }

    pub fn supports_event(&self, event: &str) -> bool {
        self.core
            .with_connection(|c| c.features.has_event(event))
            .unwrap_or(false)
    }

    pub fn context(&self) -> Option<TenantContext> {
        self.core.context()
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.core.reconnect_attempt()
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.core.disconnect();
    }
}

fn attach_idempotency_key(params: Value, key: Option<&str>) -> Result<Option<Value>> {
    let Some(key) = key else {
        return Ok((!params.is_null()).then_some(params));
    };
    let mut object = match params {
        Value::Null => serde_json::Map::new(),
        Value::Object(object) => object,
        other => {
            return Err(Error::InvalidParams(format!(
                "idempotency key needs object params, got {}",
                json_kind(&other)
            )));
        },
    };
    object.insert("idempotencyKey".into(), Value::String(key.to_string()));
    Ok(Some(Value::Object(object)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
