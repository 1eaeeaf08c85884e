//! Connection lifecycle: transport, handshake, read loop, reconnect and
//! resync.
//!
//! One driver task runs per `connect()`. It owns the transport link and is
//! identified by a generation number; every mutation it makes to the shared
//! session first checks that its generation is still current, so a driver
//! superseded by `disconnect()` or a newer `connect()` can never touch the
//! new connection.

use std::{
    collections::HashSet,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    agentfield_config::GatewayClientConfig,
    agentfield_protocol::{
        CONNECT_METHOD, ErrorShape, EventFrame, Features, GatewayFrame, HelloAuth, HelloOk,
        MAX_BUFFERED_BYTES, MAX_PAYLOAD_BYTES, Policy, RequestFrame, ResponseFrame, ServerInfo,
        Snapshot, StateVersion, client_events, decode_bounded, encode, error_codes,
    },
    serde::Serialize,
    serde_json::{Value, json},
    tokio::{
        sync::{mpsc, oneshot, watch},
        time::{Instant, sleep},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, instrument, trace, warn},
};

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::{
    Error, Result,
    backoff::ReconnectPolicy,
    client::RpcOptions,
    context::TenantContext,
    dispatcher::EventDispatcher,
    pending::{PendingCalls, PendingResponse, millis},
    sequence::SequenceGap,
    transport::{Link, Transport, TransportEvent},
};

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// States from which `connect()` starts without tearing anything down.
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the gateway told us about one live socket. Replaced wholesale on
/// every successful handshake.
#[derive(Debug, Clone)]
pub struct Connection {
    pub conn_id: String,
    pub protocol_version: u32,
    pub server: ServerInfo,
    pub features: Features,
    pub policy: Policy,
    pub snapshot: Snapshot,
    pub auth: Option<HelloAuth>,
    pub last_state_version: Option<StateVersion>,
    /// Reconnect attempt that produced this connection; 0 for a first try.
    pub reconnect_attempt: u32,
}

impl Connection {
    fn from_hello(hello: HelloOk, reconnect_attempt: u32) -> Self {
        Self {
            conn_id: hello.server.conn_id.clone(),
            protocol_version: hello.protocol,
            last_state_version: hello.snapshot.state_version,
            server: hello.server,
            features: hello.features,
            policy: hello.policy,
            snapshot: hello.snapshot,
            auth: hello.auth,
            reconnect_attempt,
        }
    }
}

pub type GapHook = Arc<dyn Fn(&SequenceGap) + Send + Sync>;

type Transition = (ConnectionState, ConnectionState);

struct Queued {
    id: String,
    text: String,
}

#[derive(Default)]
struct Session {
    state: ConnectionState,
    generation: u64,
    cancel: Option<CancellationToken>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    queue: Vec<Queued>,
    connection: Option<Connection>,
    context: Option<TenantContext>,
    reconnect_attempt: u32,
    /// A handshake succeeded since the last explicit disconnect; the next
    /// one is a reconnect and must announce a resync.
    has_connected: bool,
}

/// Handshake result handed from `establish` to `go_live`.
struct Live {
    link: Link,
    hello: HelloOk,
    buffered: Vec<EventFrame>,
}

// ── Core ─────────────────────────────────────────────────────────────────────

pub(crate) struct Core {
    pub(crate) config: GatewayClientConfig,
    policy: ReconnectPolicy,
    transport: Arc<dyn Transport>,
    pub(crate) pending: PendingCalls,
    pub(crate) dispatcher: EventDispatcher,
    gap_hooks: Mutex<Vec<GapHook>>,
    session: Mutex<Session>,
    state_tx: watch::Sender<ConnectionState>,
    next_id: AtomicU64,
    instance_id: String,
}

impl Core {
    pub(crate) fn new(config: GatewayClientConfig, transport: Arc<dyn Transport>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            policy: ReconnectPolicy::from(&config.reconnect),
            dispatcher: EventDispatcher::new(config.stream_key_fields.clone()),
            config,
            transport,
            pending: PendingCalls::new(),
            gap_hooks: Mutex::new(Vec::new()),
            session: Mutex::new(Session::default()),
            state_tx,
            next_id: AtomicU64::new(0),
            instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Correlation ids are unique for the life of the client, across
    /// reconnects, so queued calls can be flushed onto a new socket as is.
    fn next_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    // ── Introspection ────────────────────────────────────────────────────

    pub(crate) fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn connection(&self) -> Option<Connection> {
        self.lock().connection.clone()
    }

    pub(crate) fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> Option<T> {
        self.lock().connection.as_ref().map(f)
    }

    pub(crate) fn context(&self) -> Option<TenantContext> {
        self.lock().context.clone()
    }

    pub(crate) fn reconnect_attempt(&self) -> u32 {
        self.lock().reconnect_attempt
    }

    pub(crate) fn queued_count(&self) -> usize {
        self.lock().queue.len()
    }

    pub(crate) fn add_gap_hook(&self, hook: GapHook) {
        self.gap_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    fn policy(&self) -> Option<Policy> {
        self.with_connection(|c| c.policy)
    }

    // ── Transitions ──────────────────────────────────────────────────────

    fn set_state(&self, session: &mut Session, to: ConnectionState) -> Option<Transition> {
        let from = session.state;
        if from == to {
            return None;
        }
        session.state = to;
        self.state_tx.send_replace(to);
        Some((from, to))
    }

    /// Log and publish a transition. Runs without the session lock held so
    /// handlers may call back into the client.
    fn announce(&self, transition: Option<Transition>) {
        let Some((from, to)) = transition else {
            return;
        };
        info!(%from, %to, "connection state changed");
        self.dispatcher.emit(&EventFrame::new(
            client_events::STATE,
            json!({ "from": from, "to": to }),
        ));
    }

    fn transition(&self, generation: u64, to: ConnectionState) -> bool {
        let change = {
            let mut session = self.lock();
            if session.generation != generation {
                return false;
            }
            self.set_state(&mut session, to)
        };
        self.announce(change);
        true
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    pub(crate) async fn connect(self: &Arc<Self>, context: TenantContext) -> Result<()> {
        if !self.state().is_idle() {
            info!("connect on a live session, tearing down first");
            self.disconnect();
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (generation, cancel) = {
            let mut session = self.lock();
            session.generation += 1;
            let cancel = CancellationToken::new();
            if let Some(previous) = session.cancel.replace(cancel.clone()) {
                previous.cancel();
            }
            session.context = Some(context.clone());
            session.reconnect_attempt = 0;
            (session.generation, cancel)
        };

        tokio::spawn(Arc::clone(self).drive(generation, context, cancel, ready_tx));
        ready_rx
            .await
            .unwrap_or_else(|_| Err(Error::connection_lost("connection attempt abandoned")))
    }

    /// Start over with the last context. Only acts from `error` or
    /// `disconnected`.
    pub(crate) async fn reconnect(self: &Arc<Self>) -> Result<()> {
        let context = {
            let session = self.lock();
            if !session.state.is_idle() {
                return Ok(());
            }
            session.context.clone()
        };
        match context {
            Some(context) => self.connect(context).await,
            None => Err(Error::message("reconnect requires a prior connect")),
        }
    }

    pub(crate) fn disconnect(&self) {
        let change = {
            let mut session = self.lock();
            session.generation += 1;
            if let Some(cancel) = session.cancel.take() {
                cancel.cancel();
            }
            session.outbound = None;
            session.queue.clear();
            session.connection = None;
            session.has_connected = false;
            session.reconnect_attempt = 0;
            self.pending.drain_all("client disconnect");
            self.set_state(&mut session, ConnectionState::Disconnected)
        };
        self.announce(change);
    }

    async fn drive(
        self: Arc<Self>,
        generation: u64,
        context: TenantContext,
        cancel: CancellationToken,
        ready: oneshot::Sender<Result<()>>,
    ) {
        let mut ready = Some(ready);
        let mut attempt: u32 = 0;

        loop {
            if !self.transition(generation, ConnectionState::Connecting) {
                return;
            }
            let established = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.establish(generation, &context, attempt) => result,
            };

            match established {
                Ok(live) => {
                    let Some(link) = self.go_live(generation, live, attempt) else {
                        return;
                    };
                    attempt = 0;
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(()));
                    }
                    let Some(reason) = self.pump(generation, link, &cancel).await else {
                        return;
                    };
                    if !self.on_lost(generation, &reason) {
                        return;
                    }
                },
                Err(err @ Error::HandshakeRejected { .. }) => {
                    error!(error = %err, "handshake rejected, not retrying");
                    self.fail(generation, &err.to_string());
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Err(err));
                    }
                    return;
                },
                Err(err) => {
                    warn!(attempt, error = %err, "connection attempt failed");
                    if !self.transition(generation, ConnectionState::Reconnecting) {
                        return;
                    }
                },
            }

            if !self.policy.allows(attempt) {
                let reason = format!("gave up after {attempt} reconnect attempts");
                error!(%reason, "reconnect attempts exhausted");
                self.fail(generation, &reason);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(Error::connection_lost(reason)));
                }
                return;
            }

            let delay = self.policy.delay_for(attempt);
            attempt += 1;
            {
                let mut session = self.lock();
                if session.generation != generation {
                    return;
                }
                session.reconnect_attempt = attempt;
            }
            info!(
                attempt,
                delay_ms = millis(delay),
                "scheduling reconnect"
            );
            #[cfg(feature = "metrics")]
            counter!("gateway_reconnect_attempts_total").increment(1);

            tokio::select! {
                _ = cancel.cancelled() => return,
                () = sleep(delay) => {},
            }
        }
    }

    /// Open the transport and run the `connect` handshake.
    ///
    /// Transport errors and a handshake timeout are retryable; a refusal, a
    /// malformed hello or an unsupported protocol are not.
    #[instrument(skip_all, fields(url = %self.config.url, attempt = attempt))]
    async fn establish(
        &self,
        generation: u64,
        context: &TenantContext,
        attempt: u32,
    ) -> Result<Live> {
        let mut link = self.transport.connect(&self.config.url).await?;
        if !self.transition(generation, ConnectionState::Authenticating) {
            return Err(Error::connection_lost("superseded"));
        }

        let params = context.connect_params(&self.config, &self.instance_id);
        let id = self.next_id();
        let request = RequestFrame::new(
            id.clone(),
            CONNECT_METHOD,
            Some(serde_json::to_value(&params)?),
        );
        if !link.send(encode(&GatewayFrame::Request(request))) {
            return Err(Error::connection_lost("link closed before handshake"));
        }
        debug!(id = %id, "handshake sent");

        let timeout_ms = self.config.handshake_timeout_ms;
        let mut buffered = Vec::new();
        let response = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            await_hello(&mut link, &id, &mut buffered),
        )
        .await
        .map_err(|_| Error::Timeout {
            method: CONNECT_METHOD.into(),
            timeout_ms,
        })??;

        if !response.ok {
            let shape = response.error.unwrap_or_else(|| {
                ErrorShape::new(error_codes::UNAUTHORIZED, "handshake refused")
            });
            return Err(Error::HandshakeRejected {
                code: shape.code,
                message: shape.message,
            });
        }
        let hello: HelloOk = serde_json::from_value(response.payload.unwrap_or_default())
            .map_err(|e| Error::HandshakeRejected {
                code: error_codes::PROTOCOL_ERROR.into(),
                message: format!("malformed hello: {e}"),
            })?;
        if !params.accepts_protocol(hello.protocol) {
            return Err(Error::HandshakeRejected {
                code: error_codes::PROTOCOL_MISMATCH.into(),
                message: format!(
                    "gateway speaks protocol {}, client supports {}..={}",
                    hello.protocol, params.min_protocol, params.max_protocol
                ),
            });
        }

        info!(
            conn_id = %hello.server.conn_id,
            protocol = hello.protocol,
            server_version = %hello.server.version,
            buffered = buffered.len(),
            "handshake complete"
        );
        Ok(Live {
            link,
            hello,
            buffered,
        })
    }

    /// Install a fresh connection record, flush queued calls, announce the
    /// resync when this is a reconnect, then deliver events that arrived
    /// during the handshake.
    fn go_live(self: &Arc<Self>, generation: u64, live: Live, attempt: u32) -> Option<Link> {
        let Live {
            link,
            hello,
            buffered,
        } = live;

        let (change, resync, flushed) = {
            let mut session = self.lock();
            if session.generation != generation {
                return None;
            }
            let connection = Connection::from_hello(hello, attempt);
            let resync = session.has_connected.then(|| {
                json!({
                    "reason": "reconnect",
                    "connId": connection.conn_id,
                    "snapshot": connection.snapshot,
                })
            });
            session.has_connected = true;
            session.reconnect_attempt = 0;
            session.connection = Some(connection);
            session.outbound = Some(link.outbound.clone());
            let flushed = self.flush_queue(&mut session);
            self.dispatcher.reset_sequences();
            (
                self.set_state(&mut session, ConnectionState::Connected),
                resync,
                flushed,
            )
        };

        if flushed > 0 {
            debug!(flushed, "flushed queued calls");
        }
        self.announce(change);
        if let Some(payload) = resync {
            self.dispatcher
                .emit(&EventFrame::new(client_events::RESYNCED, payload));
        }
        for event in buffered {
            self.deliver(generation, event);
        }
        Some(link)
    }

    fn flush_queue(&self, session: &mut Session) -> usize {
        let Some(tx) = session.outbound.clone() else {
            return 0;
        };
        let mut sent = 0;
        for queued in session.queue.drain(..) {
            // Timed out while waiting.
            if !self.pending.contains(&queued.id) {
                continue;
            }
            if tx.send(queued.text).is_err() {
                break;
            }
            sent += 1;
        }
        sent
    }

    /// Read until the link closes (`Some(reason)`) or the driver is
    /// cancelled (`None`). Cancellation wins over frames already queued on
    /// the link.
    async fn pump(
        self: &Arc<Self>,
        generation: u64,
        mut link: Link,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let window = self.watchdog_window();
        let watchdog = sleep(window.unwrap_or(Duration::MAX));
        tokio::pin!(watchdog);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                event = link.inbound.recv() => match event {
                    Some(TransportEvent::Message(text)) => {
                        if let Some(window) = window {
                            watchdog.as_mut().reset(Instant::now() + window);
                        }
                        self.handle_text(generation, &text);
                    },
                    Some(TransportEvent::Closed { reason }) => return Some(reason),
                    None => return Some("transport closed".into()),
                },
                () = &mut watchdog, if window.is_some() => {
                    let silent_ms = window.map_or(0, millis);
                    warn!(silent_ms, "no traffic from gateway, dropping link");
                    return Some(format!("no traffic for {silent_ms}ms"));
                },
            }
        }
    }

    fn watchdog_window(&self) -> Option<Duration> {
        if !self.config.tick_watchdog {
            return None;
        }
        let tick = self.policy()?.tick_interval_ms;
        (tick > 0).then(|| Duration::from_millis(tick.saturating_mul(2)))
    }

    fn handle_text(self: &Arc<Self>, generation: u64, text: &str) {
        let max = {
            let session = self.lock();
            if session.generation != generation {
                trace!("dropping frame from a superseded link");
                return;
            }
            session
                .connection
                .as_ref()
                .map_or(MAX_BUFFERED_BYTES, |c| c.policy.max_buffered_bytes)
        };
        match decode_bounded(text, max) {
            Ok(GatewayFrame::Response(response)) => {
                self.pending.settle(response);
            },
            Ok(GatewayFrame::Event(event)) => self.deliver(generation, event),
            Ok(GatewayFrame::Request(request)) => {
                warn!(method = %request.method, id = %request.id, "ignoring gateway-initiated request");
            },
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping undecodable frame");
                #[cfg(feature = "metrics")]
                counter!("gateway_decode_errors_total").increment(1);
            },
        }
    }

    /// Dispatch one gateway event unless the link it came from has been
    /// torn down since.
    fn deliver(self: &Arc<Self>, generation: u64, event: EventFrame) {
        {
            let mut session = self.lock();
            if session.generation != generation {
                trace!(event = %event.event, "dropping event from a superseded link");
                return;
            }
            if let Some(version) = event.state_version
                && let Some(connection) = session.connection.as_mut()
                && connection
                    .last_state_version
                    .is_none_or(|current| version.supersedes(&current))
            {
                connection.last_state_version = Some(version);
            }
        }
        let outcome = self.dispatcher.dispatch(&event);
        if let Some(gap) = outcome.gap {
            self.on_gap(gap);
        }
    }

    /// Run gap hooks, then fetch the missing range if the gateway offers a
    /// resync method, and announce `gateway.resynced` either way.
    fn on_gap(self: &Arc<Self>, gap: SequenceGap) {
        let hooks = self
            .gap_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in &hooks {
            if catch_unwind(AssertUnwindSafe(|| hook(&gap))).is_err() {
                error!(stream = %gap.stream, "gap hook panicked");
            }
        }

        let method = self.config.resync_method.clone().filter(|method| {
            self.with_connection(|c| c.features.has_method(method))
                .unwrap_or(false)
        });
        let Some(method) = method else {
            debug!(stream = %gap.stream, "no resync method advertised");
            self.dispatcher.emit(&gap_resynced(&gap, Value::Null));
            return;
        };

        let core = Arc::clone(self);
        tokio::spawn(async move {
            let params = json!({ "stream": gap.stream, "fromSeq": gap.expected });
            match core.call(&method, Some(params), RpcOptions::default()).await {
                Ok(snapshot) => {
                    core.dispatcher.emit(&gap_resynced(&gap, snapshot));
                },
                Err(e) => warn!(stream = %gap.stream, method = %method, error = %e, "targeted resync failed"),
            }
        });
    }

    /// The link dropped: reject what was on the wire, keep what was only
    /// queued, and move to `reconnecting`.
    fn on_lost(&self, generation: u64, reason: &str) -> bool {
        let change = {
            let mut session = self.lock();
            if session.generation != generation {
                return false;
            }
            session.outbound = None;
            let queued: HashSet<&str> = session.queue.iter().map(|q| q.id.as_str()).collect();
            self.pending
                .drain_matching(reason, |id| !queued.contains(id));
            self.set_state(&mut session, ConnectionState::Reconnecting)
        };
        warn!(%reason, "connection lost");
        self.announce(change);
        true
    }

    /// Terminal failure: everything outstanding is rejected and the session
    /// stays in `error` until `reconnect()` or `connect()`.
    fn fail(&self, generation: u64, reason: &str) {
        let change = {
            let mut session = self.lock();
            if session.generation != generation {
                return;
            }
            session.outbound = None;
            session.connection = None;
            session.queue.clear();
            session.cancel = None;
            self.pending.drain_all(reason);
            self.set_state(&mut session, ConnectionState::Error)
        };
        self.announce(change);
    }

    // ── Calls ────────────────────────────────────────────────────────────

    pub(crate) async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        options: RpcOptions,
    ) -> Result<Value> {
        let id = self.next_id();
        let text = encode(&GatewayFrame::Request(RequestFrame::new(
            id.clone(),
            method,
            params,
        )));
        let max = self.policy().map_or(MAX_PAYLOAD_BYTES, |p| p.max_payload);
        if text.len() > max {
            return Err(Error::PayloadTooLarge {
                len: text.len(),
                max,
            });
        }

        let timeout = options
            .timeout
            .unwrap_or(Duration::from_millis(self.config.request_timeout_ms));
        let queue_allowed = options
            .queue_if_disconnected
            .unwrap_or(self.config.queue_while_disconnected);
        let response = self.submit(id, method, text, timeout, queue_allowed)?;
        #[cfg(feature = "metrics")]
        counter!("gateway_rpc_calls_total", "method" => method.to_string()).increment(1);
        response.await
    }

    /// Register the call and either send it now or park it until the next
    /// `connected`. Runs under the session lock so a concurrent drop cannot
    /// strand it between the two.
    fn submit(
        &self,
        id: String,
        method: &str,
        text: String,
        timeout: Duration,
        queue_allowed: bool,
    ) -> Result<PendingResponse> {
        let mut session = self.lock();
        let live = session
            .outbound
            .clone()
            .filter(|_| session.state.is_connected());
        if live.is_none() && !queue_allowed {
            return Err(Error::NotConnected);
        }

        let response = self.pending.register(id.clone(), method, timeout)?;
        match live {
            Some(tx) => match tx.send(text) {
                Ok(()) => debug!(id = %id, method, "request sent"),
                // Writer already gone; the close is on its way.
                Err(unsent) if queue_allowed => session.queue.push(Queued { id, text: unsent.0 }),
                Err(_) => {
                    self.pending.cancel(&id);
                    return Err(Error::NotConnected);
                },
            },
            None => {
                debug!(id = %id, method, state = %session.state, "request queued");
                session.queue.push(Queued { id, text });
            },
        }
        Ok(response)
    }
}

async fn await_hello(
    link: &mut Link,
    id: &str,
    buffered: &mut Vec<EventFrame>,
) -> Result<ResponseFrame> {
    loop {
        match link.inbound.recv().await {
            Some(TransportEvent::Message(text)) => match decode_bounded(&text, MAX_BUFFERED_BYTES) {
                Ok(GatewayFrame::Response(response)) if response.id == id => return Ok(response),
                Ok(GatewayFrame::Event(event)) => buffered.push(event),
                Ok(other) => debug!(kind = other.kind(), "ignoring frame during handshake"),
                Err(e) => warn!(error = %e, "dropping undecodable frame during handshake"),
            },
            Some(TransportEvent::Closed { reason }) => return Err(Error::connection_lost(reason)),
            None => return Err(Error::connection_lost("transport closed during handshake")),
        }
    }
}

fn gap_resynced(gap: &SequenceGap, snapshot: Value) -> EventFrame {
    EventFrame::new(
        client_events::RESYNCED,
        json!({
            "reason": "gap",
            "stream": gap.stream,
            "fromSeq": gap.expected,
            "snapshot": snapshot,
        }),
    )
}
