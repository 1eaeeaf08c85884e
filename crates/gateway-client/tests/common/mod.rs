//! Shared fixtures: a client wired to the in-memory transport and a fake
//! gateway on the other end.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};

use {
    agentfield_config::{GatewayClientConfig, ReconnectConfig},
    agentfield_gateway_client::{
        ConnectionState, EventFrame, GatewayClient, MemoryTransport, TenantContext,
        transport::{MemoryAcceptor, ServerEnd, memory::hello},
    },
    agentfield_protocol::{HelloOk, client_events},
    tokio::sync::mpsc,
};

pub const TOKEN: &str = "operator-token";

/// Deterministic config: no jitter, short backoff, no watchdog.
pub fn config() -> GatewayClientConfig {
    GatewayClientConfig {
        url: "ws://gateway.test/ws".into(),
        tick_watchdog: false,
        reconnect: ReconnectConfig {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            jitter: 0.0,
            max_attempts: None,
        },
        ..Default::default()
    }
}

pub fn context() -> TenantContext {
    TenantContext::new()
        .with_token(TOKEN)
        .with_org("org-1")
        .with_project("proj-1")
}

pub struct Harness {
    pub client: GatewayClient,
    pub transport: MemoryTransport,
    pub acceptor: MemoryAcceptor,
}

impl Harness {
    pub fn new(config: GatewayClientConfig) -> Self {
        let (transport, acceptor) = MemoryTransport::new();
        let client = GatewayClient::with_transport(config, Arc::new(transport.clone())).unwrap();
        Self {
            client,
            transport,
            acceptor,
        }
    }

    /// Connect and answer the handshake with `hello`.
    pub async fn connect_with(&mut self, hello: HelloOk) -> ServerEnd {
        let Self {
            client, acceptor, ..
        } = self;
        let connect = client.connect(context());
        let serve = async {
            let mut server = acceptor.accept().await.unwrap();
            server.handshake(hello).await.unwrap();
            server
        };
        let (result, server) = tokio::join!(connect, serve);
        result.unwrap();
        server
    }

    pub async fn connect(&mut self, conn_id: &str) -> ServerEnd {
        self.connect_with(hello(conn_id)).await
    }

    /// Accept the next automatic reconnect and complete its handshake.
    pub async fn accept_reconnect(&mut self, conn_id: &str) -> ServerEnd {
        let (server, _) = self.acceptor.accept_hello(conn_id).await.unwrap();
        server
    }

    pub async fn wait_for_state(&self, state: ConnectionState) {
        let mut rx = self.client.subscribe_state();
        rx.wait_for(|s| *s == state).await.unwrap();
    }
}

pub fn hello_with_methods(conn_id: &str, methods: &[&str]) -> HelloOk {
    let mut hello = hello(conn_id);
    hello.features.methods = methods.iter().map(|m| m.to_string()).collect();
    hello
}

/// Record every frame delivered for `event`.
pub fn record(client: &GatewayClient, event: &str) -> Arc<Mutex<Vec<EventFrame>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.on(event, move |frame| sink.lock().unwrap().push(frame.clone()));
    seen
}

/// Stream of frames delivered for `event`, for awaiting delivery.
pub fn subscribe(client: &GatewayClient, event: &str) -> mpsc::UnboundedReceiver<EventFrame> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on(event, move |frame| {
        let _ = tx.send(frame.clone());
    });
    rx
}

pub fn event_names(seen: &Mutex<Vec<EventFrame>>) -> Vec<String> {
    seen.lock().unwrap().iter().map(|f| f.event.clone()).collect()
}

/// Target states from recorded `gateway.state` frames.
pub fn state_targets(seen: &Mutex<Vec<EventFrame>>) -> Vec<String> {
    seen.lock()
        .unwrap()
        .iter()
        .filter(|f| f.event == client_events::STATE)
        .filter_map(|f| f.payload_str("to").map(str::to_string))
        .collect()
}
