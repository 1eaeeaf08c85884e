//! Connection lifecycle: handshake outcomes, reconnect and resync.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use {
    agentfield_config::ReconnectConfig,
    agentfield_gateway_client::{
        ConnectionState, Error, EventFrame, RpcOptions, StateVersion, transport::memory::hello,
    },
    agentfield_protocol::{
        MIN_PROTOCOL_VERSION, PROTOCOL_VERSION, client_events, error_codes, methods,
    },
    common::{
        Harness, config, context, event_names, hello_with_methods, record, state_targets,
        subscribe,
    },
    serde_json::json,
    tokio::time::Instant,
};

#[tokio::test(start_paused = true)]
async fn handshake_carries_credentials_and_tenant() {
    let mut h = Harness::new(config());
    let client = &h.client;
    let acceptor = &mut h.acceptor;

    let (connected, params) = tokio::join!(client.connect(context()), async {
        let (_server, params) = acceptor.accept_hello("conn-1").await.unwrap();
        params
    });
    connected.unwrap();

    assert_eq!(params.auth.token.as_deref(), Some(common::TOKEN));
    assert_eq!(params.min_protocol, MIN_PROTOCOL_VERSION);
    assert_eq!(params.max_protocol, PROTOCOL_VERSION);
    let tenant = params.tenant.unwrap();
    assert_eq!(tenant.org_id.as_deref(), Some("org-1"));
    assert_eq!(tenant.project_id.as_deref(), Some("proj-1"));

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.server_info().unwrap().conn_id, "conn-1");
}

#[tokio::test(start_paused = true)]
async fn states_progress_through_the_handshake() {
    let mut h = Harness::new(config());
    let seen = record(&h.client, client_events::STATE);
    let _server = h.connect("conn-1").await;

    assert_eq!(state_targets(&seen), ["connecting", "authenticating", "connected"]);
}

#[tokio::test(start_paused = true)]
async fn rejected_handshake_is_not_retried() {
    let mut h = Harness::new(config());
    let client = &h.client;
    let acceptor = &mut h.acceptor;

    let (result, _server) = tokio::join!(client.connect(context()), async {
        let mut server = acceptor.accept().await.unwrap();
        let req = server.recv_request().await.unwrap();
        server.respond_err(&req.id, error_codes::UNAUTHORIZED, "bad token");
        server
    });

    match result {
        Err(Error::HandshakeRejected { code, message }) => {
            assert_eq!(code, error_codes::UNAUTHORIZED);
            assert_eq!(message, "bad token");
        },
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Error);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.attempts(), 1);
    assert_eq!(h.client.state(), ConnectionState::Error);
}

#[tokio::test(start_paused = true)]
async fn unsupported_protocol_is_rejected() {
    let mut h = Harness::new(config());
    let client = &h.client;
    let acceptor = &mut h.acceptor;

    let mut future = hello("conn-1");
    future.protocol = PROTOCOL_VERSION + 7;
    let (result, _server) = tokio::join!(client.connect(context()), async {
        let mut server = acceptor.accept().await.unwrap();
        server.handshake(future).await.unwrap();
        server
    });

    let err = result.unwrap_err();
    assert_eq!(err.code(), Some(error_codes::PROTOCOL_MISMATCH));
    assert_eq!(client.state(), ConnectionState::Error);
    assert!(client.connection().is_none());
}

#[tokio::test(start_paused = true)]
async fn refused_connects_back_off_then_succeed() {
    let mut h = Harness::new(config());
    h.transport.refuse_next(2);
    let client = &h.client;
    let acceptor = &mut h.acceptor;

    let started = Instant::now();
    let (result, _server) = tokio::join!(client.connect(context()), async {
        acceptor.accept_hello("conn-1").await.unwrap()
    });
    result.unwrap();

    // 100ms after the first refusal, 200ms after the second.
    assert_eq!(started.elapsed(), Duration::from_millis(300));
    assert_eq!(h.transport.attempts(), 3);
    assert_eq!(h.client.reconnect_attempt(), 0);
    assert_eq!(h.client.connection().unwrap().reconnect_attempt, 2);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts_until_manual_reconnect() {
    let mut h = Harness::new(agentfield_config::GatewayClientConfig {
        reconnect: ReconnectConfig {
            max_attempts: Some(2),
            ..config().reconnect
        },
        ..config()
    });
    h.transport.refuse_next(u32::MAX);

    let result = h.client.connect(context()).await;
    match result {
        Err(Error::ConnectionLost { reason }) => {
            assert_eq!(reason, "gave up after 2 reconnect attempts");
        },
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.transport.attempts(), 3);
    assert_eq!(h.client.state(), ConnectionState::Error);

    h.transport.refuse_next(0);
    let client = &h.client;
    let acceptor = &mut h.acceptor;
    let (result, _server) = tokio::join!(client.reconnect(), async {
        acceptor.accept_hello("conn-2").await.unwrap()
    });
    result.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.server_info().unwrap().conn_id, "conn-2");
}

#[tokio::test(start_paused = true)]
async fn reconnect_without_prior_connect_errors() {
    let h = Harness::new(config());
    assert!(matches!(h.client.reconnect().await, Err(Error::Message(_))));
}

#[tokio::test(start_paused = true)]
async fn silent_handshake_times_out_and_retries() {
    let mut h = Harness::new(agentfield_config::GatewayClientConfig {
        handshake_timeout_ms: 500,
        ..config()
    });
    let client = &h.client;
    let acceptor = &mut h.acceptor;

    let started = Instant::now();
    let (result, (_silent, _live)) = tokio::join!(client.connect(context()), async {
        let mut silent = acceptor.accept().await.unwrap();
        silent.recv_request().await.unwrap();
        let live = acceptor.accept_hello("conn-2").await.unwrap();
        (silent, live)
    });
    result.unwrap();

    assert_eq!(started.elapsed(), Duration::from_millis(600));
    assert_eq!(h.transport.attempts(), 2);
    assert_eq!(h.client.server_info().unwrap().conn_id, "conn-2");
}

#[tokio::test(start_paused = true)]
async fn dropped_link_rejects_in_flight_calls_then_reconnects() {
    let mut h = Harness::new(config());
    let seen = record(&h.client, client_events::STATE);
    let mut server = h.connect("conn-1").await;

    let call = h.client.rpc("status", json!({}), RpcOptions::default());
    let serve = async move {
        server.recv_request().await.unwrap();
        server.close("gateway restarting");
    };
    let (result, ()) = tokio::join!(call, serve);

    match result {
        Err(Error::ConnectionLost { reason }) => assert_eq!(reason, "gateway restarting"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.client.state(), ConnectionState::Reconnecting);
    assert_eq!(h.client.pending_count(), 0);

    let _server = h.accept_reconnect("conn-2").await;
    h.wait_for_state(ConnectionState::Connected).await;

    assert_eq!(state_targets(&seen), [
        "connecting",
        "authenticating",
        "connected",
        "reconnecting",
        "connecting",
        "authenticating",
        "connected",
    ]);
    assert_eq!(h.client.server_info().unwrap().conn_id, "conn-2");
}

#[tokio::test(start_paused = true)]
async fn reconnect_announces_resync_before_buffered_events() {
    let mut h = Harness::new(config());
    let seen = record(&h.client, "*");
    let server = h.connect("conn-1").await;
    assert!(!event_names(&seen).contains(&client_events::RESYNCED.to_string()));

    server.close("network blip");
    let mut server = h.acceptor.accept().await.unwrap();
    let req = server.recv_request().await.unwrap();
    // Pushed before the hello-ok: buffered until the session is live.
    server.event(EventFrame::new("chat", json!({ "sessionKey": "main", "text": "hi" })));
    server.respond_ok(&req.id, serde_json::to_value(hello("conn-2")).unwrap());
    h.wait_for_state(ConnectionState::Connected).await;

    let names = event_names(&seen);
    let tail = &names[names.len() - 3..];
    assert_eq!(tail, [client_events::STATE, client_events::RESYNCED, "chat"]);
    let resyncs: Vec<_> = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|f| f.event == client_events::RESYNCED)
        .cloned()
        .collect();
    assert_eq!(resyncs.len(), 1);
    assert_eq!(resyncs[0].payload_str("reason"), Some("reconnect"));
    assert_eq!(resyncs[0].payload_str("connId"), Some("conn-2"));
}

#[tokio::test(start_paused = true)]
async fn calls_queued_during_reconnect_are_flushed() {
    let mut h = Harness::new(config());
    let server = h.connect("conn-1").await;
    server.close("blip");
    h.wait_for_state(ConnectionState::Reconnecting).await;

    let client = &h.client;
    let acceptor = &mut h.acceptor;
    let call = client.rpc("health", json!({}), RpcOptions::default());
    let serve = async {
        let (mut server, _) = acceptor.accept_hello("conn-2").await.unwrap();
        let req = server.recv_request().await.unwrap();
        server.respond_ok(&req.id, json!("healthy"));
        server
    };
    let (result, _server) = tokio::join!(call, serve);
    assert_eq!(result.unwrap(), json!("healthy"));
}

#[tokio::test(start_paused = true)]
async fn silent_gateway_trips_the_watchdog() {
    let mut h = Harness::new(agentfield_config::GatewayClientConfig {
        tick_watchdog: true,
        ..config()
    });
    let mut quiet = hello("conn-1");
    quiet.policy.tick_interval_ms = 1_000;
    let _server = h.connect_with(quiet).await;

    let started = Instant::now();
    h.wait_for_state(ConnectionState::Reconnecting).await;
    assert_eq!(started.elapsed(), Duration::from_millis(2_000));

    let _server = h.accept_reconnect("conn-2").await;
    h.wait_for_state(ConnectionState::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn connect_while_connected_starts_fresh() {
    let mut h = Harness::new(config());
    let mut first = h.connect("conn-1").await;
    let seen = record(&h.client, "*");

    let _second = h.connect("conn-2").await;

    assert_eq!(first.recv_text().await, None);
    assert_eq!(state_targets(&seen), [
        "disconnected",
        "connecting",
        "authenticating",
        "connected",
    ]);
    assert!(!event_names(&seen).contains(&client_events::RESYNCED.to_string()));
    assert_eq!(h.client.server_info().unwrap().conn_id, "conn-2");
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_backoff_abandons_the_attempt() {
    let mut h = Harness::new(config());
    h.transport.refuse_next(u32::MAX);
    let client = &h.client;

    let (result, ()) = tokio::join!(client.connect(context()), async {
        let mut rx = client.subscribe_state();
        rx.wait_for(|s| *s == ConnectionState::Reconnecting)
            .await
            .unwrap();
        client.disconnect();
    });

    assert!(matches!(result, Err(Error::ConnectionLost { .. })));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    let attempts = h.transport.attempts();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.transport.attempts(), attempts);
}

#[tokio::test(start_paused = true)]
async fn disconnect_clears_session_introspection() {
    let mut h = Harness::new(config());
    let server = h
        .connect_with(hello_with_methods("conn-1", &[methods::HEALTH]))
        .await;
    let mut delivered = subscribe(&h.client, "agents");
    server.event(EventFrame::new("agents", json!({})).with_state_version(StateVersion::new(2, 1)));
    delivered.recv().await.unwrap();
    assert!(h.client.supports_method(methods::HEALTH));
    assert!(h.client.last_state_version().is_some());

    h.client.disconnect();

    assert!(h.client.connection().is_none());
    assert!(h.client.server_info().is_none());
    assert!(h.client.snapshot().is_none());
    assert!(h.client.features().is_none());
    assert!(h.client.policy().is_none());
    assert!(!h.client.supports_method(methods::HEALTH));
    assert_eq!(h.client.last_state_version(), None);
}

#[tokio::test(start_paused = true)]
async fn terminal_failure_clears_the_connection_record() {
    let mut h = Harness::new(agentfield_config::GatewayClientConfig {
        reconnect: ReconnectConfig {
            max_attempts: Some(0),
            ..config().reconnect
        },
        ..config()
    });
    let server = h.connect("conn-1").await;
    assert!(h.client.connection().is_some());

    h.transport.refuse_next(u32::MAX);
    server.close("gateway gone");
    h.wait_for_state(ConnectionState::Error).await;

    assert!(h.client.connection().is_none());
    assert!(h.client.server_info().is_none());
}
