//! Event fan-out, sequence gaps and state versions over a live session.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    agentfield_gateway_client::{ConnectionState, EventFrame, SequenceGap, StateVersion},
    agentfield_protocol::{client_events, methods},
    common::{Harness, config, hello_with_methods, record, subscribe},
    serde_json::{Value, json},
};

fn chat(seq: u64) -> EventFrame {
    EventFrame::new("chat", json!({ "sessionKey": "main", "text": format!("#{seq}") }))
        .with_seq(seq)
}

#[tokio::test(start_paused = true)]
async fn handlers_run_in_order_and_survive_a_panic() {
    let mut h = Harness::new(config());
    let server = h.connect("conn-1").await;

    let order = Arc::new(Mutex::new(Vec::new()));
    let push = |tag: &'static str| {
        let order = Arc::clone(&order);
        move |frame: &EventFrame| {
            if frame.event == "chat" {
                order.lock().unwrap().push(tag);
            }
        }
    };
    h.client.on("*", push("wildcard"));
    h.client.on("chat", push("first"));
    h.client.on("chat", |_| panic!("handler bug"));
    h.client.on("chat", push("second"));
    let mut delivered = subscribe(&h.client, "chat");

    server.event(chat(1));
    delivered.recv().await.unwrap();
    server.event(chat(2));
    delivered.recv().await.unwrap();

    assert_eq!(*order.lock().unwrap(), [
        "first", "second", "wildcard", "first", "second", "wildcard"
    ]);
    assert_eq!(h.client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_handler_stops_receiving() {
    let mut h = Harness::new(config());
    let server = h.connect("conn-1").await;

    let seen = record(&h.client, "presence");
    let other = record(&h.client, "presence");
    let subscription = h.client.on("presence", {
        let seen = Arc::clone(&seen);
        move |frame| seen.lock().unwrap().push(frame.clone())
    });
    let mut delivered = subscribe(&h.client, "presence");

    server.event(EventFrame::new("presence", json!({ "n": 1 })));
    delivered.recv().await.unwrap();
    assert!(subscription.unsubscribe());
    assert!(!subscription.unsubscribe());
    server.event(EventFrame::new("presence", json!({ "n": 2 })));
    delivered.recv().await.unwrap();

    // Twice for the first frame (both handlers), once for the second.
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(other.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn sequence_gap_fires_hook_once_and_signals_resync() {
    let mut h = Harness::new(config());
    let server = h.connect("conn-1").await;

    let gaps: Arc<Mutex<Vec<SequenceGap>>> = Arc::default();
    h.client.on_gap({
        let gaps = Arc::clone(&gaps);
        move |gap| gaps.lock().unwrap().push(gap.clone())
    });
    let resynced = record(&h.client, client_events::RESYNCED);
    let mut delivered = subscribe(&h.client, "chat");

    for seq in [5, 7, 8] {
        server.event(chat(seq));
        assert_eq!(delivered.recv().await.unwrap().seq, Some(seq));
    }

    let gaps = gaps.lock().unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].stream, "sessionKey:main");
    assert_eq!((gaps[0].expected, gaps[0].observed), (6, 7));
    assert_eq!(gaps[0].missing(), 1);

    let resynced = resynced.lock().unwrap();
    assert_eq!(resynced.len(), 1);
    let payload = resynced[0].payload.as_ref().unwrap();
    assert_eq!(payload["reason"], "gap");
    assert_eq!(payload["fromSeq"], 6);
    assert_eq!(payload["snapshot"], Value::Null);
}

#[tokio::test(start_paused = true)]
async fn streams_are_tracked_independently() {
    let mut h = Harness::new(config());
    let server = h.connect("conn-1").await;

    let gaps = Arc::new(Mutex::new(0));
    h.client.on_gap({
        let gaps = Arc::clone(&gaps);
        move |_| *gaps.lock().unwrap() += 1
    });
    let mut delivered = subscribe(&h.client, "chat");

    let frames = [
        EventFrame::new("chat", json!({ "sessionKey": "a" })).with_seq(1),
        EventFrame::new("chat", json!({ "sessionKey": "b" })).with_seq(10),
        EventFrame::new("chat", json!({ "sessionKey": "a" })).with_seq(2),
        EventFrame::new("chat", json!({ "sessionKey": "b" })).with_seq(11),
    ];
    for frame in frames {
        server.event(frame);
        delivered.recv().await.unwrap();
    }
    assert_eq!(*gaps.lock().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn advertised_resync_method_fetches_the_missing_range() {
    let mut h = Harness::new(config());
    let mut server = h
        .connect_with(hello_with_methods("conn-1", &[methods::SNAPSHOT_GET]))
        .await;
    let mut resynced = subscribe(&h.client, client_events::RESYNCED);
    let mut delivered = subscribe(&h.client, "chat");

    server.event(chat(1));
    delivered.recv().await.unwrap();
    server.event(chat(3));
    delivered.recv().await.unwrap();

    let req = server.recv_request().await.unwrap();
    assert_eq!(req.method, methods::SNAPSHOT_GET);
    assert_eq!(
        req.params.unwrap(),
        json!({ "stream": "sessionKey:main", "fromSeq": 2 })
    );
    server.respond_ok(&req.id, json!({ "events": [{ "seq": 2 }] }));

    let signal = resynced.recv().await.unwrap();
    let payload = signal.payload.unwrap();
    assert_eq!(payload["reason"], "gap");
    assert_eq!(payload["snapshot"]["events"][0]["seq"], 2);
}

#[tokio::test(start_paused = true)]
async fn sequences_restart_after_reconnect() {
    let mut h = Harness::new(config());
    let server = h.connect("conn-1").await;

    let gaps = Arc::new(Mutex::new(0));
    h.client.on_gap({
        let gaps = Arc::clone(&gaps);
        move |_| *gaps.lock().unwrap() += 1
    });
    let mut delivered = subscribe(&h.client, "chat");

    server.event(chat(41));
    delivered.recv().await.unwrap();
    server.close("blip");

    let server = h.accept_reconnect("conn-2").await;
    h.wait_for_state(ConnectionState::Connected).await;
    server.event(chat(1));
    delivered.recv().await.unwrap();

    assert_eq!(*gaps.lock().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn newest_state_version_is_kept() {
    let mut h = Harness::new(config());
    let server = h.connect("conn-1").await;
    let mut delivered = subscribe(&h.client, "agents");

    let stamped = |v, ts| {
        EventFrame::new("agents", json!({})).with_state_version(StateVersion::new(v, ts))
    };
    for frame in [stamped(3, 10), stamped(2, 99), stamped(3, 5)] {
        server.event(frame);
        delivered.recv().await.unwrap();
    }

    assert_eq!(h.client.last_state_version(), Some(StateVersion::new(3, 10)));
}

#[tokio::test(start_paused = true)]
async fn events_queued_on_the_link_are_dropped_after_disconnect() {
    let mut h = Harness::new(config());
    let server = h.connect("conn-1").await;
    let seen = record(&h.client, "chat");

    for seq in 1..=20 {
        server.event(chat(seq));
    }
    h.client.disconnect();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn old_link_cannot_reach_the_next_session() {
    let mut h = Harness::new(config());
    let server = h.connect("conn-1").await;
    let seen = record(&h.client, "chat");

    server.event(chat(1).with_state_version(StateVersion::new(9, 9)));
    h.client.disconnect();
    let _next = h.connect("conn-2").await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(h.client.last_state_version(), None);
    assert_eq!(h.client.server_info().unwrap().conn_id, "conn-2");
    drop(server);
}
