//! Realtime gateway session client.
//!
//! One persistent connection carries request/response calls and pushed
//! events. [`GatewayClient`] owns the lifecycle (handshake, reconnect with
//! backoff, resync), correlates responses to callers, and fans events out
//! to subscribers.
//!
//! ```no_run
//! # async fn run() -> agentfield_gateway_client::Result<()> {
//! use agentfield_gateway_client::{GatewayClient, RpcOptions, TenantContext};
//!
//! let config = agentfield_config::discover_and_load();
//! let context = TenantContext::from_config(&config);
//! let client = GatewayClient::new(config)?;
//! client.on("chat", |event| println!("{:?}", event.payload));
//! client.connect(context).await?;
//! let agents = client.agents_list().await?;
//! # let _ = agents;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod methods;
pub mod pending;
pub mod sequence;
pub mod transport;
pub mod versioned;

pub use {
    agentfield_protocol::{EventFrame, StateVersion},
    client::{GatewayClient, RpcOptions},
    connection::{Connection, ConnectionState},
    context::TenantContext,
    dispatcher::{EventDispatcher, Subscription},
    error::{Error, Result},
    sequence::SequenceGap,
    transport::{Link, Transport, TransportEvent, WsTransport},
    versioned::Versioned,
};

#[doc(hidden)]
pub use transport::MemoryTransport;
