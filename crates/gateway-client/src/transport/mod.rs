//! Byte-pipe seam between the session client and the network.
//!
//! A [`Transport`] opens a [`Link`]: an outbound text sender and an inbound
//! event stream that ends with exactly one [`TransportEvent::Closed`].
//! Dropping the link's sender closes the underlying connection.

use {async_trait::async_trait, tokio::sync::mpsc};

use crate::Result;

/// Loopback gateway for tests. Hidden from the docs and exempt from
/// semver guarantees.
#[doc(hidden)]
pub mod memory;
pub mod ws;

#[doc(hidden)]
pub use memory::{MemoryAcceptor, MemoryTransport, ServerEnd};
pub use ws::WsTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete text message.
    Message(String),
    /// The link is gone. No further events follow.
    Closed { reason: String },
}

/// An open connection.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Link {
    /// Queue `text` for sending. Returns `false` once the link is closed.
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `url`. Errors are transport failures and are
    /// retried by the reconnect loop.
    async fn connect(&self, url: &str) -> Result<Link>;
}
