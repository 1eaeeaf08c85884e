//! Registry of in-flight requests awaiting a correlated response.
//!
//! Each entry is settled at most once: whichever of response, rejection,
//! timeout, cancel or drain removes it from the map first wins, and every
//! later attempt finds nothing and becomes a no-op.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
    time::Duration,
};

use {
    agentfield_protocol::ResponseFrame,
    tokio::{sync::oneshot, task::AbortHandle, time::Instant},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::{Error, Result};

type Outcome = Result<serde_json::Value>;

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

struct PendingCall {
    method: String,
    submitted_at: Instant,
    timeout: Duration,
    timer: AbortHandle,
    tx: oneshot::Sender<Outcome>,
}

/// Shared handle to the pending-call map. Clones refer to the same registry.
#[derive(Clone, Default)]
pub struct PendingCalls {
    calls: Arc<Mutex<HashMap<String, PendingCall>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park a call under `id` and arm its deadline.
    ///
    /// Must run inside a tokio runtime: the deadline is a spawned timer that
    /// rejects the call with [`Error::Timeout`] when it fires.
    pub fn register(
        &self,
        id: impl Into<String>,
        method: impl Into<String>,
        timeout: Duration,
    ) -> Result<PendingResponse> {
        let id = id.into();
        let method = method.into();
        let mut calls = self.lock();
        if calls.contains_key(&id) {
            return Err(Error::message(format!("call id `{id}` is already pending")));
        }

        let (tx, rx) = oneshot::channel();
        let registry = self.clone();
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            registry.expire(&timer_id);
        })
        .abort_handle();

        calls.insert(id.clone(), PendingCall {
            method,
            submitted_at: Instant::now(),
            timeout,
            timer,
            tx,
        });
        Ok(PendingResponse { id, rx })
    }

    fn take(&self, id: &str) -> Option<PendingCall> {
        let call = self.lock().remove(id)?;
        call.timer.abort();
        Some(call)
    }

    /// Settle `id` successfully. Returns `false` for unknown ids.
    pub fn resolve(&self, id: &str, payload: serde_json::Value) -> bool {
        self.settle_with(id, Ok(payload))
    }

    /// Settle `id` with an error. Returns `false` for unknown ids.
    pub fn reject(&self, id: &str, error: Error) -> bool {
        self.settle_with(id, Err(error))
    }

    /// Route a response frame to its caller.
    pub fn settle(&self, response: ResponseFrame) -> bool {
        let outcome = if response.ok {
            Ok(response.payload.unwrap_or(serde_json::Value::Null))
        } else {
            Err(response.error.map(Error::from).unwrap_or_else(|| Error::Remote {
                code: agentfield_protocol::error_codes::INTERNAL.into(),
                message: "response carried ok=false without an error".into(),
                data: None,
                retryable: false,
            }))
        };
        self.settle_with(&response.id, outcome)
    }

    fn settle_with(&self, id: &str, outcome: Outcome) -> bool {
        let Some(call) = self.take(id) else {
            warn!(id, "dropping outcome for unknown or already settled call");
            return false;
        };
        debug!(
            id,
            method = %call.method,
            elapsed_ms = millis(call.submitted_at.elapsed()),
            ok = outcome.is_ok(),
            "call settled"
        );
        // The caller may have dropped its future; that is not an error.
        let _ = call.tx.send(outcome);
        true
    }

    fn expire(&self, id: &str) -> bool {
        let Some(call) = self.take(id) else {
            return false;
        };
        let timeout_ms = millis(call.timeout);
        warn!(id, method = %call.method, timeout_ms, "call timed out");
        #[cfg(feature = "metrics")]
        counter!("gateway_rpc_timeouts_total").increment(1);
        let _ = call.tx.send(Err(Error::Timeout {
            method: call.method,
            timeout_ms,
        }));
        true
    }

    /// Forget `id` without settling it; its future resolves to
    /// [`Error::ConnectionLost`]. Returns `false` for unknown ids.
    pub fn cancel(&self, id: &str) -> bool {
        self.take(id).is_some()
    }

    /// Reject every outstanding call with [`Error::ConnectionLost`].
    pub fn drain_all(&self, reason: &str) -> usize {
        self.drain_matching(reason, |_| true)
    }

    /// Reject the outstanding calls whose id satisfies `select`.
    pub fn drain_matching(&self, reason: &str, select: impl Fn(&str) -> bool) -> usize {
        let drained: Vec<(String, PendingCall)> = {
            let mut calls = self.lock();
            let ids: Vec<String> = calls.keys().filter(|id| select(id)).cloned().collect();
            ids.into_iter()
                .filter_map(|id| calls.remove(&id).map(|call| (id, call)))
                .collect()
        };
        let count = drained.len();
        for (id, call) in drained {
            call.timer.abort();
            debug!(id, method = %call.method, reason, "rejecting pending call");
            let _ = call.tx.send(Err(Error::connection_lost(reason)));
        }
        if count > 0 {
            warn!(count, reason, "drained pending calls");
        }
        count
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Future side of a registered call.
///
/// Dropping it abandons interest only; the entry stays until its response,
/// timeout or a drain removes it.
#[derive(Debug)]
pub struct PendingResponse {
    id: String,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingResponse {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for PendingResponse {
    type Output = Result<serde_json::Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| Err(Error::connection_lost("call cancelled")))
        })
    }
}
