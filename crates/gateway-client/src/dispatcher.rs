//! Fan-out of gateway events to registered handlers.
//!
//! Handlers for an exact event name run first, in registration order, then
//! wildcard handlers in registration order. A panicking handler is logged
//! and skipped; the rest still see the event.

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use {
    agentfield_protocol::{EventFrame, subscriptions::WILDCARD},
    tracing::{debug, error, warn},
};

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::sequence::{SeqObservation, SequenceGap, SequenceTracker};

pub type EventHandler = Arc<dyn Fn(&EventFrame) + Send + Sync>;

struct Registration {
    id: u64,
    handler: EventHandler,
}

struct Inner {
    handlers: HashMap<String, Vec<Registration>>,
    next_id: u64,
    sequences: SequenceTracker,
}

/// Result of delivering one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub panicked: usize,
    pub gap: Option<SequenceGap>,
}

#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Mutex<Inner>>,
}

impl EventDispatcher {
    pub fn new(stream_key_fields: Vec<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                handlers: HashMap::new(),
                next_id: 0,
                sequences: SequenceTracker::new(stream_key_fields),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `event` (or [`WILDCARD`] for every event).
    pub fn on(
        &self,
        event: impl Into<String>,
        handler: impl Fn(&EventFrame) + Send + Sync + 'static,
    ) -> Subscription {
        let event = event.into();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .handlers
            .entry(event.clone())
            .or_default()
            .push(Registration {
                id,
                handler: Arc::new(handler),
            });
        debug!(event = %event, id, "event handler registered");
        Subscription {
            dispatcher: Arc::downgrade(&self.inner),
            event,
            id,
        }
    }

    /// Deliver a gateway event, tracking its `seq` first.
    pub fn dispatch(&self, frame: &EventFrame) -> DispatchOutcome {
        let (handlers, observation) = {
            let mut inner = self.lock();
            let observation = inner.sequences.observe(frame);
            (Self::handlers_for(&inner, &frame.event), observation)
        };

        let gap = match observation {
            SeqObservation::Gap(gap) => {
                warn!(
                    stream = %gap.stream,
                    event = %gap.event,
                    expected = gap.expected,
                    observed = gap.observed,
                    "event sequence gap"
                );
                #[cfg(feature = "metrics")]
                counter!("gateway_event_gaps_total").increment(1);
                Some(gap)
            },
            SeqObservation::Stale { last, observed } => {
                debug!(event = %frame.event, last, observed, "stale or duplicate seq");
                None
            },
            _ => None,
        };

        let (delivered, panicked) = Self::invoke(&handlers, frame);
        DispatchOutcome {
            delivered,
            panicked,
            gap,
        }
    }

    /// Deliver a client-generated event. Not sequence tracked.
    pub fn emit(&self, frame: &EventFrame) -> usize {
        let handlers = Self::handlers_for(&self.lock(), &frame.event);
        Self::invoke(&handlers, frame).0
    }

    /// Forget sequence state; called when a new connection starts.
    pub fn reset_sequences(&self) {
        self.lock().sequences.reset();
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.lock().handlers.get(event).map_or(0, Vec::len)
    }

    fn handlers_for(inner: &Inner, event: &str) -> Vec<EventHandler> {
        let exact = inner.handlers.get(event).into_iter().flatten();
        let wildcard = (event != WILDCARD)
            .then(|| inner.handlers.get(WILDCARD))
            .flatten()
            .into_iter()
            .flatten();
        exact
            .chain(wildcard)
            .map(|r| Arc::clone(&r.handler))
            .collect()
    }

    fn invoke(handlers: &[EventHandler], frame: &EventFrame) -> (usize, usize) {
        let mut panicked = 0;
        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(frame))) {
                panicked += 1;
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!(event = %frame.event, %reason, "event handler panicked");
                #[cfg(feature = "metrics")]
                counter!("gateway_handler_panics_total").increment(1);
            }
        }
        (handlers.len() - panicked, panicked)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Handle returned by [`EventDispatcher::on`]. Dropping it keeps the handler
/// registered; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    dispatcher: Weak<Mutex<Inner>>,
    event: String,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove the handler. Returns `false` if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        let Some(inner) = self.dispatcher.upgrade() else {
            return false;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = inner.handlers.get_mut(&self.event) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != self.id);
        let removed = list.len() != before;
        if list.is_empty() {
            inner.handlers.remove(&self.event);
        }
        removed
    }
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("events", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, serde_json::json};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> EventHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |tag: &'static str| -> EventHandler {
            let sink = Arc::clone(&sink);
            Arc::new(move |frame: &EventFrame| {
                sink.lock().unwrap().push(format!("{tag}:{}", frame.event));
            })
        };
        (log, make)
    }

    #[test]
    fn exact_handlers_run_in_order_then_wildcard() {
        let dispatcher = EventDispatcher::default();
        let (log, make) = recorder();
        let (a, b, w) = (make("a"), make("b"), make("w"));
        dispatcher.on(WILDCARD, move |f| w(f));
        dispatcher.on("chat", move |f| a(f));
        dispatcher.on("chat", move |f| b(f));

        let outcome = dispatcher.dispatch(&EventFrame::new("chat", json!({})));
        assert_eq!(outcome.delivered, 3);
        assert_eq!(*log.lock().unwrap(), vec!["a:chat", "b:chat", "w:chat"]);
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let dispatcher = EventDispatcher::default();
        let (log, make) = recorder();
        let (a, c) = (make("a"), make("c"));
        dispatcher.on("tick", move |f| a(f));
        dispatcher.on("tick", |_| panic!("boom"));
        dispatcher.on("tick", move |f| c(f));

        let outcome = dispatcher.dispatch(&EventFrame::new("tick", json!({})));
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.panicked, 1);
        assert_eq!(*log.lock().unwrap(), vec!["a:tick", "c:tick"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let dispatcher = EventDispatcher::default();
        let (log, make) = recorder();
        let (a, b) = (make("a"), make("b"));
        let sub = dispatcher.on("presence", move |f| a(f));
        dispatcher.on("presence", move |f| b(f));

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert_eq!(dispatcher.handler_count("presence"), 1);
        dispatcher.dispatch(&EventFrame::new("presence", json!({})));
        assert_eq!(*log.lock().unwrap(), vec!["b:presence"]);
    }

    #[test]
    fn handler_may_register_during_dispatch() {
        let dispatcher = EventDispatcher::default();
        let inner = dispatcher.clone();
        dispatcher.on("chat", move |_| {
            inner.on("chat", |_| {});
        });
        assert_eq!(dispatcher.dispatch(&EventFrame::new("chat", json!({}))).delivered, 1);
        assert_eq!(dispatcher.handler_count("chat"), 2);
    }

    #[test]
    fn dispatch_reports_gap_but_still_delivers() {
        let dispatcher = EventDispatcher::new(vec!["sessionKey".into()]);
        let (log, make) = recorder();
        let a = make("a");
        dispatcher.on("chat", move |f| a(f));

        let frame = |seq| EventFrame::new("chat", json!({ "sessionKey": "main" })).with_seq(seq);
        assert!(dispatcher.dispatch(&frame(5)).gap.is_none());
        let gap = dispatcher.dispatch(&frame(7)).gap.unwrap();
        assert_eq!((gap.expected, gap.observed), (6, 7));
        assert!(dispatcher.dispatch(&frame(8)).gap.is_none());
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn emit_skips_sequence_tracking() {
        let dispatcher = EventDispatcher::default();
        dispatcher.dispatch(&EventFrame::new("x", json!({})).with_seq(1));
        dispatcher.emit(&EventFrame::new("x", json!({})).with_seq(9));
        assert!(dispatcher.dispatch(&EventFrame::new("x", json!({})).with_seq(2)).gap.is_none());
    }

    #[test]
    fn unsubscribe_after_dispatcher_dropped() {
        let dispatcher = EventDispatcher::default();
        let sub = dispatcher.on("chat", |_| {});
        drop(dispatcher);
        assert!(!sub.unsubscribe());
        assert_eq!(sub.event(), "chat");
    }
}
