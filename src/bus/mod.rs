// Connection multiplexer
//
// Owns the subscription registry and the correlation id dedup set, and fans
// decoded inbound events out to per-type and wildcard subscribers. The socket
// itself is driven by `connection::run_connection`, which attaches an outbound
// channel while the link is up and detaches it when the link drops.

pub mod connection;

use crate::config::ConnectionConfig;
use crate::protocol::{CorrelationId, InboundEvent, WireMessage};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use connection::run_connection;

/// Subscribe to every message type
pub const WILDCARD: &str = "*";

/// Callback invoked for each dispatched event
pub type Handler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

type Registry = HashMap<String, Vec<(u64, Handler)>>;

/// Outcome of feeding one inbound frame to the multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Dispatched to this many handlers
    Dispatched(usize),
    /// Correlation id already seen
    Duplicate,
    /// Frame or payload could not be decoded
    Rejected,
}

struct Inner {
    registry: RwLock<Registry>,
    seen: Mutex<HashSet<CorrelationId>>,
    dedup_capacity: usize,
    live: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<WireMessage>>>,
    next_subscription: AtomicU64,
}

/// Message bus between the backend connection and the console's consumers
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

impl Multiplexer {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::with_dedup_capacity(config.dedup_capacity)
    }

    pub fn with_dedup_capacity(dedup_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(HashMap::new()),
                seen: Mutex::new(HashSet::new()),
                dedup_capacity: dedup_capacity.max(1),
                live: AtomicBool::new(false),
                outbound: Mutex::new(None),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    /// Whether the connection is currently up
    pub fn is_connected(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Queue a message for the backend.
    ///
    /// Returns the assigned correlation id, or `None` when the link is down. A
    /// `None` is a failed enqueue; nothing is buffered for later delivery.
    pub fn send(&self, kind: &str, payload: Value) -> Option<CorrelationId> {
        if !self.is_connected() {
            debug!("Dropping outbound {}: not connected", kind);
            return None;
        }

        let correlation_id = uuid::Uuid::new_v4().to_string();
        let msg = WireMessage::new(kind, payload, Some(correlation_id.clone()));

        let outbound = self.inner.outbound.lock();
        match outbound.as_ref() {
            Some(tx) if tx.send(msg).is_ok() => Some(correlation_id),
            _ => {
                debug!("Dropping outbound {}: writer closed", kind);
                None
            }
        }
    }

    /// Register a handler for one message type, or `WILDCARD` for all of them
    pub fn subscribe<F>(&self, kind: &str, handler: F) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.inner
            .registry
            .write()
            .entry(kind.to_string())
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            id,
            kind: kind.to_string(),
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of handlers registered for `kind` (not counting wildcards)
    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.inner.registry.read().get(kind).map_or(0, Vec::len)
    }

    /// Feed one inbound text frame.
    ///
    /// Undecodable frames are logged and dropped; they never poison later ones.
    pub fn handle_text(&self, raw: &str) -> Delivery {
        let msg = match WireMessage::parse(raw) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping undecodable message: {}", e);
                return Delivery::Rejected;
            }
        };
        self.handle_message(msg)
    }

    /// Decode, dedup and dispatch an already parsed frame.
    ///
    /// Only frames that decode claim their correlation id, so a corrected
    /// resend under the same id is still delivered.
    pub fn handle_message(&self, msg: WireMessage) -> Delivery {
        let event = match InboundEvent::decode(&msg) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed {} message: {}", msg.kind, e);
                return Delivery::Rejected;
            }
        };

        if let Some(id) = &msg.correlation_id {
            if !self.remember(id) {
                debug!("Suppressing duplicate delivery of {} ({})", msg.kind, id);
                return Delivery::Duplicate;
            }
        }
        Delivery::Dispatched(self.dispatch(&event))
    }

    /// Deliver an event to exact-type subscribers, then wildcard subscribers.
    ///
    /// Handlers are snapshotted first, so (un)subscribing from inside a handler
    /// only affects later dispatches.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        let handlers: Vec<Handler> = {
            let registry = self.inner.registry.read();
            let exact = registry.get(event.kind()).into_iter().flatten();
            // A frame typed "*" already reached the wildcard handlers as exact
            let wildcard = registry
                .get(WILDCARD)
                .filter(|_| event.kind() != WILDCARD)
                .into_iter()
                .flatten();
            exact.chain(wildcard).map(|(_, h)| Arc::clone(h)).collect()
        };

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Record a correlation id; false when it was already present
    fn remember(&self, id: &str) -> bool {
        let mut seen = self.inner.seen.lock();
        if seen.contains(id) {
            return false;
        }
        if seen.len() >= self.inner.dedup_capacity {
            debug!("Clearing correlation id set ({} entries)", seen.len());
            seen.clear();
        }
        seen.insert(id.to_string());
        true
    }

    /// Mark the link live and route outbound messages to `tx`
    pub(crate) fn attach(&self, tx: mpsc::UnboundedSender<WireMessage>) {
        *self.inner.outbound.lock() = Some(tx);
        self.inner.live.store(true, Ordering::Release);
    }

    /// Mark the link down; later sends fail fast
    pub(crate) fn detach(&self) {
        self.inner.live.store(false, Ordering::Release);
        *self.inner.outbound.lock() = None;
    }
}

/// Handle returned by `Multiplexer::subscribe`
#[must_use = "dropping a Subscription keeps the handler registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    kind: String,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Remove the handler from the registry
    pub fn unsubscribe(self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut registry = inner.registry.write();
        if let Some(handlers) = registry.get_mut(&self.kind) {
            handlers.retain(|(id, _)| *id != self.id);
            if handlers.is_empty() {
                registry.remove(&self.kind);
            }
        }
    }
}
