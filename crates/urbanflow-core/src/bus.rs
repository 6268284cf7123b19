//! Kind-routed publish/subscribe dispatch.
//!
//! [`EventBus`] fans every published message out to the handlers that
//! registered for its kind, synchronously and in registration order.
//! Handlers are isolated from each other: an `Err` or a panic in one is
//! logged and delivery continues with the next.
//!
//! The registry lock is never held while a handler runs, so handlers may
//! publish, subscribe, unsubscribe, or swap their own handler without
//! deadlocking. A publish delivers to the handlers registered when it
//! started, minus any that unsubscribe before their turn.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use urbanflow_types::{Message, MessageKind};

/// Messages that carry a routing key.
pub trait Routed {
    /// The routing key handlers subscribe to.
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// The routing key of this message.
    fn kind(&self) -> Self::Kind;
}

impl Routed for Message {
    type Kind = MessageKind;

    fn kind(&self) -> MessageKind {
        Self::kind(self)
    }
}

type Handler<M> = Arc<dyn Fn(&M) -> anyhow::Result<()> + Send + Sync>;

struct Slot<M> {
    id: u64,
    active: AtomicBool,
    handler: RwLock<Handler<M>>,
}

impl<M> Slot<M> {
    fn current(&self) -> Handler<M> {
        Arc::clone(&self.handler.read().unwrap_or_else(PoisonError::into_inner))
    }
}

struct Registry<M: Routed> {
    next_id: u64,
    slots: HashMap<M::Kind, Vec<Arc<Slot<M>>>>,
}

struct Inner<M: Routed> {
    registry: Mutex<Registry<M>>,
}

impl<M: Routed> Inner<M> {
    fn remove(&self, kind: M::Kind, id: u64) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slots) = registry.slots.get_mut(&kind) {
            slots.retain(|slot| slot.id != id);
            if slots.is_empty() {
                registry.slots.remove(&kind);
            }
        }
    }
}

/// Outcome of a single [`EventBus::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned `Err` or panicked.
    pub failed: usize,
}

/// A synchronous, kind-routed event bus.
///
/// Cloning is cheap and yields a handle to the same registry.
pub struct EventBus<M: Routed> {
    inner: Arc<Inner<M>>,
}

impl<M: Routed> Clone for EventBus<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Routed> Default for EventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Routed> EventBus<M> {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    next_id: 0,
                    slots: HashMap::new(),
                }),
            }),
        }
    }

    /// Register `handler` for every message of `kind`.
    ///
    /// The handler stays registered until [`Subscription::unsubscribe`]
    /// is called; dropping the returned handle does not remove it.
    pub fn subscribe<F>(&self, kind: M::Kind, handler: F) -> Subscription<M>
    where
        F: Fn(&M) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = self
            .inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id = id.wrapping_add(1);
        let slot = Arc::new(Slot {
            id,
            active: AtomicBool::new(true),
            handler: RwLock::new(Arc::new(handler)),
        });
        registry
            .slots
            .entry(kind)
            .or_default()
            .push(Arc::clone(&slot));
        drop(registry);

        tracing::trace!(?kind, id, "handler subscribed");
        Subscription {
            kind,
            slot,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `message` to every handler registered for its kind.
    pub fn publish(&self, message: &M) -> Delivery {
        let kind = message.kind();
        let slots: Vec<Arc<Slot<M>>> = {
            let registry = self
                .inner
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registry.slots.get(&kind).cloned().unwrap_or_default()
        };

        let mut delivery = Delivery::default();
        for slot in &slots {
            if !slot.active.load(Ordering::Acquire) {
                continue;
            }
            let handler = slot.current();
            match catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(Ok(())) => delivery.delivered = delivery.delivered.saturating_add(1),
                Ok(Err(e)) => {
                    delivery.failed = delivery.failed.saturating_add(1);
                    tracing::warn!(?kind, id = slot.id, error = %e, "event handler failed");
                }
                Err(_) => {
                    delivery.failed = delivery.failed.saturating_add(1);
                    tracing::error!(?kind, id = slot.id, "event handler panicked");
                }
            }
        }
        delivery
    }

    /// Number of handlers currently registered for `kind`.
    pub fn subscriber_count(&self, kind: M::Kind) -> usize {
        let registry = self
            .inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.slots.get(&kind).map_or(0, Vec::len)
    }
}

/// Handle to a registered handler.
pub struct Subscription<M: Routed> {
    kind: M::Kind,
    slot: Arc<Slot<M>>,
    bus: Weak<Inner<M>>,
}

impl<M: Routed> Clone for Subscription<M> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            slot: Arc::clone(&self.slot),
            bus: Weak::clone(&self.bus),
        }
    }
}

impl<M: Routed> Debug for Subscription<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.slot.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl<M: Routed> Subscription<M> {
    /// The kind this handler receives.
    pub const fn kind(&self) -> M::Kind {
        self.kind
    }

    /// Whether the handler is still registered.
    pub fn is_active(&self) -> bool {
        self.slot.active.load(Ordering::Acquire)
    }

    /// Swap the handler in place, keeping its position in delivery order.
    ///
    /// Takes effect from the next delivery; an invocation already running
    /// finishes with the old handler.
    pub fn replace_handler<F>(&self, handler: F)
    where
        F: Fn(&M) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut current = self
            .slot
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(handler);
    }

    /// Remove the handler. Safe to call repeatedly and from inside the
    /// handler itself; no message is delivered to it afterwards.
    pub fn unsubscribe(&self) {
        if !self.slot.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.kind, self.slot.id);
        }
        tracing::trace!(kind = ?self.kind, id = self.slot.id, "handler unsubscribed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use urbanflow_types::{ConnectionNotice, Notification, NotificationLevel};

    use super::*;

    fn notice(text: &str) -> Message {
        Message::Notification(Notification::new(NotificationLevel::Info, text))
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn entries(log: &Log) -> Vec<String> {
        log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn push(log: &Log, entry: String) {
        if let Ok(mut l) = log.lock() {
            l.push(entry);
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let bus = EventBus::<Message>::new();
        let log = Log::default();
        for name in ["a", "b", "c"] {
            let log = Arc::clone(&log);
            let _sub = bus.subscribe(MessageKind::Notification, move |_| {
                push(&log, name.to_owned());
                Ok(())
            });
        }
        let delivery = bus.publish(&notice("hi"));
        assert_eq!(delivery.delivered, 3);
        assert_eq!(entries(&log), vec!["a", "b", "c"]);
    }

    #[test]
    fn routes_by_kind_only() {
        let bus = EventBus::<Message>::new();
        let log = Log::default();
        let l = Arc::clone(&log);
        let _sub = bus.subscribe(MessageKind::Connect, move |_| {
            push(&l, "connect".to_owned());
            Ok(())
        });
        let delivery = bus.publish(&notice("ignored"));
        assert_eq!(delivery, Delivery::default());
        bus.publish(&Message::Connect(ConnectionNotice::default()));
        assert_eq!(entries(&log), vec!["connect"]);
    }

    #[test]
    fn failing_and_panicking_handlers_are_isolated() {
        let bus = EventBus::<Message>::new();
        let log = Log::default();
        let _failing = bus.subscribe(MessageKind::Notification, |_| {
            Err(anyhow::anyhow!("handler error"))
        });
        let _panicking =
            bus.subscribe(MessageKind::Notification, |_| panic!("handler panic"));
        let l = Arc::clone(&log);
        let _ok = bus.subscribe(MessageKind::Notification, move |_| {
            push(&l, "reached".to_owned());
            Ok(())
        });

        let delivery = bus.publish(&notice("x"));
        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.failed, 2);
        assert_eq!(entries(&log), vec!["reached"]);
    }

    #[test]
    fn unsubscribe_inside_own_handler() {
        let bus = EventBus::<Message>::new();
        let log = Log::default();
        let own: Arc<OnceLock<Subscription<Message>>> = Arc::new(OnceLock::new());

        let l = Arc::clone(&log);
        let cell = Arc::clone(&own);
        let sub = bus.subscribe(MessageKind::Notification, move |_| {
            push(&l, "once".to_owned());
            if let Some(me) = cell.get() {
                me.unsubscribe();
            }
            Ok(())
        });
        let _ = own.set(sub);

        let l = Arc::clone(&log);
        let _other = bus.subscribe(MessageKind::Notification, move |_| {
            push(&l, "other".to_owned());
            Ok(())
        });

        bus.publish(&notice("1"));
        bus.publish(&notice("2"));
        assert_eq!(entries(&log), vec!["once", "other", "other"]);
        assert_eq!(bus.subscriber_count(MessageKind::Notification), 1);
    }

    #[test]
    fn unsubscribe_of_later_handler_during_dispatch_skips_it() {
        let bus = EventBus::<Message>::new();
        let log = Log::default();
        let victim: Arc<OnceLock<Subscription<Message>>> = Arc::new(OnceLock::new());

        let cell = Arc::clone(&victim);
        let _first = bus.subscribe(MessageKind::Notification, move |_| {
            if let Some(v) = cell.get() {
                v.unsubscribe();
            }
            Ok(())
        });
        let l = Arc::clone(&log);
        let second = bus.subscribe(MessageKind::Notification, move |_| {
            push(&l, "victim".to_owned());
            Ok(())
        });
        let _ = victim.set(second);

        bus.publish(&notice("x"));
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = EventBus::<Message>::new();
        let sub = bus.subscribe(MessageKind::Error, |_| Ok(()));
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count(MessageKind::Error), 0);
    }

    #[test]
    fn replaced_handler_keeps_position() {
        let bus = EventBus::<Message>::new();
        let log = Log::default();
        let l = Arc::clone(&log);
        let first = bus.subscribe(MessageKind::Notification, move |_| {
            push(&l, "old".to_owned());
            Ok(())
        });
        let l = Arc::clone(&log);
        let _second = bus.subscribe(MessageKind::Notification, move |_| {
            push(&l, "second".to_owned());
            Ok(())
        });
        let l = Arc::clone(&log);
        first.replace_handler(move |_| {
            push(&l, "new".to_owned());
            Ok(())
        });

        bus.publish(&notice("x"));
        assert_eq!(entries(&log), vec!["new", "second"]);
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let bus = EventBus::<Message>::new();
        let log = Log::default();
        let inner_bus = bus.clone();
        let _relay = bus.subscribe(MessageKind::Connect, move |_| {
            inner_bus.publish(&notice("relayed"));
            Ok(())
        });
        let l = Arc::clone(&log);
        let _sink = bus.subscribe(MessageKind::Notification, move |m| {
            if let Message::Notification(n) = m {
                push(&l, n.message.clone());
            }
            Ok(())
        });

        bus.publish(&Message::Connect(ConnectionNotice::default()));
        assert_eq!(entries(&log), vec!["relayed"]);
    }
}
