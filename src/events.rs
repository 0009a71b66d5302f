//! Publish/subscribe notifications for models and nodes.
//!
//! Every subscriber gets its own unbounded channel, so a slow listener never
//! blocks the emitter. Subscriptions end either through
//! [`EventBus::unsubscribe`] or by dropping the receiver; closed channels are
//! pruned on the next emit.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Events emitted by a [`Model`](crate::model::Model).
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// Fraction of the current recompute that is done, in `[0, 1]`.
    Progress(f64),
    /// A structural edit left the model with this much outstanding work.
    RequiresRecompute(u64),
}

/// Events emitted by a single model node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// The node finished computing its current state.
    Computed { node: String, progress: f64 },
}

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A live subscription: its id and the receiving end of its channel.
#[derive(Debug)]
pub struct Subscription<E> {
    pub id: SubscriptionId,
    pub receiver: UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    /// Drain everything received so far without waiting.
    pub fn drain(&mut self) -> Vec<E> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Fan-out of events to any number of subscribers.
#[derive(Debug)]
pub struct EventBus<E> {
    subscribers: DashMap<SubscriptionId, UnboundedSender<E>>,
    next_id: AtomicU64,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id, tx);
        Subscription { id, receiver: rx }
    }

    /// Stop delivering to a subscription. Returns `false` if it was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Deliver an event to every live subscriber.
    pub fn emit(&self, event: E) {
        self.subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
