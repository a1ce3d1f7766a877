//! In-process fan-out used by the single-node deployment.
//!
//! Committed events flow store-first: the dispatcher appends to the event
//! store, then hands the envelopes here so the basket directory, the order
//! board and the realtime (SSE) feed each get their own copy. Losing a
//! message only delays a projection; the store can always be replayed.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    #[error("subscriber registry lock poisoned")]
    Poisoned,
}

/// Broadcast bus backed by one `mpsc` channel per subscriber.
///
/// Every subscriber receives every published message. A dropped
/// `Subscription` closes its channel and the sender is pruned on the next
/// publish, so projections torn down mid-run never wedge the writers.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribers still holding a live channel. Pruning happens lazily,
    /// so this counts dropped subscriptions until the next publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| InMemoryBusError::Poisoned)?;

        // A failed send means the subscription was dropped; prune it here.
        subs.retain(|tx| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // On a poisoned lock the subscription is still handed out; it simply
        // never sees messages, matching publish which fails outright.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_publish() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(7).unwrap();
        bus.publish(8).unwrap();

        assert_eq!(first.try_recv().unwrap(), 7);
        assert_eq!(first.try_recv().unwrap(), 8);
        assert_eq!(second.try_recv().unwrap(), 7);
        assert_eq!(second.try_recv().unwrap(), 8);
    }

    #[test]
    fn dropped_subscriptions_are_pruned_on_publish() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(1).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), 1);
    }

    #[test]
    fn publish_with_no_subscribers_is_a_no_op() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        bus.publish(1).unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
