//! In-process publish/subscribe.
//!
//! Each subscriber owns an unbounded FIFO channel; publishing delivers to
//! subscribers in subscription order. A [`Subscription`] is removed from the
//! bus by [`Subscription::unsubscribe`] or when dropped.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

struct Listeners<E> {
    senders: Mutex<Vec<(u64, mpsc::UnboundedSender<E>)>>,
    next_id: AtomicU64,
}

pub struct EventBus<E> {
    inner: Arc<Listeners<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Listeners { senders: Mutex::new(Vec::new()), next_id: AtomicU64::new(1) }),
        }
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.senders.lock().push((id, tx));
        Subscription { id, rx, bus: Arc::downgrade(&self.inner) }
    }

    /// Deliver `event` to every live subscriber. Returns how many received it.
    pub fn publish(&self, event: &E) -> usize {
        let mut senders = self.inner.senders.lock();
        senders.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        senders.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.senders.lock().len()
    }
}

/// Receiving end of an [`EventBus`] subscription.
pub struct Subscription<E> {
    id: u64,
    rx: mpsc::UnboundedReceiver<E>,
    bus: Weak<Listeners<E>>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Everything already queued, oldest first.
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }

    pub fn unsubscribe(self) {}
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.senders.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_delivery() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        for i in 0..5 {
            bus.publish(&i);
        }
        assert_eq!(sub.drain(), vec![0, 1, 2, 3, 4]);
        bus.publish(&9);
        assert_eq!(sub.recv().await, Some(9));
    }

    #[test]
    fn test_unsubscribe_and_drop() {
        let bus: EventBus<u32> = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        first.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(second);
        assert_eq!(bus.publish(&1), 0);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus: EventBus<u32> = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(&7);
        drop(bus);
        assert_eq!(sub.try_recv(), Some(7));
        assert_eq!(sub.try_recv(), None);
    }
}
