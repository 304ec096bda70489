use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use futures::{FutureExt, SinkExt};
use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::future::BoxFuture;
use log::debug;

use crate::device::types::DeviceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    senders: Vec<(SubscriptionId, Sender<DeviceEvent>)>,
    forwards: Vec<(SubscriptionId, Arc<EventBus>)>,
}

/// Fan-out of device events to any number of channel subscribers.
///
/// Events are delivered to every subscriber in the order `emit` is called. A full subscriber
/// channel applies backpressure to the emitter. Subscribers whose receiver has been dropped are
/// removed on the next `emit`. A bus can also forward into other buses (see
/// [`EventBus::forward_to`]); forwarded events have reached the other bus's subscribers by the
/// time `emit` returns.
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: Mutex<Subscribers>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Subscribers::default()),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        // a panicking subscriber must not take the bus down with it
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn subscribe(&self, sender: Sender<DeviceEvent>) -> SubscriptionId {
        let id = self.next_id();
        self.subscribers().senders.push((id, sender));
        id
    }

    pub fn subscribe_channel(&self, capacity: usize) -> (SubscriptionId, Receiver<DeviceEvent>) {
        let (sender, receiver) = channel::<DeviceEvent>(capacity);
        (self.subscribe(sender), receiver)
    }

    /// Re-emit every event of this bus, unchanged, on `target`.
    pub fn forward_to(&self, target: Arc<EventBus>) -> SubscriptionId {
        let id = self.next_id();
        self.subscribers().forwards.push((id, target));
        id
    }

    /// Returns false if the subscription was not (or no longer) registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers();
        let before = subscribers.senders.len() + subscribers.forwards.len();
        subscribers.senders.retain(|(existing, _)| *existing != id);
        subscribers.forwards.retain(|(existing, _)| *existing != id);
        subscribers.senders.len() + subscribers.forwards.len() != before
    }

    /// Drop every forward registered with [`EventBus::forward_to`].
    pub fn clear_forwards(&self) {
        self.subscribers().forwards.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().senders.len()
    }

    // boxed because forwarding recurses into the target bus
    pub fn emit(&self, event: DeviceEvent) -> BoxFuture<'_, ()> {
        async move {
            // never hold the lock across an await
            let (senders, forwards) = {
                let subscribers = self.subscribers();
                (subscribers.senders.clone(), subscribers.forwards.clone())
            };
            let mut closed: Vec<SubscriptionId> = Vec::new();

            for (id, mut sender) in senders {
                if sender.send(event.clone()).await.is_err() {
                    closed.push(id);
                }
            }

            for (_, target) in forwards {
                target.emit(event.clone()).await;
            }

            if !closed.is_empty() {
                debug!("Dropping {} closed event subscriber(s)", closed.len());
                self.subscribers().senders.retain(|(id, _)| !closed.contains(id));
            }
        }.boxed()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn delivers_in_emit_order_to_every_subscriber() {
        let bus = EventBus::new();
        let (_, mut first) = bus.subscribe_channel(8);
        let (_, mut second) = bus.subscribe_channel(8);

        bus.emit(DeviceEvent::ConnectionStatusChanged("a".to_string())).await;
        bus.emit(DeviceEvent::ErrorOccurred("b".to_string())).await;

        for receiver in [&mut first, &mut second] {
            assert_eq!(receiver.next().await, Some(DeviceEvent::ConnectionStatusChanged("a".to_string())));
            assert_eq!(receiver.next().await, Some(DeviceEvent::ErrorOccurred("b".to_string())));
        }
    }

    #[tokio::test]
    async fn unsubscribed_receiver_gets_nothing() {
        let bus = EventBus::new();
        let (id, mut receiver) = bus.subscribe_channel(8);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));

        bus.emit(DeviceEvent::ErrorOccurred("ignored".to_string())).await;
        // the bus dropped its sender, so the stream ends without an item
        assert_eq!(receiver.next().await, None);
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned() {
        let bus = EventBus::new();
        let (_, receiver) = bus.subscribe_channel(8);
        let (_, mut kept) = bus.subscribe_channel(8);
        drop(receiver);
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(DeviceEvent::ErrorOccurred("x".to_string())).await;

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.next().await, Some(DeviceEvent::ErrorOccurred("x".to_string())));
    }

    #[tokio::test]
    async fn forwarded_events_arrive_before_emit_returns() {
        let source = EventBus::new();
        let target = Arc::new(EventBus::new());
        let (_, mut receiver) = target.subscribe_channel(8);
        let forward = source.forward_to(target.clone());

        source.emit(DeviceEvent::ConnectionStatusChanged("up".to_string())).await;
        assert_eq!(receiver.try_next().unwrap(), Some(DeviceEvent::ConnectionStatusChanged("up".to_string())));

        assert!(source.unsubscribe(forward));
        source.emit(DeviceEvent::ErrorOccurred("dropped".to_string())).await;
        assert!(receiver.try_next().is_err());
    }
}
