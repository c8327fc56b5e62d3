//! Lifecycle notification channel
//!
//! Subscribers get an addressable handle and a receiver. A one-shot
//! subscription is removed from the table before its single delivery, so
//! concurrent publishers deliver it at most once.

use crate::domain::events::DomainEvent;
use crate::CoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

/// An event shared between every subscriber it is delivered to
pub type SharedEvent = Arc<dyn DomainEvent>;

/// Receives lifecycle events for fan-out
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Publish an event
    async fn publish(&self, event: SharedEvent) -> Result<(), CoreError>;
}

/// Address of a subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// Receiving end of a subscription
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriptionHandle,
    receiver: mpsc::UnboundedReceiver<SharedEvent>,
}

impl Subscription {
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Wait for the next event; `None` once the subscription is closed
    pub async fn recv(&mut self) -> Option<SharedEvent> {
        self.receiver.recv().await
    }

    /// Take an event if one is queued
    pub fn try_recv(&mut self) -> Option<SharedEvent> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug)]
struct Subscriber {
    event_type: Option<String>,
    once: bool,
    sender: mpsc::UnboundedSender<SharedEvent>,
}

impl Subscriber {
    fn wants(&self, event_type: &str) -> bool {
        self.event_type.as_deref().map_or(true, |t| t == event_type)
    }
}

/// In-process publisher backed by unbounded channels
#[derive(Debug, Default)]
pub struct ChannelEventPublisher {
    subscribers: DashMap<Uuid, Subscriber>,
}

impl ChannelEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every matching event until unsubscribed; `None` matches all types
    pub fn subscribe(&self, event_type: Option<&str>) -> Subscription {
        self.add_subscriber(event_type, false)
    }

    /// Receive the next matching event only
    pub fn subscribe_once(&self, event_type: Option<&str>) -> Subscription {
        self.add_subscriber(event_type, true)
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscribers.remove(&handle.0).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn add_subscriber(&self, event_type: Option<&str>, once: bool) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers.insert(
            id,
            Subscriber {
                event_type: event_type.map(str::to_string),
                once,
                sender,
            },
        );
        debug!(subscription_id = %id, event_type = ?event_type, once, "Subscription added");
        Subscription {
            handle: SubscriptionHandle(id),
            receiver,
        }
    }
}

#[async_trait]
impl NotificationPublisher for ChannelEventPublisher {
    async fn publish(&self, event: SharedEvent) -> Result<(), CoreError> {
        let event_type = event.event_type();
        let targets: Vec<(Uuid, bool)> = self
            .subscribers
            .iter()
            .filter(|entry| entry.value().wants(event_type))
            .map(|entry| (*entry.key(), entry.value().once))
            .collect();

        for (id, once) in targets {
            let delivered = if once {
                match self.subscribers.remove(&id) {
                    Some((_, subscriber)) => subscriber.sender.send(event.clone()).is_ok(),
                    None => continue,
                }
            } else {
                match self.subscribers.get(&id) {
                    Some(subscriber) => subscriber.sender.send(event.clone()).is_ok(),
                    None => continue,
                }
            };

            if !delivered {
                // receiver dropped
                self.subscribers.remove(&id);
            }
        }

        trace!(event_type, process_instance_id = %event.process_instance_id(), "Event published");
        Ok(())
    }
}

/// Publisher that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

#[async_trait]
impl NotificationPublisher for NullPublisher {
    async fn publish(&self, _event: SharedEvent) -> Result<(), CoreError> {
        Ok(())
    }
}
