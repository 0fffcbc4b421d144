use crate::snapshot::WalletSnapshot;
use std::fmt;

pub type SnapshotHandler = Box<dyn FnMut(&WalletSnapshot) + Send>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SubscriptionId(u64);

/// Returned by [`NotificationBus::subscribe`]; pass it back to unsubscribe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub consumer: String,
}

struct Subscriber {
    id: SubscriptionId,
    consumer: String,
    handler: SnapshotHandler,
}

/// Fans accepted snapshot transitions out to consumers, synchronously and in
/// subscription order. Only the engine publishes, and it only publishes
/// snapshots that differ from the previous publication.
#[derive(Default)]
pub struct NotificationBus {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        consumer: impl Into<String>,
        handler: SnapshotHandler,
    ) -> Subscription {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let consumer = consumer.into();
        tracing::debug!(consumer = %consumer, "bus subscriber added");
        self.subscribers.push(Subscriber {
            id,
            consumer: consumer.clone(),
            handler,
        });
        Subscription { id, consumer }
    }

    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != subscription.id);
        before != self.subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub(crate) fn publish(&mut self, snapshot: &WalletSnapshot) -> usize {
        for subscriber in &mut self.subscribers {
            tracing::trace!(consumer = %subscriber.consumer, "delivering snapshot");
            (subscriber.handler)(snapshot);
        }
        self.subscribers.len()
    }
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field(
                "consumers",
                &self
                    .subscribers
                    .iter()
                    .map(|s| s.consumer.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
