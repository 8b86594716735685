//! Producer-availability fan-out.
//!
//! An explicit topic with a subscriber set: each signaling channel
//! subscribes on connect and gets a channel id; publications carry the
//! originating id so every subscriber except the originator sees the event.

use std::fmt;

use tokio::sync::broadcast;
use uuid::Uuid;

use relay_protocol::SignalEvent;

/// Capacity of the fan-out buffer per subscriber.
const NOTIFY_CHANNEL_CAPACITY: usize = 64;

/// Identity of one signaling channel, used to filter self-publications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One published notification.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Channel whose request triggered the event.
    pub origin: ChannelId,

    /// The event itself.
    pub event: SignalEvent,
}

/// Topic carrying producer-availability events to all connected channels.
pub struct ProducerNotifier {
    tx: broadcast::Sender<Notification>,
}

impl ProducerNotifier {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(NOTIFY_CHANNEL_CAPACITY).0,
        }
    }

    /// Register a new channel.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            id: ChannelId::new(),
            rx: self.tx.subscribe(),
        }
    }

    /// Publish an event to every subscriber except `origin`.
    pub fn publish(&self, origin: ChannelId, event: SignalEvent) {
        // Send only fails with zero subscribers, which is fine.
        let _ = self.tx.send(Notification { origin, event });
    }
}

impl Default for ProducerNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// One channel's view of the topic.
pub struct Subscription {
    id: ChannelId,
    rx: broadcast::Receiver<Notification>,
}

impl Subscription {
    /// The subscriber's channel id, used as publication origin.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Next event addressed to this channel. Skips the channel's own
    /// publications and lagged gaps; returns `None` once the topic is gone.
    pub async fn recv(&mut self) -> Option<SignalEvent> {
        loop {
            match self.rx.recv().await {
                Ok(notification) if notification.origin == self.id => continue,
                Ok(notification) => return Some(notification.event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<SignalEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(notification) if notification.origin == self.id => continue,
                Ok(notification) => return Some(notification.event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fanout_excludes_origin() {
        let notifier = ProducerNotifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        notifier.publish(a.id(), SignalEvent::ProducerAvailable);

        assert_eq!(b.try_recv(), Some(SignalEvent::ProducerAvailable));
        assert_eq!(a.try_recv(), None);
    }

    #[test]
    fn test_fanout_reaches_every_other_subscriber() {
        let notifier = ProducerNotifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        let mut c = notifier.subscribe();

        notifier.publish(a.id(), SignalEvent::ProducerAvailable);

        assert_eq!(b.try_recv(), Some(SignalEvent::ProducerAvailable));
        assert_eq!(c.try_recv(), Some(SignalEvent::ProducerAvailable));
        assert_eq!(b.try_recv(), None);
        assert_eq!(a.try_recv(), None);
    }

    #[tokio::test]
    async fn test_recv_skips_own_publication() {
        let notifier = ProducerNotifier::new();
        let mut a = notifier.subscribe();
        let b = notifier.subscribe();

        notifier.publish(a.id(), SignalEvent::ProducerAvailable);
        notifier.publish(b.id(), SignalEvent::ProducerAvailable);

        // The first (own) publication is skipped, the second delivered.
        assert_eq!(a.recv().await, Some(SignalEvent::ProducerAvailable));
        assert_eq!(a.try_recv(), None);
    }
}
