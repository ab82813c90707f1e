//! Domain-scoped "keyword data changed" signals.
//!
//! A signal is only a hint to re-fetch: it carries no keyword data, and
//! receiving the same signal twice is harmless.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RefreshSignal {
    pub domain_id: String,
    pub timestamp: DateTime<Utc>,
    /// What caused the refresh, e.g. `pending-keywords`.
    pub source: String,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    by_domain: HashMap<String, Vec<(u64, mpsc::UnboundedSender<RefreshSignal>)>>,
}

/// Publish/subscribe channel keyed by domain id. Clones share subscribers.
#[derive(Clone, Default)]
pub struct Notifier {
    inner: Arc<Mutex<Subscribers>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `domain_id`. The subscription lasts until it is
    /// dropped.
    pub fn subscribe(&self, domain_id: impl Into<String>) -> Subscription {
        let domain_id = domain_id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut subs = self.inner.lock().unwrap();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.by_domain
            .entry(domain_id.clone())
            .or_default()
            .push((id, tx));

        Subscription {
            id,
            domain_id,
            rx,
            subscribers: Arc::downgrade(&self.inner),
        }
    }

    /// Sends a refresh signal to every live subscriber of `domain_id`,
    /// returning how many received it.
    pub fn publish(&self, domain_id: &str, source: &str) -> usize {
        let signal = RefreshSignal {
            domain_id: domain_id.to_string(),
            timestamp: Utc::now(),
            source: source.to_string(),
        };

        let mut subs = self.inner.lock().unwrap();
        let Some(senders) = subs.by_domain.get_mut(domain_id) else {
            trace!(domain_id, "no subscribers for refresh");
            return 0;
        };

        // A closed receiver means its Subscription is mid-drop; skip it.
        senders.retain(|(_, tx)| !tx.is_closed());
        let delivered = senders
            .iter()
            .filter(|(_, tx)| tx.send(signal.clone()).is_ok())
            .count();

        trace!(domain_id, delivered, "published refresh");
        delivered
    }

    /// Number of live subscriptions for `domain_id`.
    pub fn subscriber_count(&self, domain_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .by_domain
            .get(domain_id)
            .map_or(0, Vec::len)
    }
}

/// A live subscription to one domain's refresh signals. Unsubscribes when
/// dropped.
pub struct Subscription {
    id: u64,
    domain_id: String,
    rx: mpsc::UnboundedReceiver<RefreshSignal>,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn domain_id(&self) -> &str {
        &self.domain_id
    }

    /// Waits for the next signal. Returns `None` only once the notifier and
    /// all its clones are gone.
    pub async fn recv(&mut self) -> Option<RefreshSignal> {
        self.rx.recv().await
    }

    /// Returns a signal if one is already queued.
    pub fn try_recv(&mut self) -> Option<RefreshSignal> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return;
        };
        let mut subs = subscribers.lock().unwrap();
        if let Some(senders) = subs.by_domain.get_mut(&self.domain_id) {
            senders.retain(|(id, _)| *id != self.id);
            if senders.is_empty() {
                subs.by_domain.remove(&self.domain_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_is_domain_scoped() {
        let notifier = Notifier::new();
        let mut a = notifier.subscribe("1");
        let mut b = notifier.subscribe("2");

        assert_eq!(notifier.publish("1", "test"), 1);

        let signal = a.recv().await.unwrap();
        assert_eq!(signal.domain_id, "1");
        assert_eq!(signal.source, "test");
        assert!(b.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_repeated_publish_reaches_every_subscriber() {
        let notifier = Notifier::new();
        let mut first = notifier.subscribe("7");
        let mut second = notifier.subscribe("7");

        assert_eq!(notifier.publish("7", "test"), 2);
        assert_eq!(notifier.publish("7", "test"), 2);

        for sub in [&mut first, &mut second] {
            assert!(sub.try_recv().is_some());
            assert!(sub.try_recv().is_some());
            assert!(sub.try_recv().is_none());
        }
    }

    #[test]
    fn test_drop_unsubscribes() {
        let notifier = Notifier::new();
        let sub = notifier.subscribe("3");
        let other = notifier.subscribe("3");
        assert_eq!(notifier.subscriber_count("3"), 2);

        drop(sub);
        assert_eq!(notifier.subscriber_count("3"), 1);

        other.unsubscribe();
        assert_eq!(notifier.subscriber_count("3"), 0);
        assert_eq!(notifier.publish("3", "test"), 0);
    }

    #[tokio::test]
    async fn test_recv_ends_with_notifier() {
        let notifier = Notifier::new();
        let mut sub = notifier.subscribe("9");

        drop(notifier);
        assert!(sub.recv().await.is_none());
    }
}
