//! Subscription registry: maps subscription ids to delivery queues.
//!
//! The registry also owns the catch-all sender and the receipt waiters, so
//! that teardown can close every delivery path in one step under one lock.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::new(catch_all_tx);
//! let queue = registry.register("sub-1", "/queue/a", "auto", 100)?;
//! let tx = registry.sender_for("sub-1").unwrap();
//! ```

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use super::queue::{DeliveryQueue, MessageData};
use crate::error::{Result, StompError};

/// An active subscription.
#[derive(Debug)]
pub(crate) struct SubscriptionEntry {
    pub destination: String,
    pub ack: String,
    tx: mpsc::Sender<MessageData>,
}

/// Every delivery path a closed registry held.
pub(crate) struct Drained {
    pub senders: Vec<mpsc::Sender<MessageData>>,
    pub catch_all: Option<mpsc::Sender<MessageData>>,
}

/// Registry of subscriptions, receipt waiters and the catch-all queue.
pub(crate) struct Registry {
    subscriptions: HashMap<String, SubscriptionEntry>,
    receipts: HashMap<String, oneshot::Sender<MessageData>>,
    catch_all: Option<mpsc::Sender<MessageData>>,
}

impl Registry {
    pub fn new(catch_all: mpsc::Sender<MessageData>) -> Self {
        Self {
            subscriptions: HashMap::new(),
            receipts: HashMap::new(),
            catch_all: Some(catch_all),
        }
    }

    /// True once [`drain`](Self::drain) ran.
    pub fn is_closed(&self) -> bool {
        self.catch_all.is_none()
    }

    /// Register a subscription and create its queue.
    pub fn register(
        &mut self,
        id: &str,
        destination: &str,
        ack: &str,
        capacity: usize,
    ) -> Result<DeliveryQueue> {
        if self.is_closed() {
            return Err(StompError::NotConnected);
        }
        if self.subscriptions.contains_key(id) {
            return Err(StompError::DuplicateSubscription(id.to_string()));
        }

        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscriptions.insert(
            id.to_string(),
            SubscriptionEntry {
                destination: destination.to_string(),
                ack: ack.to_string(),
                tx,
            },
        );
        Ok(DeliveryQueue::new(id, rx))
    }

    /// Remove a subscription. Dropping its sender closes the queue.
    pub fn remove(&mut self, id: &str) -> Option<SubscriptionEntry> {
        self.subscriptions.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.subscriptions.contains_key(id)
    }

    /// Id of the single subscription on `destination`.
    ///
    /// Ambiguous when more than one subscription shares the destination.
    pub fn id_for_destination(&self, destination: &str) -> Option<String> {
        let mut matches = self
            .subscriptions
            .iter()
            .filter(|(_, e)| e.destination == destination)
            .map(|(id, _)| id);
        match (matches.next(), matches.next()) {
            (Some(id), None) => Some(id.clone()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SubscriptionEntry)> {
        self.subscriptions.iter().map(|(id, e)| (id.as_str(), e))
    }

    /// Sender for a subscription's queue.
    pub fn sender_for(&self, id: &str) -> Option<mpsc::Sender<MessageData>> {
        self.subscriptions.get(id).map(|e| e.tx.clone())
    }

    pub fn catch_all(&self) -> Option<mpsc::Sender<MessageData>> {
        self.catch_all.clone()
    }

    /// Register a waiter for a RECEIPT with `receipt_id`.
    pub fn await_receipt(&mut self, receipt_id: &str) -> oneshot::Receiver<MessageData> {
        let (tx, rx) = oneshot::channel();
        self.receipts.insert(receipt_id.to_string(), tx);
        rx
    }

    pub fn take_receipt(&mut self, receipt_id: &str) -> Option<oneshot::Sender<MessageData>> {
        self.receipts.remove(receipt_id)
    }

    /// Close the registry and hand back every delivery path.
    ///
    /// Receipt waiters are dropped, which wakes them with an error.
    pub fn drain(&mut self) -> Drained {
        self.receipts.clear();
        Drained {
            senders: self.subscriptions.drain().map(|(_, e)| e.tx).collect(),
            catch_all: self.catch_all.take(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (Registry, mpsc::Receiver<MessageData>) {
        let (tx, rx) = mpsc::channel(8);
        (Registry::new(tx), rx)
    }

    #[test]
    fn test_register_and_lookup() {
        let (mut registry, _rx) = registry();
        let queue = registry.register("s1", "/queue/a", "auto", 10).unwrap();

        assert_eq!(queue.id(), "s1");
        assert!(registry.contains("s1"));
        assert!(registry.sender_for("s1").is_some());
        assert!(registry.sender_for("s2").is_none());
        let (id, entry) = registry.iter().next().unwrap();
        assert_eq!((id, entry.ack.as_str()), ("s1", "auto"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (mut registry, _rx) = registry();
        registry.register("s1", "/queue/a", "auto", 10).unwrap();
        assert!(matches!(
            registry.register("s1", "/queue/b", "auto", 10),
            Err(StompError::DuplicateSubscription(_))
        ));
        assert_eq!(registry.iter().count(), 1);
        assert_eq!(registry.iter().next().unwrap().1.destination, "/queue/a");
    }

    #[test]
    fn test_id_reusable_after_remove() {
        let (mut registry, _rx) = registry();
        registry.register("s1", "/queue/a", "auto", 10).unwrap();
        assert!(registry.remove("s1").is_some());
        assert!(registry.register("s1", "/queue/a", "auto", 10).is_ok());
    }

    #[tokio::test]
    async fn test_remove_closes_queue() {
        let (mut registry, _rx) = registry();
        let queue = registry.register("s1", "/queue/a", "auto", 10).unwrap();
        registry
            .sender_for("s1")
            .unwrap()
            .send(MessageData::error(StompError::ConnectionClosed))
            .await
            .unwrap();

        registry.remove("s1");
        assert!(queue.recv().await.unwrap().is_error());
        assert!(queue.recv().await.is_none());
    }

    #[test]
    fn test_id_for_destination() {
        let (mut registry, _rx) = registry();
        registry.register("s1", "/queue/a", "auto", 10).unwrap();
        registry.register("s2", "/queue/b", "auto", 10).unwrap();
        registry.register("s3", "/queue/b", "auto", 10).unwrap();

        assert_eq!(registry.id_for_destination("/queue/a").as_deref(), Some("s1"));
        assert_eq!(registry.id_for_destination("/queue/b"), None);
        assert_eq!(registry.id_for_destination("/queue/c"), None);
    }

    #[tokio::test]
    async fn test_drain_closes_everything() {
        let (mut registry, _rx) = registry();
        registry.register("s1", "/queue/a", "auto", 10).unwrap();
        let receipt = registry.await_receipt("r1");

        let drained = registry.drain();
        assert_eq!(drained.senders.len(), 1);
        assert!(drained.catch_all.is_some());
        assert!(registry.is_closed());
        assert!(receipt.await.is_err());
        assert!(matches!(
            registry.register("s2", "/queue/a", "auto", 10),
            Err(StompError::NotConnected)
        ));
    }
}
