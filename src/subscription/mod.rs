//! Subscriptions: Subscribe, Unsubscribe and the per-subscription queues.
//!
//! Each active subscription owns one bounded [`DeliveryQueue`]. The
//! dispatcher pushes MESSAGE frames to the queue named by their
//! `subscription` header, in wire order.

mod queue;
mod registry;

pub use queue::{DeliveryQueue, MessageData};
pub(crate) use registry::Registry;

use crate::connection::Connection;
use crate::error::{Result, StompError};
use crate::protocol::{keys, Command, Headers};
use crate::util;

/// Snapshot of one active subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: String,
    pub destination: String,
    pub ack: String,
}

impl Connection {
    /// Subscribe to a destination.
    ///
    /// Uses the `id` header, or generates one and appends it. The queue is
    /// returned once SUBSCRIBE was written; the broker does not confirm.
    pub async fn subscribe<'a>(
        &self,
        headers: impl Into<Option<&'a Headers>>,
    ) -> Result<DeliveryQueue> {
        let mut headers = self.check(Command::Subscribe, headers.into())?.clone();
        let id = match headers.non_empty(keys::ID) {
            Some(id) => id.to_string(),
            None => {
                let id = util::uuid();
                headers.delete(keys::ID);
                headers.push(keys::ID, id.as_str());
                id
            }
        };
        let destination = headers.value(keys::DESTINATION).unwrap_or_default();
        let ack = headers.non_empty(keys::ACK).unwrap_or("auto");

        let queue = self.shared.registry.lock().register(
            &id,
            destination,
            ack,
            self.config.subscription_capacity,
        )?;

        if let Err(e) = self.write_frame(Command::Subscribe, &headers, b"").await {
            self.shared.registry.lock().remove(&id);
            return Err(e);
        }
        tracing::debug!("Subscribed {} to {}", id, destination);
        Ok(queue)
    }

    /// Cancel a subscription and close its queue.
    ///
    /// Items already queued can still be drained. On 1.0 the subscription
    /// may be named by `destination` alone.
    pub async fn unsubscribe<'a>(&self, headers: impl Into<Option<&'a Headers>>) -> Result<()> {
        let headers = self.check(Command::Unsubscribe, headers.into())?;
        let id = match headers.non_empty(keys::ID) {
            Some(id) => id.to_string(),
            None => {
                let destination = headers.value(keys::DESTINATION).unwrap_or_default();
                self.shared
                    .registry
                    .lock()
                    .id_for_destination(destination)
                    .ok_or_else(|| StompError::UnknownSubscription(destination.to_string()))?
            }
        };
        if !self.shared.registry.lock().contains(&id) {
            return Err(StompError::UnknownSubscription(id));
        }

        self.write_frame(Command::Unsubscribe, headers, b"").await?;
        self.shared.registry.lock().remove(&id);
        tracing::debug!("Unsubscribed {}", id);
        Ok(())
    }

    /// Active subscriptions, in no particular order.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.shared
            .registry
            .lock()
            .iter()
            .map(|(id, entry)| SubscriptionInfo {
                id: id.to_string(),
                destination: entry.destination.clone(),
                ack: entry.ack.clone(),
            })
            .collect()
    }
}
