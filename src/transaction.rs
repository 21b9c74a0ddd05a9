//! Transactions and acknowledgements.

use std::collections::HashSet;
use std::future::Future;

use parking_lot::Mutex;

use crate::connection::Connection;
use crate::error::{Result, StompError};
use crate::protocol::{keys, Command, Headers};

/// Ids of transactions begun and not yet committed or aborted.
#[derive(Debug, Default)]
pub(crate) struct TransactionTracker {
    open: Mutex<HashSet<String>>,
}

impl TransactionTracker {
    /// Mark `id` open. Fails if it already is.
    pub fn open(&self, id: &str) -> Result<()> {
        if self.open.lock().insert(id.to_string()) {
            Ok(())
        } else {
            Err(StompError::TransactionOpen(id.to_string()))
        }
    }

    /// Mark `id` closed. Fails if it was not open.
    pub fn close(&self, id: &str) -> Result<()> {
        if self.open.lock().remove(id) {
            Ok(())
        } else {
            Err(StompError::TransactionNotOpen(id.to_string()))
        }
    }

    /// Open `id` around `write`; a failed write leaves it closed.
    pub async fn open_while<F>(&self, id: &str, write: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        self.open(id)?;
        if let Err(e) = write.await {
            let _ = self.close(id);
            return Err(e);
        }
        Ok(())
    }

    /// Close `id` around `write`; a failed write leaves it open.
    pub async fn close_while<F>(&self, id: &str, write: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        self.close(id)?;
        if let Err(e) = write.await {
            let _ = self.open(id);
            return Err(e);
        }
        Ok(())
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.open.lock().contains(id)
    }

    pub fn clear(&self) {
        self.open.lock().clear();
    }
}

impl Connection {
    /// Begin a transaction named by the `transaction` header.
    pub async fn begin<'a>(&self, headers: impl Into<Option<&'a Headers>>) -> Result<()> {
        let headers = self.check(Command::Begin, headers.into())?;
        self.transactions
            .open_while(
                transaction_id(headers),
                self.write_frame(Command::Begin, headers, b""),
            )
            .await
    }

    /// Commit an open transaction.
    pub async fn commit<'a>(&self, headers: impl Into<Option<&'a Headers>>) -> Result<()> {
        self.finish(Command::Commit, headers.into()).await
    }

    /// Abort an open transaction.
    pub async fn abort<'a>(&self, headers: impl Into<Option<&'a Headers>>) -> Result<()> {
        self.finish(Command::Abort, headers.into()).await
    }

    async fn finish(&self, command: Command, headers: Option<&Headers>) -> Result<()> {
        let headers = self.check(command, headers)?;
        self.transactions
            .close_while(transaction_id(headers), self.write_frame(command, headers, b""))
            .await
    }

    /// Whether a transaction begun on this connection is still open.
    pub fn in_transaction(&self, id: &str) -> bool {
        self.transactions.is_open(id)
    }

    /// Acknowledge a message. Required headers depend on the protocol
    /// version: `message-id` (1.0), `message-id` and `subscription` (1.1),
    /// `id` (1.2).
    pub async fn ack<'a>(&self, headers: impl Into<Option<&'a Headers>>) -> Result<()> {
        let headers = self.check(Command::Ack, headers.into())?;
        self.write_frame(Command::Ack, headers, b"").await
    }

    /// Reject a message. Not available on 1.0.
    pub async fn nack<'a>(&self, headers: impl Into<Option<&'a Headers>>) -> Result<()> {
        let headers = self.check(Command::Nack, headers.into())?;
        self.write_frame(Command::Nack, headers, b"").await
    }
}

fn transaction_id(headers: &Headers) -> &str {
    headers.value(keys::TRANSACTION).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close() {
        let tracker = TransactionTracker::default();
        tracker.open("tx1").unwrap();
        assert!(tracker.is_open("tx1"));
        assert!(matches!(tracker.open("tx1"), Err(StompError::TransactionOpen(id)) if id == "tx1"));

        tracker.close("tx1").unwrap();
        assert!(!tracker.is_open("tx1"));
        assert!(matches!(tracker.close("tx1"), Err(StompError::TransactionNotOpen(_))));

        // Ids are reusable once closed.
        tracker.open("tx1").unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_restores_state() {
        let tracker = TransactionTracker::default();
        let failed = async { Err(StompError::ConnectionClosed) };
        assert!(matches!(
            tracker.open_while("tx1", failed).await,
            Err(StompError::ConnectionClosed)
        ));
        assert!(!tracker.is_open("tx1"));

        tracker.open_while("tx1", async { Ok(()) }).await.unwrap();
        let failed = async { Err(StompError::ConnectionClosed) };
        assert!(matches!(
            tracker.close_while("tx1", failed).await,
            Err(StompError::ConnectionClosed)
        ));
        // Still open, so a retried COMMIT or ABORT is accepted.
        assert!(tracker.is_open("tx1"));

        tracker.close_while("tx1", async { Ok(()) }).await.unwrap();
        assert!(!tracker.is_open("tx1"));
        assert!(matches!(
            tracker.close_while("tx1", async { Ok(()) }).await,
            Err(StompError::TransactionNotOpen(_))
        ));
    }

    #[test]
    fn test_clear() {
        let tracker = TransactionTracker::default();
        tracker.open("a").unwrap();
        tracker.open("b").unwrap();
        tracker.clear();
        assert!(!tracker.is_open("a"));
        assert!(!tracker.is_open("b"));
    }
}
