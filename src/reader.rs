//! Reader task: the single reader of the transport and the dispatcher.
//!
//! The reader decodes frames and routes them:
//!
//! ```text
//!                        ┌─► subscription queue (MESSAGE, by `subscription`)
//! Transport ─► Reader ───┼─► receipt waiter     (RECEIPT / ERROR, by `receipt-id`)
//!                        └─► catch-all queue    (everything else)
//! ```
//!
//! It runs until the connection is disconnected, the broker sends a fatal
//! ERROR, or the transport fails. In the last two cases every open queue
//! receives one terminal error before it is closed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};

use crate::connection::Shared;
use crate::error::{Result, StompError};
use crate::protocol::{keys, Command, Frame, FrameBuffer, Protocol};
use crate::stats::Stats;
use crate::subscription::MessageData;
use crate::writer::WriterHandle;

/// Decodes frames from the read half of the transport.
pub(crate) struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
    stats: Arc<Stats>,
    last_read: Instant,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, protocol: Protocol, chunk_size: usize, stats: Arc<Stats>) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::new(protocol),
            chunk: vec![0u8; chunk_size.max(1)],
            stats,
            last_read: Instant::now(),
        }
    }

    pub fn set_protocol(&mut self, protocol: Protocol) {
        self.buffer.set_protocol(protocol);
    }

    /// Next frame, or `None` once the transport reports end of stream.
    ///
    /// Cancel safe: the only await point is the transport read.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let next = self.buffer.next_frame();
            let heartbeats = self.buffer.take_heartbeats();
            Stats::add(&self.stats.heartbeats_received, heartbeats);
            if let Some(frame) = next? {
                Stats::add(&self.stats.frames_read, 1);
                return Ok(Some(frame));
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.last_read = Instant::now();
            Stats::add(&self.stats.bytes_read, n as u64);
            self.buffer.extend(&self.chunk[..n]);
        }
    }

    /// Time since the transport last delivered any byte.
    pub fn idle(&self) -> Duration {
        self.last_read.elapsed()
    }

    pub fn mark_active(&mut self) {
        self.last_read = Instant::now();
    }
}

/// Why the dispatch loop stopped.
enum Stop {
    /// Local Disconnect already tore the connection down.
    Disconnected,
    /// A failure every open queue must hear about.
    Failed(StompError),
    /// Broker sent a connection-fatal ERROR.
    BrokerClosed(StompError),
}

/// The dispatch loop. Exactly one runs per connection.
pub(crate) struct Dispatcher<R> {
    reader: FrameReader<R>,
    shared: Arc<Shared>,
    writer: WriterHandle,
    writer_failure: oneshot::Receiver<StompError>,
    protocol: Protocol,
    /// Negotiated receive heartbeat interval scaled by the tolerance.
    heartbeat_deadline: Option<Duration>,
}

impl<R: AsyncRead + Unpin> Dispatcher<R> {
    pub fn new(
        reader: FrameReader<R>,
        shared: Arc<Shared>,
        writer: WriterHandle,
        writer_failure: oneshot::Receiver<StompError>,
        protocol: Protocol,
        heartbeat_deadline: Option<Duration>,
    ) -> Self {
        Self {
            reader,
            shared,
            writer,
            writer_failure,
            protocol,
            heartbeat_deadline,
        }
    }

    pub async fn run(mut self) {
        let stop = self.dispatch_loop().await;
        let terminal = match stop {
            Stop::Disconnected => {
                tracing::debug!("Reader stopped after disconnect");
                return;
            }
            Stop::Failed(e) => {
                tracing::error!("Reader loop error: {}", e);
                e
            }
            Stop::BrokerClosed(e) => {
                tracing::warn!("Broker closed the connection: {}", e);
                e
            }
        };

        if self.shared.mark_disconnected() {
            self.shared.close_queues(Some(terminal));
        }
        self.writer.shutdown().await;
    }

    async fn dispatch_loop(&mut self) -> Stop {
        let mut watch_writer = true;
        let check_every = self
            .heartbeat_deadline
            .map(|d| (d / 2).max(Duration::from_millis(10)))
            .unwrap_or(Duration::from_secs(3600));
        let mut watchdog = tokio::time::interval(check_every);
        watchdog.tick().await;

        loop {
            tokio::select! {
                next = self.reader.next_frame() => {
                    let frame = match next {
                        Ok(Some(frame)) => frame,
                        Ok(None) => return self.stop_with(StompError::ConnectionClosed),
                        Err(e) => return self.stop_with(e),
                    };
                    if let Some(fatal) = self.dispatch(frame).await {
                        return Stop::BrokerClosed(fatal);
                    }
                }
                failed = &mut self.writer_failure, if watch_writer => {
                    match failed {
                        Ok(e) => return self.stop_with(e),
                        Err(_) => watch_writer = false,
                    }
                }
                _ = watchdog.tick(), if self.heartbeat_deadline.is_some() => {
                    self.check_heartbeat();
                }
            }
        }
    }

    fn stop_with(&self, error: StompError) -> Stop {
        if self.shared.is_connected() {
            Stop::Failed(error)
        } else {
            Stop::Disconnected
        }
    }

    fn check_heartbeat(&mut self) {
        let Some(deadline) = self.heartbeat_deadline else {
            return;
        };
        let idle = self.reader.idle();
        if idle > deadline {
            tracing::warn!("No data from broker for {:?} (deadline {:?})", idle, deadline);
            Stats::add(&self.shared.stats.missed_heartbeats, 1);
            self.reader.mark_active();
        }
    }

    /// Route one frame. Returns an error if the frame ends the connection.
    async fn dispatch(&mut self, frame: Frame) -> Option<StompError> {
        match frame.command {
            Command::Message => {
                let target = frame
                    .header(keys::SUBSCRIPTION)
                    .and_then(|id| self.shared.registry.lock().sender_for(id));
                self.deliver(target, MessageData::message(frame)).await;
                None
            }
            Command::Receipt => {
                let waiter = frame
                    .header(keys::RECEIPT_ID)
                    .and_then(|id| self.shared.registry.lock().take_receipt(id));
                let md = MessageData::message(frame);
                match waiter {
                    Some(waiter) => {
                        if let Err(md) = waiter.send(md) {
                            self.deliver(None, md).await;
                        }
                    }
                    None => self.deliver(None, md).await,
                }
                None
            }
            Command::Error => {
                let md = MessageData::broker_error(frame.clone());
                let fatal = self
                    .protocol
                    .rules()
                    .error_is_fatal
                    .then(|| StompError::BrokerError(frame.error_message()));

                let waiter = frame
                    .header(keys::RECEIPT_ID)
                    .and_then(|id| self.shared.registry.lock().take_receipt(id));
                let md = match waiter {
                    Some(waiter) => match waiter.send(md) {
                        Ok(()) => return fatal,
                        Err(md) => md,
                    },
                    None => md,
                };
                let target = frame
                    .header(keys::SUBSCRIPTION)
                    .and_then(|id| self.shared.registry.lock().sender_for(id));
                self.deliver(target, md).await;
                fatal
            }
            other => {
                tracing::warn!("Unexpected {} frame from broker", other);
                self.deliver(None, MessageData::message(frame)).await;
                None
            }
        }
    }

    /// Deliver to `target`, or to the catch-all when there is no target or
    /// its receiver is gone.
    async fn deliver(&mut self, target: Option<mpsc::Sender<MessageData>>, md: MessageData) {
        let md = match target {
            Some(tx) => match tx.send(md).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(md)) => {
                    tracing::debug!("Subscription queue dropped, using catch-all");
                    md
                }
            },
            None => md,
        };

        let catch_all = self.shared.registry.lock().catch_all();
        match catch_all {
            Some(tx) => {
                if let Err(mpsc::error::SendError(md)) = tx.send(md).await {
                    tracing::warn!("Catch-all queue dropped, discarding {:?}", md.command());
                }
            }
            None => tracing::warn!("Connection closed, discarding inbound frame"),
        }
    }
}
