//! Connection lifecycle: handshake, version negotiation, Send, Disconnect.
//!
//! [`ConnectionBuilder`] provides a fluent API for configuring queues and
//! timeouts. [`Connection`] manages the lifecycle:
//! 1. Validate the CONNECT headers
//! 2. Split the transport and spawn the writer task
//! 3. Send CONNECT and read until CONNECTED or ERROR
//! 4. Negotiate the protocol version and heartbeats
//! 5. Spawn the dispatcher and, if negotiated, the heartbeat sender
//!
//! # Example
//!
//! ```ignore
//! use stompwire::{Connection, Headers};
//!
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:61613").await?;
//! let conn = Connection::builder()
//!     .subscription_capacity(256)
//!     .connect(stream, &Headers::from(["accept-version", "1.2", "host", "/"]))
//!     .await?;
//!
//! conn.send(&Headers::from(["destination", "/queue/a"]), b"hello").await?;
//! conn.disconnect(&Headers::new()).await?;
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{Result, StompError};
use crate::protocol::{build_frame, keys, validate, Command, Frame, Headers, Protocol};
use crate::reader::{Dispatcher, FrameReader};
use crate::stats::{ConnectionStats, Stats};
use crate::subscription::{DeliveryQueue, MessageData, Registry};
use crate::transaction::TransactionTracker;
use crate::util;
use crate::writer::{spawn_writer_task, WriterHandle};

/// Lifecycle state of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Unconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnected = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Unconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// State shared between the connection and its dispatcher.
pub(crate) struct Shared {
    state: AtomicU8,
    pub registry: Mutex<Registry>,
    pub stats: Arc<Stats>,
}

impl Shared {
    fn new(registry: Registry, stats: Arc<Stats>) -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            registry: Mutex::new(registry),
            stats,
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Move Connected to Disconnected. Only one caller ever wins.
    pub fn mark_disconnected(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connected as u8,
                ConnectionState::Disconnected as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Close every queue, first appending `terminal` if given.
    ///
    /// Items already queued stay ahead of the terminal error.
    pub fn close_queues(&self, terminal: Option<StompError>) {
        let drained = self.registry.lock().drain();
        let Some(error) = terminal else {
            return;
        };
        for tx in drained.senders.into_iter().chain(drained.catch_all) {
            let md = MessageData::error(error.clone());
            tokio::spawn(async move {
                let _ = tx.send(md).await;
            });
        }
    }
}

/// Builder for configuring and opening a [`Connection`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionBuilder {
    config: ClientConfig,
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Capacity of each subscription delivery queue.
    ///
    /// Default: 100
    pub fn subscription_capacity(mut self, capacity: usize) -> Self {
        self.config.subscription_capacity = capacity;
        self
    }

    /// Capacity of the catch-all queue returned by
    /// [`Connection::message_data`].
    ///
    /// Default: 100
    pub fn catch_all_capacity(mut self, capacity: usize) -> Self {
        self.config.catch_all_capacity = capacity;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn writer_capacity(mut self, capacity: usize) -> Self {
        self.config.writer_capacity = capacity;
        self
    }

    /// How long Disconnect waits for a requested receipt.
    ///
    /// Default: 10 seconds
    pub fn disconnect_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.config.disconnect_receipt_timeout = timeout;
        self
    }

    /// Multiplier on the receive heartbeat interval before a heartbeat
    /// counts as missed.
    ///
    /// Default: 2.0
    pub fn heartbeat_tolerance(mut self, tolerance: f64) -> Self {
        self.config.heartbeat_tolerance = tolerance;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Perform the handshake over `transport` and start the connection.
    pub async fn connect<'a, T>(
        self,
        transport: T,
        headers: impl Into<Option<&'a Headers>>,
    ) -> Result<Connection>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Connection::start(transport, headers.into(), self.config).await
    }
}

/// A connected STOMP session.
///
/// All operations take `&self` and may be called from many tasks at once;
/// outbound frames never interleave on the wire.
pub struct Connection {
    pub(crate) shared: Arc<Shared>,
    writer: WriterHandle,
    protocol: Protocol,
    session: Option<String>,
    server: Option<String>,
    connect_response: Frame,
    heartbeats: (Duration, Duration),
    pub(crate) config: ClientConfig,
    catch_all: DeliveryQueue,
    disconnect_receipt: Mutex<Option<Frame>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) transactions: TransactionTracker,
}

impl Connection {
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Connect with the default configuration.
    pub async fn connect<'a, T>(
        transport: T,
        headers: impl Into<Option<&'a Headers>>,
    ) -> Result<Connection>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        ConnectionBuilder::new().connect(transport, headers).await
    }

    async fn start<T>(transport: T, headers: Option<&Headers>, config: ClientConfig) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        // 1. Validate before touching the transport
        let headers = validate(Command::Connect, headers, Protocol::V1_0)?;
        let requested = Protocol::parse_accept_version(headers.value(keys::ACCEPT_VERSION))?;
        let client_heartbeat = parse_heart_beat(headers.value(keys::HEART_BEAT))?;
        let highest = requested.iter().copied().max().unwrap_or(Protocol::V1_0);

        // 2. Split the transport and spawn the writer task
        let (read_half, write_half) = tokio::io::split(transport);
        let stats = Arc::new(Stats::default());
        let (failure_tx, failure_rx) = oneshot::channel();
        let (writer, _writer_task) =
            spawn_writer_task(write_half, config.writer_capacity, stats.clone(), failure_tx);
        let mut reader = FrameReader::new(read_half, highest, config.read_buffer_size, stats.clone());

        // 3. CONNECT, then wait for the broker's answer
        let response = match handshake(&writer, &mut reader, headers).await {
            Ok(frame) => frame,
            Err(e) => {
                writer.shutdown().await;
                return Err(e);
            }
        };

        // 4. Negotiate
        let negotiated = negotiate(&requested, client_heartbeat, &response);
        let (protocol, heartbeats) = match negotiated {
            Ok(n) => n,
            Err(e) => {
                writer.shutdown().await;
                return Err(e);
            }
        };
        reader.set_protocol(protocol);
        tracing::debug!(
            "Connected with protocol {} (heartbeats send {:?}, receive {:?})",
            protocol,
            heartbeats.0,
            heartbeats.1
        );

        // 5. Shared state, dispatcher and heartbeat sender
        let (catch_all_tx, catch_all_rx) = mpsc::channel(config.catch_all_capacity.max(1));
        let shared = Arc::new(Shared::new(Registry::new(catch_all_tx), stats));
        shared
            .state
            .store(ConnectionState::Connected as u8, Ordering::Release);

        let deadline = (!heartbeats.1.is_zero())
            .then(|| heartbeats.1.mul_f64(config.heartbeat_tolerance.max(1.0)));
        let dispatcher = Dispatcher::new(
            reader,
            shared.clone(),
            writer.clone(),
            failure_rx,
            protocol,
            deadline,
        );
        let mut tasks = vec![tokio::spawn(dispatcher.run())];
        if !heartbeats.0.is_zero() {
            tasks.push(spawn_heartbeat_task(writer.clone(), heartbeats.0));
        }

        Ok(Connection {
            shared,
            writer,
            protocol,
            session: response.header(keys::SESSION).map(str::to_owned),
            server: response.header(keys::SERVER).map(str::to_owned),
            connect_response: response,
            heartbeats,
            config,
            catch_all: DeliveryQueue::new("", catch_all_rx),
            disconnect_receipt: Mutex::new(None),
            tasks: Mutex::new(tasks),
            transactions: TransactionTracker::default(),
        })
    }

    /// Send DISCONNECT and tear the connection down.
    ///
    /// With a `receipt` header, waits up to the configured timeout for the
    /// matching RECEIPT before tearing down. Fails with
    /// [`StompError::NotConnected`] if the connection is already down.
    pub async fn disconnect<'a>(&self, headers: impl Into<Option<&'a Headers>>) -> Result<()> {
        let headers = self.check(Command::Disconnect, headers.into())?;
        if !self.shared.mark_disconnected() {
            return Err(StompError::NotConnected);
        }

        let receipt = headers.non_empty(keys::RECEIPT).map(str::to_owned);
        let waiter = receipt
            .as_deref()
            .map(|id| self.shared.registry.lock().await_receipt(id));

        let mut result = self.write_frame(Command::Disconnect, headers, b"").await;
        if let (true, Some(waiter), Some(id)) = (result.is_ok(), waiter, receipt) {
            let timeout = self.config.disconnect_receipt_timeout;
            result = match tokio::time::timeout(timeout, waiter).await {
                Ok(Ok(md)) => md.into_result().map(|frame| {
                    *self.disconnect_receipt.lock() = Some(frame);
                }),
                Ok(Err(_)) => Err(StompError::ConnectionClosed),
                Err(_) => Err(StompError::ReceiptTimeout(id)),
            };
        }

        self.teardown().await;
        tracing::debug!("Disconnected");
        result
    }

    async fn teardown(&self) {
        self.writer.shutdown().await;
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.shared.close_queues(None);
        self.transactions.clear();
    }

    /// Send a message to a destination and wait until it was written.
    ///
    /// A `content-length` header is added unless one is present or the
    /// `suppress-content-length` marker is set; the marker is not sent.
    pub async fn send<'a>(
        &self,
        headers: impl Into<Option<&'a Headers>>,
        body: &[u8],
    ) -> Result<()> {
        let mut headers = self.check(Command::Send, headers.into())?.clone();
        if headers.contains(keys::SUPPRESS_CONTENT_LENGTH) {
            headers.delete(keys::SUPPRESS_CONTENT_LENGTH);
        } else if !headers.contains(keys::CONTENT_LENGTH) {
            headers.push(keys::CONTENT_LENGTH, body.len().to_string());
        }
        self.write_frame(Command::Send, &headers, body).await
    }

    /// Fail fast when disconnected, then validate.
    pub(crate) fn check<'h>(
        &self,
        command: Command,
        headers: Option<&'h Headers>,
    ) -> Result<&'h Headers> {
        if !self.connected() {
            return Err(StompError::NotConnected);
        }
        validate(command, headers, self.protocol)
    }

    pub(crate) async fn write_frame(
        &self,
        command: Command,
        headers: &Headers,
        body: &[u8],
    ) -> Result<()> {
        self.writer
            .send(build_frame(command, headers, body, self.protocol))
            .await
    }

    /// True while the connection is usable.
    pub fn connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Negotiated protocol version.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The `session` header of the CONNECTED frame.
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// The `server` header of the CONNECTED frame.
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// The full CONNECTED frame.
    pub fn connect_response(&self) -> &Frame {
        &self.connect_response
    }

    /// Negotiated `(send, receive)` heartbeat intervals; zero means off.
    pub fn heartbeats(&self) -> (Duration, Duration) {
        self.heartbeats
    }

    pub fn stats(&self) -> ConnectionStats {
        self.shared.stats.snapshot()
    }

    /// Catch-all queue: broker frames not routed to a subscription or a
    /// receipt waiter, plus the terminal error when the connection fails.
    pub fn message_data(&self) -> &DeliveryQueue {
        &self.catch_all
    }

    /// The RECEIPT that answered a DISCONNECT, if one was requested.
    pub fn disconnect_receipt(&self) -> Option<Frame> {
        self.disconnect_receipt.lock().clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// Send CONNECT and read until CONNECTED or ERROR.
async fn handshake<R>(
    writer: &WriterHandle,
    reader: &mut FrameReader<R>,
    headers: &Headers,
) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    writer
        .send(build_frame(Command::Connect, headers, b"", Protocol::V1_0))
        .await?;

    loop {
        let frame = reader.next_frame().await?.ok_or(StompError::ConnectionClosed)?;
        match frame.command {
            Command::Connected => return Ok(frame),
            Command::Error => {
                return Err(StompError::ConnectRejected {
                    message: frame.error_message(),
                    frame: Box::new(frame),
                })
            }
            other => tracing::warn!("Ignoring {} frame before CONNECTED", other),
        }
    }
}

/// Pick the protocol version and heartbeat intervals from CONNECTED.
fn negotiate(
    requested: &[Protocol],
    client_heartbeat: (u64, u64),
    response: &Frame,
) -> Result<(Protocol, (Duration, Duration))> {
    let protocol = match response.header(keys::VERSION) {
        None => Protocol::V1_0,
        Some(v) => v
            .trim()
            .parse::<Protocol>()
            .ok()
            .filter(|p| requested.contains(p))
            .ok_or_else(|| StompError::UnsupportedServerVersion(v.to_string()))?,
    };

    let heartbeats = if protocol.rules().heartbeats {
        let server = parse_heart_beat(response.header(keys::HEART_BEAT))?;
        heartbeat_intervals(client_heartbeat, server)
    } else {
        (Duration::ZERO, Duration::ZERO)
    };
    Ok((protocol, heartbeats))
}

/// Parse a `heart-beat: x,y` value in milliseconds. Absent means `0,0`.
fn parse_heart_beat(value: Option<&str>) -> Result<(u64, u64)> {
    let Some(value) = value else {
        return Ok((0, 0));
    };
    let invalid = || StompError::InvalidHeartBeat(value.to_string());
    let (x, y) = value.split_once(',').ok_or_else(invalid)?;
    let x = x.trim().parse::<u64>().map_err(|_| invalid())?;
    let y = y.trim().parse::<u64>().map_err(|_| invalid())?;
    Ok((x, y))
}

/// Combine the client's `cx,cy` with the server's `sx,sy`.
///
/// Returns `(send, receive)`; zero disables that direction.
fn heartbeat_intervals(client: (u64, u64), server: (u64, u64)) -> (Duration, Duration) {
    let (cx, cy) = client;
    let (sx, sy) = server;
    let send = if cx == 0 || sy == 0 { 0 } else { util::max(cx, sy) };
    let receive = if cy == 0 || sx == 0 { 0 } else { util::max(cy, sx) };
    (Duration::from_millis(send), Duration::from_millis(receive))
}

fn spawn_heartbeat_task(writer: WriterHandle, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !writer.heartbeat() && writer.is_closed() {
                tracing::debug!("Heartbeat sender stopped");
                return;
            }
        }
    })
}
