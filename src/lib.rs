//! # stompwire
//!
//! Async client engine for the STOMP 1.0, 1.1 and 1.2 messaging protocol.
//!
//! The caller supplies any connected duplex byte stream (`AsyncRead +
//! AsyncWrite`, e.g. a `TcpStream` or a TLS stream); this crate performs the
//! handshake, negotiates the protocol version, and runs two tasks per
//! connection:
//!
//! - **Writer**: the single write path, so concurrent sends never interleave
//! - **Dispatcher**: the single reader, routing MESSAGE frames to their
//!   subscription queue and RECEIPT/ERROR frames to waiters
//!
//! ## Example
//!
//! ```ignore
//! use stompwire::{Connection, Headers};
//!
//! #[tokio::main]
//! async fn main() -> stompwire::Result<()> {
//!     let stream = tokio::net::TcpStream::connect("127.0.0.1:61613").await?;
//!     let conn = Connection::connect(
//!         stream,
//!         &Headers::from(["accept-version", "1.1,1.2", "host", "/"]),
//!     )
//!     .await?;
//!
//!     let queue = conn.subscribe(&Headers::from(["destination", "/queue/a"])).await?;
//!     conn.send(&Headers::from(["destination", "/queue/a"]), b"hello").await?;
//!
//!     if let Some(md) = queue.recv().await {
//!         let frame = md.into_result()?;
//!         println!("{:?}", frame.body_str());
//!     }
//!
//!     conn.disconnect(&Headers::new()).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod subscription;
pub mod util;

mod connection;
mod reader;
mod stats;
mod transaction;
mod writer;

pub use config::ClientConfig;
pub use connection::{Connection, ConnectionBuilder, ConnectionState};
pub use error::{Result, StompError};
pub use protocol::{Command, Frame, Headers, Protocol};
pub use stats::ConnectionStats;
pub use subscription::{DeliveryQueue, MessageData, SubscriptionInfo};
