//! Dedicated writer task: the single write path to the transport.
//!
//! Every outbound frame from every caller goes through one mpsc channel into
//! one task that owns the transport's write half, so the bytes of two frames
//! can never interleave on the wire.
//!
//! # Architecture
//!
//! ```text
//! Send        ─┐
//! Subscribe   ─┼─► mpsc::Sender<WriterCommand> ─► Writer Task ─► Transport
//! Heartbeats  ─┘
//! ```
//!
//! Frames ready at the same time are batched into one vectored write. Each
//! frame may carry a oneshot that is completed once its bytes were flushed.

use std::io::IoSlice;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, StompError};
use crate::stats::Stats;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// An encoded frame ready to be written.
#[derive(Debug)]
pub struct OutboundFrame {
    pub bytes: Bytes,
    /// Completed with the write result once the frame was flushed.
    done: Option<oneshot::Sender<Result<()>>>,
    heartbeat: bool,
}

impl OutboundFrame {
    /// A frame whose caller does not wait for completion.
    pub fn new(bytes: Bytes) -> Self {
        Self {
            bytes,
            done: None,
            heartbeat: false,
        }
    }

    fn heartbeat() -> Self {
        Self {
            bytes: Bytes::from_static(b"\n"),
            done: None,
            heartbeat: true,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Messages understood by the writer task.
#[derive(Debug)]
enum WriterCommand {
    Frame(OutboundFrame),
    /// Flush, shut the transport down and exit.
    Shutdown(oneshot::Sender<()>),
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable and shared by the connection, the heartbeat task and
/// the reader.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriterCommand>,
}

impl WriterHandle {
    /// Write a frame and wait until it has been flushed to the transport.
    pub async fn send(&self, bytes: Bytes) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let frame = OutboundFrame {
            bytes,
            done: Some(done_tx),
            heartbeat: false,
        };
        self.tx
            .send(WriterCommand::Frame(frame))
            .await
            .map_err(|_| StompError::ConnectionClosed)?;
        done_rx.await.map_err(|_| StompError::ConnectionClosed)?
    }

    /// Queue a frame without waiting for it to be written.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .try_send(WriterCommand::Frame(frame))
            .map_err(|_| StompError::ConnectionClosed)
    }

    /// Queue a heartbeat EOL. Dropped silently when the queue is full,
    /// since pending frames keep the connection alive anyway.
    pub fn heartbeat(&self) -> bool {
        self.try_send(OutboundFrame::heartbeat()).is_ok()
    }

    /// Ask the writer to flush and shut the transport down, and wait for it.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// If a write fails the error is reported once on `failure` and the task
/// exits; later sends fail with [`StompError::ConnectionClosed`].
pub(crate) fn spawn_writer_task<W>(
    writer: W,
    capacity: usize,
    stats: Arc<Stats>,
    failure: oneshot::Sender<StompError>,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(async move {
        let result = writer_loop(rx, writer, &stats).await;
        if let Err(e) = &result {
            tracing::error!("Writer loop error: {}", e);
            let _ = failure.send(e.clone());
        }
        result
    });
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<WriterCommand>,
    mut writer: W,
    stats: &Stats,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(WriterCommand::Frame(f)) => f,
            Some(WriterCommand::Shutdown(ack)) => {
                let _ = writer.shutdown().await;
                let _ = ack.send(());
                return Ok(());
            }
            // Every handle dropped.
            None => {
                let _ = writer.shutdown().await;
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        let mut shutdown = None;
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(WriterCommand::Frame(frame)) => batch.push(frame),
                Ok(WriterCommand::Shutdown(ack)) => {
                    shutdown = Some(ack);
                    break;
                }
                Err(_) => break,
            }
        }

        let result = write_batch(&mut writer, &batch).await;
        record(stats, &batch);
        for frame in &mut batch {
            if let Some(done) = frame.done.take() {
                let _ = done.send(result.clone());
            }
        }
        result?;

        if let Some(ack) = shutdown {
            let _ = writer.shutdown().await;
            let _ = ack.send(());
            return Ok(());
        }
    }
}

fn record(stats: &Stats, batch: &[OutboundFrame]) {
    for frame in batch {
        if frame.heartbeat {
            Stats::add(&stats.heartbeats_sent, 1);
        } else {
            Stats::add(&stats.frames_written, 1);
        }
        Stats::add(&stats.bytes_written, frame.size() as u64);
    }
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    if total_size == 0 {
        return Ok(());
    }

    let mut total_written = 0;
    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )
            .into());
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after a partial write.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.size();
        if skip_bytes < end && !frame.bytes.is_empty() {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.bytes[start..]));
        }
        offset = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    fn spawn(
        writer: tokio::io::DuplexStream,
    ) -> (WriterHandle, JoinHandle<Result<()>>, oneshot::Receiver<StompError>) {
        let (fail_tx, fail_rx) = oneshot::channel();
        let (handle, task) = spawn_writer_task(writer, 16, Arc::new(Stats::default()), fail_tx);
        (handle, task, fail_rx)
    }

    #[tokio::test]
    async fn test_send_waits_for_flush() {
        let (client, mut server) = duplex(4096);
        let (handle, _task, _fail) = spawn(client);

        handle.send(Bytes::from_static(b"SEND\n\nhi\0")).await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"SEND\n\nhi\0");
    }

    #[tokio::test]
    async fn test_frames_keep_order() {
        let (client, mut server) = duplex(64 * 1024);
        let (handle, _task, _fail) = spawn(client);

        for i in 0..10u8 {
            handle.try_send(OutboundFrame::new(Bytes::from(vec![b'a' + i]))).unwrap();
        }
        handle.send(Bytes::from_static(b"!")).await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"abcdefghij!");
    }

    #[tokio::test]
    async fn test_heartbeat_is_single_eol() {
        let (client, mut server) = duplex(4096);
        let (handle, _task, _fail) = spawn(client);

        assert!(handle.heartbeat());
        handle.send(Bytes::from_static(b"X")).await.unwrap();

        let mut buf = vec![0u8; 8];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"\nX");
    }

    #[tokio::test]
    async fn test_shutdown_closes_transport() {
        let (client, mut server) = duplex(4096);
        let (handle, task, _fail) = spawn(client);

        handle.shutdown().await;
        assert!(task.await.unwrap().is_ok());

        let mut buf = vec![0u8; 8];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
        assert!(matches!(
            handle.send(Bytes::from_static(b"late")).await,
            Err(StompError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_write_failure_reported() {
        let (client, server) = duplex(16);
        drop(server);
        let (handle, task, fail) = spawn(client);

        let result = handle.send(Bytes::from_static(b"SEND\n\n\0")).await;
        assert!(matches!(result, Err(StompError::Io(_))));
        assert!(matches!(
            tokio::time::timeout(Duration::from_secs(1), fail).await,
            Ok(Ok(StompError::Io(_)))
        ));
        assert!(task.await.unwrap().is_err());
    }

    #[test]
    fn test_build_remaining_slices() {
        let batch = vec![
            OutboundFrame::new(Bytes::from_static(b"hello")),
            OutboundFrame::new(Bytes::from_static(b"world")),
        ];

        assert_eq!(build_remaining_slices(&batch, 0).len(), 2);

        let partial = build_remaining_slices(&batch, 3);
        assert_eq!(partial.len(), 2);
        assert_eq!(&*partial[0], b"lo");

        let second_only = build_remaining_slices(&batch, 5);
        assert_eq!(second_only.len(), 1);
        assert_eq!(&*second_only[0], b"world");
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5)
            .map(|_| OutboundFrame::new(Bytes::from_static(b"abc")))
            .collect();

        write_batch(&mut buf, &batch).await.unwrap();
        assert_eq!(buf.into_inner(), b"abcabcabcabcabc".to_vec());
    }
}
