//! Auto-reconnecting display stream socket.
//!
//! Owns its own reconnect loop; consumers only observe events. The
//! payload framing follows the renderer tier: the image tier sends
//! length-delimited blobs, the bitstream tiers send raw bytes whose
//! unit boundaries live inside the stream.

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};

use crate::renderer::PayloadFraming;

const READ_CHUNK: usize = 64 * 1024;

// ── ReconnectPolicy ──────────────────────────────────────────────

/// Exponential backoff between connection attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub decay: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(150),
            max: Duration::from_millis(1000),
            decay: 1.2,
        }
    }
}

impl ReconnectPolicy {
    fn next(&self, current: Duration) -> Duration {
        current.mul_f64(self.decay).min(self.max)
    }
}

// ── Events ───────────────────────────────────────────────────────

/// Observable socket lifecycle. Connectivity events are signaling
/// only; reconnecting is this module's job.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Connected,
    Frame(Bytes),
    Disconnected,
    Error(String),
}

// ── StreamSocket ─────────────────────────────────────────────────

/// Connection parameters for one display stream.
#[derive(Debug, Clone)]
pub struct StreamSocket {
    pub addr: String,
    pub framing: PayloadFraming,
    pub reconnect: ReconnectPolicy,
}

impl StreamSocket {
    pub fn new(addr: impl Into<String>, framing: PayloadFraming) -> Self {
        Self {
            addr: addr.into(),
            framing,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Starts the socket task. It reconnects until the handle is
    /// closed or dropped, or the event receiver goes away.
    pub fn spawn(self, events: mpsc::UnboundedSender<StreamEvent>) -> StreamSocketHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run_socket(self, events, shutdown_rx));
        StreamSocketHandle {
            shutdown: shutdown_tx,
        }
    }
}

/// Owner handle for a running socket task.
pub struct StreamSocketHandle {
    shutdown: watch::Sender<bool>,
}

impl StreamSocketHandle {
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

// ── Socket task ──────────────────────────────────────────────────

async fn run_socket(
    socket: StreamSocket,
    events: mpsc::UnboundedSender<StreamEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut delay = socket.reconnect.initial;
    loop {
        if *shutdown.borrow() {
            break;
        }

        match TcpStream::connect(&socket.addr).await {
            Ok(stream) => {
                tracing::debug!("display stream connected to {}", socket.addr);
                if events.send(StreamEvent::Connected).is_err() {
                    break;
                }
                delay = socket.reconnect.initial;
                read_until_closed(stream, socket.framing, &events, &mut shutdown).await;
                if *shutdown.borrow() {
                    break;
                }
                if events.send(StreamEvent::Disconnected).is_err() {
                    break;
                }
            }
            Err(error) => {
                if events.send(StreamEvent::Error(error.to_string())).is_err() {
                    break;
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
        delay = socket.reconnect.next(delay);
    }
    tracing::debug!("display stream task for {} stopped", socket.addr);
}

async fn read_until_closed(
    stream: TcpStream,
    framing: PayloadFraming,
    events: &mpsc::UnboundedSender<StreamEvent>,
    shutdown: &mut watch::Receiver<bool>,
) {
    match framing {
        PayloadFraming::Blob => {
            let mut framed = FramedRead::new(stream, LengthDelimitedCodec::new());
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    frame = framed.next() => match frame {
                        Some(Ok(payload)) => {
                            if events.send(StreamEvent::Frame(payload.freeze())).is_err() {
                                return;
                            }
                        }
                        Some(Err(error)) => {
                            let _ = events.send(StreamEvent::Error(error.to_string()));
                            return;
                        }
                        None => return,
                    },
                }
            }
        }
        PayloadFraming::ByteStream => {
            let mut stream = stream;
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    read = stream.read(&mut buf) => match read {
                        Ok(0) => return,
                        Ok(n) => {
                            if events
                                .send(StreamEvent::Frame(Bytes::copy_from_slice(&buf[..n])))
                                .is_err()
                            {
                                return;
                            }
                        }
                        Err(error) => {
                            let _ = events.send(StreamEvent::Error(error.to_string()));
                            return;
                        }
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> StreamEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for stream event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn blob_framing_delivers_length_delimited_payloads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let payload = b"jpeg-bytes";
            conn.write_u32(payload.len() as u32).await.unwrap();
            conn.write_all(payload).await.unwrap();
            conn.flush().await.unwrap();
            // Keep the connection open long enough for delivery.
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StreamSocket::new(addr.to_string(), PayloadFraming::Blob).spawn(tx);

        assert!(matches!(next_event(&mut rx).await, StreamEvent::Connected));
        match next_event(&mut rx).await {
            StreamEvent::Frame(frame) => assert_eq!(&frame[..], b"jpeg-bytes"),
            other => panic!("expected frame, got {other:?}"),
        }
        handle.close();
    }

    #[tokio::test]
    async fn byte_stream_framing_passes_raw_chunks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(&[0, 0, 0, 1, 0x65, 1, 2, 3]).await.unwrap();
            conn.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StreamSocket::new(addr.to_string(), PayloadFraming::ByteStream).spawn(tx);

        assert!(matches!(next_event(&mut rx).await, StreamEvent::Connected));
        match next_event(&mut rx).await {
            StreamEvent::Frame(frame) => assert_eq!(&frame[..], &[0, 0, 0, 1, 0x65, 1, 2, 3]),
            other => panic!("expected frame, got {other:?}"),
        }
        handle.close();
    }

    #[tokio::test]
    async fn reconnects_after_peer_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            // First connection closes immediately, second stays up.
            let (conn, _) = listener.accept().await.unwrap();
            drop(conn);
            let (_conn, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StreamSocket::new(addr.to_string(), PayloadFraming::ByteStream).spawn(tx);

        assert!(matches!(next_event(&mut rx).await, StreamEvent::Connected));
        assert!(matches!(next_event(&mut rx).await, StreamEvent::Disconnected));
        assert!(matches!(next_event(&mut rx).await, StreamEvent::Connected));
        handle.close();
    }

    #[tokio::test]
    async fn close_stops_the_task() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (_conn, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StreamSocket::new(addr.to_string(), PayloadFraming::ByteStream).spawn(tx);

        assert!(matches!(next_event(&mut rx).await, StreamEvent::Connected));
        handle.close();

        // The task drops its sender on exit.
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if rx.recv().await.is_none() {
                    break;
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }

    #[test]
    fn backoff_decays_toward_the_ceiling() {
        let policy = ReconnectPolicy::default();
        let mut delay = policy.initial;
        for _ in 0..20 {
            delay = policy.next(delay);
        }
        assert_eq!(delay, policy.max);
    }
}
