use std::path::PathBuf;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::TransportError;
use crate::net::Stream;
use crate::wire::WireTick;

/// Socket-backed source. For the TCP scheme this dials out to the
/// publisher's listener (§4.2); for the IPC scheme the subscriber listens and
/// the publisher dials in instead.
///
/// `recv()` yields `None` once the upstream is gone for good — the router
/// (component C) decides whether that is fatal (required source) or silent
/// (ephemeral source).
pub struct NetSource {
    rx: mpsc::Receiver<WireTick>,
}

const CHANNEL_CAPACITY: usize = 8;

impl NetSource {
    pub async fn connect_tcp(host: String, port: u16, id: String) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            loop {
                if tx.is_closed() {
                    return;
                }
                let stream = match crate::net::connect_tcp_retrying(&host, port).await {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!(error = %e, "giving up connecting to source");
                        return;
                    }
                };
                read_until_disconnect(Box::new(stream), &tx, Some(id.clone())).await;
            }
        });
        Self { rx }
    }

    pub async fn bind_ipc(path: PathBuf) -> Result<Self, TransportError> {
        let listener = UnixListener::bind(&path)?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            loop {
                if tx.is_closed() {
                    return;
                }
                match listener.accept().await {
                    Ok((stream, _)) => read_until_disconnect(Box::new(stream), &tx, None).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "ipc source accept loop stopped");
                        return;
                    }
                }
            }
        });
        Ok(Self { rx })
    }

    pub async fn recv(&mut self) -> Option<WireTick> {
        self.rx.recv().await
    }

    /// Non-blocking poll, used by the router for ephemeral sources that must
    /// never block tick release (§4.3 "ephemeral sources never block").
    pub fn try_recv(&mut self) -> Option<WireTick> {
        self.rx.try_recv().ok()
    }

    /// Same-process source backed by a channel instead of a socket — used to
    /// wire two filters that share an address space (tests, and co-located
    /// pipelines) without paying for a loopback round trip.
    pub fn in_process(capacity: usize) -> (mpsc::Sender<WireTick>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

async fn read_until_disconnect(stream: Box<dyn Stream>, tx: &mpsc::Sender<WireTick>, handshake_id: Option<String>) {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    if let Some(id) = handshake_id {
        if framed.send(Bytes::from(id.into_bytes())).await.is_err() {
            return;
        }
    } else {
        // IPC listener role: drain (and ignore) the connector's handshake id.
        let _ = framed.next().await;
    }
    while let Some(frame) = framed.next().await {
        let bytes = match frame {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "source framing error");
                break;
            }
        };
        match WireTick::decode(bytes.freeze()) {
            Ok(tick) => {
                if tx.send(tick).await.is_err() {
                    return;
                }
            }
            Err(e) => tracing::warn!(error = %e, "dropping malformed tick"),
        }
    }
}
