use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::TransportError;
use crate::fanout::{BalanceMode, Fanout};
use crate::net::Stream;
use crate::wire::WireTick;

/// Socket-backed publisher. For the TCP scheme this binds and accepts any
/// number of subscribers (§4.2); for the IPC scheme the roles are reversed —
/// the subscriber listens and the publisher dials out (see
/// `flowmesh_core::endpoint` doc comment on `Scheme::Ipc`) — so `connect_ipc`
/// dials a single, already-listening peer instead of binding.
pub struct NetPublisher {
    fanout: Arc<Fanout>,
}

impl NetPublisher {
    pub async fn bind_tcp(
        host: &str,
        port: u16,
        required: HashSet<String>,
        mode: BalanceMode,
        queue_capacity: usize,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind((host, port)).await?;
        let fanout = Arc::new(Fanout::new(required, mode, queue_capacity));
        let accept_fanout = fanout.clone();
        let shutdown = fanout.shutdown_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "subscriber connected");
                            let fanout = accept_fanout.clone();
                            tokio::spawn(serve_subscriber(Box::new(stream), fanout, None));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "publisher accept loop stopped");
                            break;
                        }
                    },
                }
            }
        });
        Ok(Self { fanout })
    }

    pub async fn connect_ipc(path: PathBuf, mode: BalanceMode, queue_capacity: usize) -> Result<Self, TransportError> {
        let fanout = Arc::new(Fanout::new(HashSet::new(), mode, queue_capacity));
        let stream = crate::net::connect_unix_retrying(&path).await?;
        let id = path.to_string_lossy().to_string();
        tokio::spawn(serve_subscriber(Box::new(stream), fanout.clone(), Some(id)));
        Ok(Self { fanout })
    }

    /// Dispatches a tick to connected subscribers per the fan-out mode.
    /// Never blocks (§4.2).
    pub fn publish(&self, tick: WireTick) {
        self.fanout.dispatch(tick);
    }

    /// Resolves once every `outputs_required` id has registered. No-op if
    /// the required set is empty.
    pub async fn wait_ready(&self) {
        self.fanout.wait_ready().await
    }

    pub fn subscriber_ids(&self) -> Vec<String> {
        self.fanout.subscriber_ids()
    }

    /// Stops accepting new subscribers and disconnects every connected one,
    /// so each observes end-of-stream (§4.4 DRAINING→EXITED).
    pub fn shutdown(&self) {
        self.fanout.shutdown();
    }
}

/// Reads the subscriber's one-shot handshake id (unless `fixed_id` supplies
/// one, for the IPC connector case where there is exactly one static peer),
/// registers it with the fanout, then drains its delivery queue onto the wire
/// until the connection drops.
async fn serve_subscriber(stream: Box<dyn Stream>, fanout: Arc<Fanout>, fixed_id: Option<String>) {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    let id = match fixed_id {
        Some(id) => id,
        None => match framed.next().await {
            Some(Ok(bytes)) => String::from_utf8_lossy(&bytes).to_string(),
            _ => {
                tracing::warn!("subscriber disconnected before handshake");
                return;
            }
        },
    };
    let queue = fanout.register(id.clone());
    let shutdown = fanout.shutdown_token();
    loop {
        let tick = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            tick = queue.pop() => tick,
        };
        if framed.send(tick.encode()).await.is_err() {
            break;
        }
    }
    fanout.unregister(&id);
}
