use flowmesh_transport::{NetSource, WireTick};
use tokio::sync::mpsc;

/// One router input: either a plain source, or the merged union of a
/// balanced-input group (`sources_balance`, §4.3). Both speak the same
/// `recv`/`try_recv` surface so the join loop does not need to care which.
pub(crate) enum InputSource {
    Single(NetSource),
    Balanced(BalancedInput),
}

impl InputSource {
    pub async fn recv(&mut self) -> Option<WireTick> {
        match self {
            InputSource::Single(s) => s.recv().await,
            InputSource::Balanced(b) => b.recv().await,
        }
    }

    pub fn try_recv(&mut self) -> Option<WireTick> {
        match self {
            InputSource::Single(s) => s.try_recv(),
            InputSource::Balanced(b) => b.try_recv(),
        }
    }
}

/// Fans the union of several member sources into one channel. Each member's
/// own ticks keep their relative order (only one task ever calls `recv` on a
/// given member), matching "each tick is taken from whichever source has one
/// ready, preserving per-source order" (§4.3).
pub(crate) struct BalancedInput {
    rx: mpsc::Receiver<WireTick>,
}

impl BalancedInput {
    pub fn new(members: Vec<NetSource>) -> Self {
        let (tx, rx) = mpsc::channel(32.max(members.len() * 4));
        for mut member in members {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(tick) = member.recv().await {
                    if tx.send(tick).await.is_err() {
                        break;
                    }
                }
            });
        }
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<WireTick> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<WireTick> {
        self.rx.try_recv().ok()
    }
}
