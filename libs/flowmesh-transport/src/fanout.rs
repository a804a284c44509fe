use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::queue::DropOldestQueue;
use crate::wire::WireTick;

/// `outputs_balance` toggles the publisher between "send to every connected
/// subscriber" and "send to exactly one, round-robin" (§4.2, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceMode {
    Ordinary,
    Balanced,
}

struct Slot {
    id: String,
    queue: Arc<DropOldestQueue<WireTick>>,
}

/// Shared publisher-side fan-out: tracks connected subscriber queues, the
/// `outputs_required` readiness gate, and the ordinary/balanced dispatch rule.
/// Used by both the socket-backed and in-process publisher implementations.
pub struct Fanout {
    mode: BalanceMode,
    required: HashSet<String>,
    queue_capacity: usize,
    slots: Mutex<Vec<Slot>>,
    ready: Notify,
    rr: AtomicUsize,
    shutdown: CancellationToken,
}

impl Fanout {
    pub fn new(required: HashSet<String>, mode: BalanceMode, queue_capacity: usize) -> Self {
        Self {
            mode,
            required,
            queue_capacity,
            slots: Mutex::new(Vec::new()),
            ready: Notify::new(),
            rr: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stops accepting new subscribers and closes every connected one's
    /// delivery loop, so its peer observes end-of-stream (§4.4 "DRAINING →
    /// EXITED after outputs are flushed and endpoints are closed").
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Registers a newly connected subscriber, returning its delivery queue.
    pub fn register(&self, id: String) -> Arc<DropOldestQueue<WireTick>> {
        let queue = Arc::new(DropOldestQueue::new(self.queue_capacity));
        let mut slots = self.slots.lock().expect("fanout poisoned");
        slots.push(Slot { id, queue: queue.clone() });
        if self.required_satisfied(&slots) {
            self.ready.notify_waiters();
        }
        queue
    }

    pub fn unregister(&self, id: &str) {
        let mut slots = self.slots.lock().expect("fanout poisoned");
        slots.retain(|s| s.id != id);
    }

    fn required_satisfied(&self, slots: &[Slot]) -> bool {
        self.required.iter().all(|req| slots.iter().any(|s| &s.id == req))
    }

    /// Blocks until every id in `outputs_required` has registered. No-op when
    /// the required set is empty (§4.2, §4.6).
    pub async fn wait_ready(&self) {
        if self.required.is_empty() {
            return;
        }
        loop {
            {
                let slots = self.slots.lock().expect("fanout poisoned");
                if self.required_satisfied(&slots) {
                    return;
                }
            }
            self.ready.notified().await;
        }
    }

    /// Dispatches one tick per the ordinary/balanced rule. Never blocks —
    /// delivery is via each subscriber's drop-oldest queue.
    pub fn dispatch(&self, tick: WireTick) {
        let slots = self.slots.lock().expect("fanout poisoned");
        if slots.is_empty() {
            return;
        }
        match self.mode {
            BalanceMode::Ordinary => {
                for slot in slots.iter() {
                    if let Some(_dropped) = slot.queue.push(tick.clone()) {
                        tracing::warn!(subscriber = %slot.id, "dropped oldest undelivered tick");
                    }
                }
            }
            BalanceMode::Balanced => {
                let idx = self.rr.fetch_add(1, Ordering::Relaxed) % slots.len();
                if let Some(_dropped) = slots[idx].queue.push(tick) {
                    tracing::warn!(subscriber = %slots[idx].id, "dropped oldest undelivered tick");
                }
            }
        }
    }

    pub fn subscriber_ids(&self) -> Vec<String> {
        self.slots.lock().expect("fanout poisoned").iter().map(|s| s.id.clone()).collect()
    }
}
