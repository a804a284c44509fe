use std::collections::VecDeque;

use flowmesh_core::{EndpointUrl, FrameSet};
use flowmesh_transport::{NetSource, WireTick};
use tokio::time::{Duration, Instant};

use crate::source::{BalancedInput, InputSource};

/// What `Router::next_tick` handed back to the worker's tick loop (§4.3, §4.4).
pub enum RouterOutcome {
    /// A releasable frame set, merged from every source that contributed.
    Tick(FrameSet),
    /// `sources_timeout` elapsed with nothing releasable; the worker should
    /// resurface and check for a shutdown request (§5).
    Timeout,
    /// A required source disconnected for good. The worker decides whether
    /// this is fatal per its propagation policy (§7).
    EndOfStream(String),
}

struct RequiredSlot {
    id: String,
    url: EndpointUrl,
    input: InputSource,
    pending: VecDeque<WireTick>,
}

struct EphemeralSlot {
    id: String,
    url: EndpointUrl,
    input: InputSource,
}

/// Per-source buffer depth used to hold ticks while message-ID sync waits for
/// a slower required source to catch up. Small and bounded, matching the
/// fabric's "does not queue beyond a small, bounded number of ticks per
/// source" lifecycle rule (§3).
const SLOT_BUFFER: usize = 8;

/// Subscriber-side assembly of one tick from N source streams (component C).
///
/// One `Router` is owned by one worker. It classifies each declared source as
/// required or ephemeral (trailing `?`, §4.3), or — when `sources_balance` is
/// set — folds every source into a single balanced-input group instead.
pub struct Router {
    required: Vec<RequiredSlot>,
    ephemeral: Vec<EphemeralSlot>,
    msgid_sync: bool,
}

impl Router {
    /// `sources` pairs each declared peer id with its parsed endpoint URL
    /// (topic filter + ephemeral flag) and the `NetSource` already connected
    /// to it. `sources_balance` and `mq_msgid_sync` mirror the identically
    /// named `FilterConfig` fields (§6).
    pub fn new(sources: Vec<(String, EndpointUrl, NetSource)>, sources_balance: bool, msgid_sync: bool) -> Self {
        if sources_balance && sources.len() > 1 {
            let url = sources[0].1.clone();
            let id = sources.iter().map(|(id, _, _)| id.as_str()).collect::<Vec<_>>().join("+");
            let members = sources.into_iter().map(|(_, _, s)| s).collect();
            let slot = RequiredSlot {
                id,
                url,
                input: InputSource::Balanced(BalancedInput::new(members)),
                pending: VecDeque::with_capacity(SLOT_BUFFER),
            };
            return Self { required: vec![slot], ephemeral: Vec::new(), msgid_sync };
        }

        let mut required = Vec::new();
        let mut ephemeral = Vec::new();
        for (id, url, source) in sources {
            if url.ephemeral {
                ephemeral.push(EphemeralSlot { id, url, input: InputSource::Single(source) });
            } else {
                required.push(RequiredSlot {
                    id,
                    url,
                    input: InputSource::Single(source),
                    pending: VecDeque::with_capacity(SLOT_BUFFER),
                });
            }
        }
        Self { required, ephemeral, msgid_sync }
    }

    /// A sources-less filter (a pure producer) has no router work to do; the
    /// worker treats it as immediately releasable (§4.4 SETUP→RUNNING).
    pub fn is_sourceless(&self) -> bool {
        self.required.is_empty() && self.ephemeral.is_empty()
    }

    /// Pulls the next releasable frame set, honoring join discipline, ID
    /// sync, and the ephemeral never-blocks rule (§4.3).
    pub async fn next_tick(&mut self, timeout: Duration) -> RouterOutcome {
        if self.is_sourceless() {
            // A pure producer has no upstream to wait on: every call is
            // immediately releasable so the worker drives `process()` as
            // fast as the filter wants to emit (§4.4 SETUP→RUNNING
            // "immediately for sources-less filters").
            return RouterOutcome::Tick(FrameSet::new());
        }

        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() >= deadline {
                return RouterOutcome::Timeout;
            }

            for slot in &mut self.required {
                if slot.pending.is_empty() {
                    match tokio::time::timeout_at(deadline, slot.input.recv()).await {
                        Ok(Some(tick)) => slot.pending.push_back(tick),
                        Ok(None) => return RouterOutcome::EndOfStream(slot.id.clone()),
                        Err(_elapsed) => {}
                    }
                }
            }

            if self.required.iter().any(|s| s.pending.is_empty()) {
                continue;
            }

            if self.msgid_sync && self.required.len() > 1 {
                let max_id = self
                    .required
                    .iter()
                    .filter_map(|s| s.pending.front().map(|t| t.msg_id))
                    .max()
                    .expect("all required slots have a pending tick");
                let mut synced = true;
                for slot in &mut self.required {
                    while matches!(slot.pending.front(), Some(t) if t.msg_id < max_id) {
                        slot.pending.pop_front();
                    }
                    if slot.pending.front().map(|t| t.msg_id) != Some(max_id) {
                        synced = false;
                    }
                }
                if !synced {
                    continue;
                }
            }

            break;
        }

        let mut frames = FrameSet::new();
        for slot in &mut self.required {
            if let Some(tick) = slot.pending.pop_front() {
                merge_tick(&mut frames, tick, &slot.url);
            }
        }
        for slot in &mut self.ephemeral {
            if let Some(tick) = slot.input.try_recv() {
                merge_tick(&mut frames, tick, &slot.url);
            }
        }
        RouterOutcome::Tick(frames)
    }
}

fn merge_tick(frames: &mut FrameSet, tick: WireTick, url: &EndpointUrl) {
    let decoded = match tick.into_frame_set() {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed tick");
            return;
        }
    };
    for (topic, frame) in decoded {
        // last writer wins on a rename collision (§4.3)
        if let Some(renamed) = url.resolve(&topic) {
            frames.insert(renamed, frame);
        }
    }
}
