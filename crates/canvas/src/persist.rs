//! Debounced, batched persistence of markup edits.
//!
//! One pending map keyed by backend id; the most recent write per id wins.
//! The debounce deadline is armed only when the map transitions from empty
//! and is not pushed back by further entries, so a steady stream of edits
//! still flushes. The drain is copy-then-clear: edits arriving while
//! flushed calls are in flight start a fresh batch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use shared::{BackendId, FeatureProperties, Geometry};

use crate::store::{CommandSender, StoreCommand};

pub const DEBOUNCE: Duration = Duration::from_millis(750);

#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

pub struct PersistenceBridge {
    tx: CommandSender,
    pending: HashMap<BackendId, PendingUpdate>,
    deadline: Option<Instant>,
}

impl PersistenceBridge {
    pub fn new(tx: CommandSender) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
            deadline: None,
        }
    }

    /// Queue a geometry/property write for a persisted feature
    pub fn queue(&mut self, id: BackendId, update: PendingUpdate, now: Instant) {
        if self.pending.is_empty() {
            self.deadline = Some(now + DEBOUNCE);
        }
        self.pending.insert(id, update);
    }

    /// Send a location override immediately; drag-end is already a single
    /// event, so these are not batched.
    pub fn relocate(&self, update: shared::EntityLocationUpdate) {
        let _ = self.tx.send(StoreCommand::UpsertLocation(update));
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Flush if the debounce deadline has passed
    pub fn tick(&mut self, now: Instant) {
        if self.deadline.is_some_and(|d| now >= d) {
            self.flush_now();
        }
    }

    /// Drain and send everything queued, bypassing the debounce (used when
    /// the operator switches tools so edits are not lost).
    pub fn flush_now(&mut self) {
        self.deadline = None;
        if self.pending.is_empty() {
            return;
        }
        let drained = std::mem::take(&mut self.pending);
        let mut batch: Vec<(BackendId, PendingUpdate)> = drained.into_iter().collect();
        batch.sort_by_key(|(id, _)| *id);
        for (id, update) in batch {
            let sent = self.tx.send(StoreCommand::UpdateFeature {
                id,
                geometry: update.geometry,
                properties: update.properties,
            });
            if sent.is_err() {
                tracing::warn!(feature_id = id, "store worker gone, dropping markup write");
            }
        }
    }

    /// Cancel the timer and drop the queue without sending. Used on engine
    /// teardown and when the queued geometry can no longer be trusted
    /// (drawing plugin failure).
    pub fn discard(&mut self) {
        self.deadline = None;
        self.pending.clear();
    }
}
