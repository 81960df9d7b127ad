//! Generation watchdog.
//!
//! Workers punch in per tile and mark each item they start; a supervisor
//! compares the running item's age against the hang threshold. Items that
//! finish over the warning threshold are logged and kept in a bounded
//! history that ends up in any crash report for the tile.

mod slot;
mod supervisor;
mod timer;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use strata_math::TileCoord;
use tracing::warn;

pub use slot::{SlotSnapshot, SlowItem, TERRAIN_IDENTITY};
pub use supervisor::{HANG_NOTICE_CAPACITY, HangNotice, Watchdog};
pub use timer::DeadlineTimer;

use crate::stage::{GenerationStage, Phase};
use slot::WatchdogSlot;
use supervisor::WatchdogShared;

/// A worker's registration for one tile.
pub struct WatchdogContext {
    shared: Arc<WatchdogShared>,
    id: u64,
    slot: Arc<WatchdogSlot>,
}

/// Start of a running item, returned by [`WatchdogContext::begin_item`].
#[derive(Clone, Copy, Debug)]
pub struct ItemTicket {
    pub stage: GenerationStage,
    pub phase: Phase,
    started: Instant,
}

impl WatchdogContext {
    fn new(shared: Arc<WatchdogShared>, id: u64, slot: Arc<WatchdogSlot>) -> Self {
        Self { shared, id, slot }
    }

    pub fn tile(&self) -> TileCoord {
        self.slot.tile
    }

    /// Publishes the item about to run.
    pub fn begin_item(&self, stage: GenerationStage, phase: Phase, index: usize) -> ItemTicket {
        let timer = &self.shared.timer;
        self.slot.publish(stage, phase, index, timer.stamp());
        ItemTicket {
            stage,
            phase,
            started: timer.now(),
        }
    }

    /// Clears the running item and records it if it was slow. Returns its
    /// duration in milliseconds.
    pub fn end_item(&self, ticket: ItemTicket, identity: &str) -> u64 {
        self.slot.clear();
        let timer = &self.shared.timer;
        let duration_ms = timer.since(ticket.started);
        if timer.warn(duration_ms) {
            warn!(
                tile = %self.slot.tile,
                stage = %ticket.stage,
                phase = %ticket.phase,
                identity,
                duration_ms,
                "item was slow to generate"
            );
            self.slot.push_slow(SlowItem {
                stage: ticket.stage,
                phase: ticket.phase,
                identity: identity.to_string(),
                duration_ms,
            });
        }
        duration_ms
    }

    /// What the slot currently reports as running.
    pub fn current(&self) -> Option<SlotSnapshot> {
        self.slot.snapshot()
    }

    /// `true` once the supervisor has declared this tile hung.
    pub fn is_aborted(&self) -> bool {
        self.slot.aborted.load(Ordering::Acquire)
    }

    /// The flag placement routines poll at their checkpoints.
    pub fn abort_flag(&self) -> &AtomicBool {
        &self.slot.aborted
    }

    pub fn slow_items(&self) -> Vec<SlowItem> {
        self.slot.slow_items()
    }
}

impl Drop for WatchdogContext {
    fn drop(&mut self) {
        self.shared.slots.remove(&self.id);
    }
}
