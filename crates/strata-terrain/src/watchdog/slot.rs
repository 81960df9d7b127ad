//! Per-worker watchdog slot.
//!
//! The worker publishes what it is running as one packed `u64`, so the
//! supervisor's single load always sees a consistent (stage, phase, index,
//! start) tuple:
//!
//! | bits   | field                                  |
//! |--------|----------------------------------------|
//! | 0..32  | start stamp (ms, wrapping)             |
//! | 32..36 | stage ordinal                          |
//! | 36..38 | phase code                             |
//! | 38..62 | item index within its phase list       |
//! | 62     | hung mark, set by the supervisor       |
//! | 63     | active flag                            |

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use strata_math::TileCoord;

use crate::biome::BiomeId;
use crate::content::StagedContent;
use crate::stage::{GenerationStage, Phase};

const STAGE_SHIFT: u32 = 32;
const PHASE_SHIFT: u32 = 36;
const INDEX_SHIFT: u32 = 38;
const STAGE_MASK: u64 = 0xF;
const PHASE_MASK: u64 = 0x3;
const INDEX_MASK: u64 = (1 << 24) - 1;
const HUNG: u64 = 1 << 62;
const ACTIVE: u64 = 1 << 63;

/// Identity reported for the terrain integration pass.
pub const TERRAIN_IDENTITY: &str = "terrain_integration";

/// An item that finished but took longer than the warning threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlowItem {
    pub stage: GenerationStage,
    pub phase: Phase,
    pub identity: String,
    pub duration_ms: u64,
}

/// Decoded view of a slot's packed word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub stage: GenerationStage,
    pub phase: Phase,
    pub index: u32,
    pub(crate) started: u32,
}

pub(crate) fn pack(stage: GenerationStage, phase: Phase, index: usize, started: u32) -> u64 {
    let index = (index as u64).min(INDEX_MASK);
    ACTIVE
        | (index << INDEX_SHIFT)
        | (phase.code() << PHASE_SHIFT)
        | ((stage.ordinal() as u64 & STAGE_MASK) << STAGE_SHIFT)
        | u64::from(started)
}

pub(crate) fn unpack(word: u64) -> Option<SlotSnapshot> {
    if word & ACTIVE == 0 {
        return None;
    }
    Some(SlotSnapshot {
        stage: GenerationStage::from_ordinal(((word >> STAGE_SHIFT) & STAGE_MASK) as usize)?,
        phase: Phase::from_code((word >> PHASE_SHIFT) & PHASE_MASK)?,
        index: ((word >> INDEX_SHIFT) & INDEX_MASK) as u32,
        started: word as u32,
    })
}

pub(crate) struct WatchdogSlot {
    pub(crate) tile: TileCoord,
    pub(crate) world_seed: u64,
    pub(crate) biome: Option<BiomeId>,
    pub(crate) thread: String,
    content: Option<Arc<StagedContent>>,
    state: AtomicU64,
    /// Set by the supervisor when it declares this slot hung.
    pub(crate) aborted: AtomicBool,
    slow: Mutex<VecDeque<SlowItem>>,
    slow_capacity: usize,
}

impl WatchdogSlot {
    pub(crate) fn new(
        tile: TileCoord,
        world_seed: u64,
        biome: Option<BiomeId>,
        thread: String,
        content: Option<Arc<StagedContent>>,
        slow_capacity: usize,
    ) -> Self {
        Self {
            tile,
            world_seed,
            biome,
            thread,
            content,
            state: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            slow: Mutex::new(VecDeque::with_capacity(slow_capacity)),
            slow_capacity,
        }
    }

    pub(crate) fn publish(&self, stage: GenerationStage, phase: Phase, index: usize, started: u32) {
        self.state
            .store(pack(stage, phase, index, started), Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.state.store(0, Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> Option<SlotSnapshot> {
        unpack(self.word())
    }

    pub(crate) fn word(&self) -> u64 {
        self.state.load(Ordering::Acquire)
    }

    /// Marks the item published as `word` hung. Fails if the worker has
    /// moved on since `word` was read, or the item is already marked.
    pub(crate) fn claim_hung(&self, word: u64) -> bool {
        word & (ACTIVE | HUNG) == ACTIVE
            && self
                .state
                .compare_exchange(word, word | HUNG, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Name of the item a snapshot points at.
    pub(crate) fn identity(&self, snapshot: &SlotSnapshot) -> String {
        let index = snapshot.index as usize;
        let resolved = match (snapshot.phase, &self.content) {
            (Phase::Terrain, _) => Some(TERRAIN_IDENTITY.to_string()),
            (Phase::Structure, Some(content)) => content
                .structures(snapshot.stage)
                .get(index)
                .map(|s| s.identity().to_string()),
            (Phase::Feature, Some(content)) => content
                .features(snapshot.stage)
                .get(index)
                .map(|f| f.identity().to_string()),
            _ => None,
        };
        resolved.unwrap_or_else(|| format!("{}#{index}", snapshot.phase))
    }

    pub(crate) fn push_slow(&self, item: SlowItem) {
        if self.slow_capacity == 0 {
            return;
        }
        let mut slow = self.slow.lock().unwrap_or_else(PoisonError::into_inner);
        if slow.len() == self.slow_capacity {
            slow.pop_front();
        }
        slow.push_back(item);
    }

    pub(crate) fn slow_items(&self) -> Vec<SlowItem> {
        self.slow
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_roundtrip() {
        let word = pack(GenerationStage::VegetalDecoration, Phase::Feature, 1234, 0xDEAD_BEEF);
        let snap = unpack(word).unwrap();
        assert_eq!(snap.stage, GenerationStage::VegetalDecoration);
        assert_eq!(snap.phase, Phase::Feature);
        assert_eq!(snap.index, 1234);
        assert_eq!(snap.started, 0xDEAD_BEEF);
    }

    #[test]
    fn test_idle_word_is_inactive() {
        assert_eq!(unpack(0), None);
    }

    #[test]
    fn test_fields_do_not_overlap() {
        let word = pack(GenerationStage::TopLayerModification, Phase::Terrain, INDEX_MASK as usize, u32::MAX);
        let snap = unpack(word).unwrap();
        assert_eq!(snap.stage, GenerationStage::TopLayerModification);
        assert_eq!(snap.phase, Phase::Terrain);
        assert_eq!(snap.index as u64, INDEX_MASK);
        assert_eq!(snap.started, u32::MAX);
    }

    #[test]
    fn test_slot_publish_and_clear() {
        let slot = WatchdogSlot::new(TileCoord::new(0, 0), 1, None, "t".into(), None, 4);
        assert!(slot.snapshot().is_none());
        slot.publish(GenerationStage::Lakes, Phase::Structure, 2, 100);
        let snap = slot.snapshot().unwrap();
        assert_eq!(snap.index, 2);
        assert_eq!(slot.identity(&snap), "structure#2");
        slot.clear();
        assert!(slot.snapshot().is_none());
    }

    #[test]
    fn test_claim_hung_requires_unchanged_word() {
        let slot = WatchdogSlot::new(TileCoord::new(0, 0), 1, None, "t".into(), None, 4);
        assert!(!slot.claim_hung(slot.word()), "idle slot cannot hang");

        slot.publish(GenerationStage::Lakes, Phase::Feature, 0, 100);
        let stale = slot.word();
        slot.publish(GenerationStage::Lakes, Phase::Feature, 1, 140);
        assert!(!slot.claim_hung(stale), "worker moved to the next item");

        let current = slot.word();
        assert!(slot.claim_hung(current));
        assert!(!slot.claim_hung(slot.word()), "already marked");
        let snap = slot.snapshot().unwrap();
        assert_eq!(snap.index, 1);
        assert_eq!(snap.started, 140);
    }

    #[test]
    fn test_slow_history_is_bounded() {
        let slot = WatchdogSlot::new(TileCoord::new(0, 0), 1, None, "t".into(), None, 2);
        for i in 0..5 {
            slot.push_slow(SlowItem {
                stage: GenerationStage::Lakes,
                phase: Phase::Feature,
                identity: format!("f{i}"),
                duration_ms: i,
            });
        }
        let items = slot.slow_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].identity, "f3");
        assert_eq!(items[1].identity, "f4");
    }
}
