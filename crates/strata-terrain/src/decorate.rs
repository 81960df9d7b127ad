//! Staged decoration of one tile.
//!
//! Stages run in ordinal order. Within a stage, structures run before
//! features, each in the order its biome lists them. Every item gets its own
//! seeded stream and runs under the watchdog with its failures (errors and
//! panics) isolated from the rest of the stage.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use hashbrown::HashSet;
use rand_chacha::ChaCha8Rng;
use strata_config::{BoundsPolicy, Config, FailurePolicy};
use strata_math::{TILE_SIZE, TileCoord};
use strata_voxel::{MaterialRegistry, WorldGrid};
use tracing::{debug, warn};

use crate::biome::{BiomeClassifier, BiomeId};
use crate::bounds::{BoundsViolation, RegionBoundsGuard};
use crate::content::{ContentRegistry, PlacementContext, StructurePiece, StructureType};
use crate::error::{DecorationError, ItemFailure, PlacementError};
use crate::heightmap::HeightmapProvider;
use crate::locate::StructureLocator;
use crate::seed::SeededStageRandom;
use crate::stage::{GenerationStage, Phase};
use crate::watchdog::{SlowItem, Watchdog, WatchdogContext};

/// Engine knobs, taken from [`Config`] once and passed in explicitly.
#[derive(Clone, Debug)]
pub struct DecorationSettings {
    pub region_radius: i32,
    pub structure_search_radius: i32,
    pub failure_policy: FailurePolicy,
    pub bounds_policy: BoundsPolicy,
    pub sea_level: i32,
    /// Identities that are skipped without running.
    pub disabled: HashSet<String>,
}

impl DecorationSettings {
    pub fn from_config(config: &Config) -> Self {
        let generation = &config.generation;
        Self {
            region_radius: generation.region_radius,
            structure_search_radius: generation.structure_search_radius,
            failure_policy: generation.failure_policy,
            bounds_policy: generation.bounds_policy,
            sea_level: generation.sea_level,
            disabled: config.content.disabled.iter().cloned().collect(),
        }
    }
}

impl Default for DecorationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    Placed,
    /// The precondition did not pass.
    Skipped,
    Disabled,
    Failed,
}

/// One item's run, with the seed it was given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemRecord {
    pub stage: GenerationStage,
    pub phase: Phase,
    /// Position in the phase list.
    pub index: usize,
    pub identity: String,
    pub seed: u64,
    pub outcome: ItemOutcome,
}

#[derive(Debug)]
pub struct DecorationReport {
    pub tile: TileCoord,
    pub biome: BiomeId,
    /// Every item considered, in execution order.
    pub items: Vec<ItemRecord>,
    /// Structure starts placed into the tile.
    pub structure_starts: usize,
    /// Failures kept under [`FailurePolicy::LogAndContinue`].
    pub failures: Vec<ItemFailure>,
    pub bounds_violations: Vec<BoundsViolation>,
    pub slow_items: Vec<SlowItem>,
}

impl DecorationReport {
    fn new(tile: TileCoord, biome: BiomeId) -> Self {
        Self {
            tile,
            biome,
            items: Vec::new(),
            structure_starts: 0,
            failures: Vec::new(),
            bounds_violations: Vec::new(),
            slow_items: Vec::new(),
        }
    }

    pub fn placed(&self) -> impl Iterator<Item = &ItemRecord> {
        self.items.iter().filter(|r| r.outcome == ItemOutcome::Placed)
    }

    /// Seed handed to the first item named `identity` in `stage`.
    pub fn seed_of(&self, stage: GenerationStage, identity: &str) -> Option<u64> {
        self.items
            .iter()
            .find(|r| r.stage == stage && r.identity == identity)
            .map(|r| r.seed)
    }
}

struct ItemRun<'a> {
    stage: GenerationStage,
    phase: Phase,
    index: usize,
    identity: &'a str,
    seed: u64,
}

impl ItemRun<'_> {
    fn record(&self, outcome: ItemOutcome) -> ItemRecord {
        ItemRecord {
            stage: self.stage,
            phase: self.phase,
            index: self.index,
            identity: self.identity.to_string(),
            seed: self.seed,
            outcome,
        }
    }
}

pub struct DecorationEngine {
    registry: Arc<ContentRegistry>,
    /// `registry` with registry-wide structure lists; what tiles run.
    placement: ContentRegistry,
    locator: Arc<StructureLocator>,
    classifier: Arc<dyn BiomeClassifier>,
    heights: Arc<dyn HeightmapProvider>,
    materials: Arc<MaterialRegistry>,
    settings: DecorationSettings,
}

impl DecorationEngine {
    pub fn new(
        registry: Arc<ContentRegistry>,
        classifier: Arc<dyn BiomeClassifier>,
        heights: Arc<dyn HeightmapProvider>,
        materials: Arc<MaterialRegistry>,
        settings: DecorationSettings,
    ) -> Self {
        let locator = Arc::new(StructureLocator::new(
            settings.structure_search_radius,
            Arc::clone(&registry),
            Arc::clone(&classifier),
            Arc::clone(&heights),
        ));
        let placement = registry.with_global_structures();
        Self {
            registry,
            placement,
            locator,
            classifier,
            heights,
            materials,
            settings,
        }
    }

    pub fn locator(&self) -> &Arc<StructureLocator> {
        &self.locator
    }

    pub fn registry(&self) -> &ContentRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &DecorationSettings {
        &self.settings
    }

    /// The biome whose content list decorates `tile`, sampled at its center.
    pub fn classify(&self, tile: TileCoord) -> BiomeId {
        self.classifier.classify(tile, TILE_SIZE / 2, TILE_SIZE / 2)
    }

    /// Pieces of enabled structures within `blocks` of `tile`, for terrain
    /// integration.
    pub fn pieces_near(&self, world_seed: u64, tile: TileCoord, blocks: i32) -> Vec<StructurePiece> {
        self.locator
            .pieces_near_where(world_seed, tile, blocks, |identity| !self.settings.disabled.contains(identity))
    }

    /// Runs every stage for `tile`.
    ///
    /// Item failures never stop the rest of their stage. Under
    /// [`FailurePolicy::Propagate`] the first stage with failures ends the
    /// pass with [`DecorationError::ItemsFailed`] once the stage is done.
    /// A hang ends the pass right after the hung item returns.
    pub fn decorate_tile(
        &self,
        grid: &dyn WorldGrid,
        tile: TileCoord,
        world_seed: u64,
        watchdog: &Watchdog,
    ) -> Result<DecorationReport, DecorationError> {
        let biome = self.classify(tile);
        let content = self.placement.get_staged_content(biome);
        let watch = watchdog.punch_in(tile, world_seed, Some(biome), Some(Arc::clone(&content)));
        let random = SeededStageRandom::new(world_seed, tile);
        let ctx = PlacementContext::new(
            tile,
            world_seed,
            biome,
            grid,
            &self.materials,
            self.heights.as_ref(),
            self.settings.sea_level,
        )
        .with_abort(watch.abort_flag());
        let origin = tile.origin(0);
        let mut guard = RegionBoundsGuard::new(
            tile,
            self.settings.region_radius,
            grid.min_y(),
            grid.max_y(),
            self.settings.bounds_policy,
        );
        let mut report = DecorationReport::new(tile, biome);

        for stage in GenerationStage::ALL {
            let mut seed_index = 0u32;
            let mut failures = Vec::new();

            for (index, structure) in content.structures(stage).iter().enumerate() {
                let run = ItemRun {
                    stage,
                    phase: Phase::Structure,
                    index,
                    identity: structure.identity(),
                    seed: random.item_seed(seed_index, stage),
                };
                let mut rng = random.item_rng(seed_index, stage);
                seed_index += 1;
                if self.is_disabled(&run, &mut report) {
                    continue;
                }

                let ticket = watch.begin_item(stage, Phase::Structure, index);
                let result = isolate(|| {
                    let starts = self.place_structure(&ctx, structure.as_ref(), world_seed, &mut guard, &mut rng)?;
                    report.structure_starts += starts;
                    Ok(())
                });
                watch.end_item(ticket, run.identity);
                report.bounds_violations.extend(guard.take_violations());
                self.settle(&watch, &run, result, &mut report, &mut failures)?;
            }

            for (index, feature) in content.features(stage).iter().enumerate() {
                let run = ItemRun {
                    stage,
                    phase: Phase::Feature,
                    index,
                    identity: feature.identity(),
                    seed: random.item_seed(seed_index, stage),
                };
                let mut rng = random.item_rng(seed_index, stage);
                seed_index += 1;
                if self.is_disabled(&run, &mut report) {
                    continue;
                }
                if !feature.should_place(&ctx) {
                    report.items.push(run.record(ItemOutcome::Skipped));
                    continue;
                }

                let ticket = watch.begin_item(stage, Phase::Feature, index);
                let result = isolate(|| feature.feature().place(&ctx, origin, &mut rng));
                watch.end_item(ticket, run.identity);
                self.settle(&watch, &run, result, &mut report, &mut failures)?;
            }

            if !failures.is_empty() {
                match self.settings.failure_policy {
                    FailurePolicy::Propagate => {
                        return Err(DecorationError::ItemsFailed { tile, stage, failures });
                    }
                    FailurePolicy::LogAndContinue => report.failures.extend(failures),
                }
            }
        }

        report.slow_items = watch.slow_items();
        debug!(
            %tile,
            biome = biome.0,
            items = report.items.len(),
            starts = report.structure_starts,
            failures = report.failures.len(),
            "tile decorated"
        );
        Ok(report)
    }

    fn is_disabled(&self, run: &ItemRun<'_>, report: &mut DecorationReport) -> bool {
        if !self.settings.disabled.contains(run.identity) {
            return false;
        }
        debug!(stage = %run.stage, identity = run.identity, "skipping disabled {}", run.phase);
        report.items.push(run.record(ItemOutcome::Disabled));
        true
    }

    fn place_structure(
        &self,
        ctx: &PlacementContext<'_>,
        structure: &dyn StructureType,
        world_seed: u64,
        guard: &mut RegionBoundsGuard,
        rng: &mut ChaCha8Rng,
    ) -> Result<usize, PlacementError> {
        let starts = self.locator.starts_intersecting(structure, world_seed, ctx.tile);
        for start in &starts {
            ctx.checkpoint()?;
            guard.reset(structure.identity());
            structure.place(ctx, start, guard, rng)?;
        }
        Ok(starts.len())
    }

    /// Records an item's outcome. Returns `Err` only for a hang.
    fn settle(
        &self,
        watch: &WatchdogContext,
        run: &ItemRun<'_>,
        result: Result<(), PlacementError>,
        report: &mut DecorationReport,
        failures: &mut Vec<ItemFailure>,
    ) -> Result<(), DecorationError> {
        if watch.is_aborted() {
            return Err(DecorationError::GenerationHang {
                tile: watch.tile(),
                stage: run.stage,
                phase: run.phase,
                identity: run.identity.to_string(),
            });
        }
        match result {
            Ok(()) => report.items.push(run.record(ItemOutcome::Placed)),
            Err(error) => {
                warn!(
                    tile = %watch.tile(),
                    stage = %run.stage,
                    identity = run.identity,
                    "{} failed: {error}",
                    run.phase
                );
                report.items.push(run.record(ItemOutcome::Failed));
                failures.push(ItemFailure {
                    stage: run.stage,
                    phase: run.phase,
                    identity: run.identity.to_string(),
                    error,
                });
            }
        }
        Ok(())
    }
}

/// Runs one placement routine, turning a panic into a failure.
fn isolate(f: impl FnOnce() -> Result<(), PlacementError>) -> Result<(), PlacementError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(PlacementError::Panicked(panic_message(payload.as_ref()))))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use strata_voxel::VoxelWorld;

    use super::*;
    use crate::biome::UniformBiome;
    use crate::content::{FeatureDescriptor, Precondition, StagedContent};
    use crate::heightmap::FlatHeightmap;

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging(identity: &'static str, log: &Log) -> FeatureDescriptor {
        let log = Arc::clone(log);
        FeatureDescriptor::from_fn(identity, move |_, _, _| {
            log.lock().unwrap().push(identity.to_string());
            Ok(())
        })
    }

    fn engine(content: StagedContent, settings: DecorationSettings) -> DecorationEngine {
        DecorationEngine::new(
            Arc::new(ContentRegistry::new(content)),
            Arc::new(UniformBiome(BiomeId(0))),
            Arc::new(FlatHeightmap::new(64)),
            Arc::new(MaterialRegistry::with_defaults()),
            settings,
        )
    }

    #[test]
    fn test_panic_message_extracts_text() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 7");
        let payload = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }

    #[test]
    fn test_disabled_item_keeps_seed_slot() {
        let log = Log::default();
        let content = StagedContent::new()
            .with_feature(GenerationStage::Lakes, logging("a", &log))
            .with_feature(GenerationStage::Lakes, logging("b", &log));
        let mut settings = DecorationSettings::default();
        settings.disabled.insert("a".into());
        let engine = engine(content, settings);

        let report = engine
            .decorate_tile(&VoxelWorld::default(), TileCoord::new(0, 0), 42, &Watchdog::disabled())
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["b".to_string()]);
        let random = SeededStageRandom::new(42, TileCoord::new(0, 0));
        assert_eq!(report.seed_of(GenerationStage::Lakes, "b"), Some(random.item_seed(1, GenerationStage::Lakes)));
        assert_eq!(report.items[0].outcome, ItemOutcome::Disabled);
    }

    #[test]
    fn test_precondition_skip_consumes_seed_slot() {
        let log = Log::default();
        let content = StagedContent::new()
            .with_feature(
                GenerationStage::Lakes,
                logging("never", &log).with_precondition(Precondition::new(|_| false)),
            )
            .with_feature(GenerationStage::Lakes, logging("always", &log));
        let report = engine(content, DecorationSettings::default())
            .decorate_tile(&VoxelWorld::default(), TileCoord::new(3, 3), 1, &Watchdog::disabled())
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["always".to_string()]);
        assert_eq!(report.items[0].outcome, ItemOutcome::Skipped);
        let random = SeededStageRandom::new(1, TileCoord::new(3, 3));
        assert_eq!(report.seed_of(GenerationStage::Lakes, "always"), Some(random.item_seed(1, GenerationStage::Lakes)));
    }

    #[test]
    fn test_propagate_stops_after_failing_stage() {
        let log = Log::default();
        let content = StagedContent::new()
            .with_feature(GenerationStage::Lakes, FeatureDescriptor::from_fn("bad", |_, _, _| Err(PlacementError::invalid("nope"))))
            .with_feature(GenerationStage::Lakes, logging("same_stage", &log))
            .with_feature(GenerationStage::VegetalDecoration, logging("later_stage", &log));
        let err = engine(content, DecorationSettings::default())
            .decorate_tile(&VoxelWorld::default(), TileCoord::new(0, 0), 1, &Watchdog::disabled())
            .unwrap_err();
        match err {
            DecorationError::ItemsFailed { stage, failures, .. } => {
                assert_eq!(stage, GenerationStage::Lakes);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].identity, "bad");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["same_stage".to_string()]);
    }

    #[test]
    fn test_log_and_continue_runs_every_stage() {
        let log = Log::default();
        let content = StagedContent::new()
            .with_feature(GenerationStage::Lakes, FeatureDescriptor::from_fn("panics", |_, _, _| panic!("kaboom")))
            .with_feature(GenerationStage::VegetalDecoration, logging("later_stage", &log));
        let settings = DecorationSettings {
            failure_policy: FailurePolicy::LogAndContinue,
            ..DecorationSettings::default()
        };
        let report = engine(content, settings)
            .decorate_tile(&VoxelWorld::default(), TileCoord::new(0, 0), 1, &Watchdog::disabled())
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["later_stage".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(&report.failures[0].error, PlacementError::Panicked(m) if m == "kaboom"));
    }
}
