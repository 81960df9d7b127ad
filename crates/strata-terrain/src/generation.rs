//! Tile generation: base terrain, the full per-tile pass, and the worker
//! pool that runs it.
//!
//! A tile runs start to finish on one worker thread: base fill, staged
//! decoration, then terrain integration. Parallelism is across tiles only.
//! Completed tiles come back through a bounded channel.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, select};
use dashmap::DashMap;
use glam::IVec3;
use strata_config::{Config, GenerationConfig};
use strata_math::{TILE_SIZE, TileCoord};
use strata_voxel::{GridError, MaterialId, MaterialRegistry, WorldGrid};
use tracing::{debug, error, info, warn};

use crate::biome::{BiomeClassifier, BiomeRegistry, BiomeSampler, WhittakerDiagram};
use crate::content::ContentRegistry;
use crate::crash::{CrashCause, CrashReporter, DiagnosticContext};
use crate::decorate::{DecorationEngine, DecorationReport, DecorationSettings, panic_message};
use crate::error::{ContentError, DecorationError, ItemFailure, PlacementError};
use crate::heightmap::{HeightmapParams, HeightmapProvider, NoiseHeightmap};
use crate::integrate::{IntegrationStats, TerrainIntegrator};
use crate::stage::{GenerationStage, Phase};
use crate::watchdog::{HangNotice, TERRAIN_IDENTITY, Watchdog};

/// Blocks of subsurface material under each column's top block.
const SUBSURFACE_DEPTH: i32 = 3;

/// Lays down the undecorated terrain the pipeline decorates.
pub struct BaseTerrain {
    heights: Arc<dyn HeightmapProvider>,
    classifier: Arc<dyn BiomeClassifier>,
    biomes: Arc<BiomeRegistry>,
    stone: MaterialId,
    water: MaterialId,
    sea_level: i32,
}

impl BaseTerrain {
    pub fn new(
        heights: Arc<dyn HeightmapProvider>,
        classifier: Arc<dyn BiomeClassifier>,
        biomes: Arc<BiomeRegistry>,
        materials: &MaterialRegistry,
        sea_level: i32,
    ) -> Result<Self, ContentError> {
        Ok(Self {
            heights,
            classifier,
            biomes,
            stone: materials.require("stone")?,
            water: materials.require("water")?,
            sea_level,
        })
    }

    pub fn heights(&self) -> &Arc<dyn HeightmapProvider> {
        &self.heights
    }

    pub fn classifier(&self) -> &Arc<dyn BiomeClassifier> {
        &self.classifier
    }

    /// Fills every column of `tile` with stone, the column biome's
    /// subsurface and surface up to the provider's height, then water up to
    /// sea level. Returns the number of blocks written.
    pub fn fill_base_terrain(&self, grid: &dyn WorldGrid, tile: TileCoord) -> Result<usize, GridError> {
        let mut written = 0;
        for lz in 0..TILE_SIZE {
            for lx in 0..TILE_SIZE {
                let biome = self.biomes.get(self.classifier.classify(tile, lx, lz));
                let (surface, subsurface) = biome.map_or((self.stone, self.stone), |b| (b.surface, b.subsurface));
                let height = self.heights.surface_height(tile, lx, lz).clamp(grid.min_y(), grid.max_y());
                let pos = tile.block_pos(lx, 0, lz);

                for y in grid.min_y()..=height {
                    let material = if y == height {
                        surface
                    } else if y >= height - SUBSURFACE_DEPTH {
                        subsurface
                    } else {
                        self.stone
                    };
                    grid.set_block(IVec3::new(pos.x, y, pos.z), material)?;
                    written += 1;
                }
                for y in height + 1..=self.sea_level.min(grid.max_y()) {
                    grid.set_block(IVec3::new(pos.x, y, pos.z), self.water)?;
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileStatus {
    /// Every item placed and the terrain integrated.
    Complete,
    /// Some items failed; the rest of the tile was still generated.
    Partial,
    /// The watchdog declared the tile hung. Its worker retires.
    Hung,
    /// Unrecoverable failure outside item isolation.
    Failed,
}

/// A finished tile, whatever its outcome.
#[derive(Debug)]
pub struct GeneratedTile {
    pub tile: TileCoord,
    pub status: TileStatus,
    pub decoration: Option<DecorationReport>,
    /// Item failures under either failure policy. Moved out of the report.
    pub failures: Vec<ItemFailure>,
    pub integration: IntegrationStats,
    pub error: Option<String>,
    /// Generation time in microseconds.
    pub generation_time_us: u64,
}

impl GeneratedTile {
    fn new(tile: TileCoord) -> Self {
        Self {
            tile,
            status: TileStatus::Complete,
            decoration: None,
            failures: Vec::new(),
            integration: IntegrationStats::default(),
            error: None,
            generation_time_us: 0,
        }
    }

    fn failed(tile: TileCoord, message: String) -> Self {
        Self {
            status: TileStatus::Failed,
            error: Some(message),
            ..Self::new(tile)
        }
    }
}

/// The complete pass for one tile.
pub struct TilePipeline {
    grid: Arc<dyn WorldGrid>,
    base: BaseTerrain,
    engine: DecorationEngine,
    integrator: TerrainIntegrator,
    watchdog: Arc<Watchdog>,
    reporter: Arc<dyn CrashReporter>,
}

impl TilePipeline {
    pub fn new(
        grid: Arc<dyn WorldGrid>,
        base: BaseTerrain,
        engine: DecorationEngine,
        integrator: TerrainIntegrator,
        watchdog: Arc<Watchdog>,
        reporter: Arc<dyn CrashReporter>,
    ) -> Self {
        Self {
            grid,
            base,
            engine,
            integrator,
            watchdog,
            reporter,
        }
    }

    /// The built-in overworld: noise heightmap, noise biomes, the default
    /// content registry, and a watchdog configured from `config`.
    pub fn overworld(
        config: &Config,
        grid: Arc<dyn WorldGrid>,
        reporter: Arc<dyn CrashReporter>,
    ) -> Result<Self, ContentError> {
        let seed = config.generation.world_seed;
        let materials = Arc::new(MaterialRegistry::with_defaults());
        let biomes = Arc::new(BiomeRegistry::overworld(&materials));
        let classifier: Arc<dyn BiomeClassifier> =
            Arc::new(BiomeSampler::new(seed, WhittakerDiagram::overworld(&biomes)));
        let heights: Arc<dyn HeightmapProvider> = Arc::new(NoiseHeightmap::new(HeightmapParams {
            seed,
            ..HeightmapParams::default()
        }));

        let registry = ContentRegistry::default_overworld(&materials, &biomes)?;
        registry.validate(&config.content.disabled);

        let base = BaseTerrain::new(
            Arc::clone(&heights),
            Arc::clone(&classifier),
            Arc::clone(&biomes),
            &materials,
            config.generation.sea_level,
        )?;
        let engine = DecorationEngine::new(
            Arc::new(registry),
            classifier,
            heights,
            Arc::clone(&materials),
            DecorationSettings::from_config(config),
        );
        let integrator = TerrainIntegrator::from_config(&config.terrain, materials)?;
        let watchdog = Arc::new(Watchdog::new(&config.watchdog, Arc::clone(&reporter)));
        Ok(Self::new(grid, base, engine, integrator, watchdog, reporter))
    }

    pub fn grid(&self) -> &Arc<dyn WorldGrid> {
        &self.grid
    }

    pub fn engine(&self) -> &DecorationEngine {
        &self.engine
    }

    pub fn watchdog(&self) -> &Arc<Watchdog> {
        &self.watchdog
    }

    /// Fill, decorate, integrate. Never panics on item failures; a panic
    /// here means a failure outside item isolation.
    pub fn run(&self, tile: TileCoord, world_seed: u64) -> GeneratedTile {
        let grid = self.grid.as_ref();
        let mut out = GeneratedTile::new(tile);

        if let Err(e) = self.base.fill_base_terrain(grid, tile) {
            return self.fail(tile, world_seed, format!("base terrain: {e}"));
        }

        match self.engine.decorate_tile(grid, tile, world_seed, &self.watchdog) {
            Ok(report) => {
                if !report.failures.is_empty() {
                    out.status = TileStatus::Partial;
                }
                out.decoration = Some(report);
            }
            Err(DecorationError::ItemsFailed { stage, failures, .. }) => {
                warn!(%tile, %stage, failed = failures.len(), "decoration stopped after failed stage");
                out.status = TileStatus::Partial;
                out.error = Some(format!("{} item(s) failed in {stage}", failures.len()));
                out.failures = failures;
            }
            Err(e @ DecorationError::GenerationHang { .. }) => {
                out.status = TileStatus::Hung;
                out.error = Some(e.to_string());
                return out;
            }
        }
        if let Some(report) = &mut out.decoration {
            out.failures.append(&mut report.failures);
        }

        match self.integrate(tile, world_seed) {
            Ok(stats) => out.integration = stats,
            Err(PlacementError::Aborted) => {
                out.status = TileStatus::Hung;
                out.error = Some(format!("terrain integration of {tile} hung"));
            }
            Err(e) => return self.fail(tile, world_seed, format!("terrain integration: {e}")),
        }
        out
    }

    fn integrate(&self, tile: TileCoord, world_seed: u64) -> Result<IntegrationStats, PlacementError> {
        let biome = self.engine.classify(tile);
        let pieces = self
            .engine
            .pieces_near(world_seed, tile, self.integrator.settings().piece_search_blocks);
        let watch = self.watchdog.punch_in(tile, world_seed, Some(biome), None);
        let ticket = watch.begin_item(GenerationStage::TopLayerModification, Phase::Terrain, 0);
        let result = self.integrator.integrate(self.grid.as_ref(), tile, &pieces, Some(watch.abort_flag()));
        watch.end_item(ticket, TERRAIN_IDENTITY);
        result
    }

    fn fail(&self, tile: TileCoord, world_seed: u64, message: String) -> GeneratedTile {
        self.report_failure(tile, world_seed, &message);
        GeneratedTile::failed(tile, message)
    }

    /// Sends a tile-level failure to the crash reporter.
    pub fn report_failure(&self, tile: TileCoord, world_seed: u64, message: &str) {
        error!(%tile, "tile generation failed: {message}");
        let context = DiagnosticContext::for_tile(world_seed, tile);
        let cause = CrashCause::TileFailure {
            message: message.to_string(),
        };
        self.reporter.report(tile, &context, &cause);
    }
}

/// A request to generate one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationTask {
    pub tile: TileCoord,
    pub world_seed: u64,
}

/// Internal wrapper that carries the task and its cancellation flag.
struct QueuedTask {
    task: GenerationTask,
    cancelled: Arc<AtomicBool>,
}

/// State every worker, and the monitor that replaces hung workers, shares.
struct WorkerShared {
    pipeline: Arc<TilePipeline>,
    tasks: Receiver<QueuedTask>,
    results: Sender<GeneratedTile>,
    active_tasks: Arc<DashMap<TileCoord, Arc<AtomicBool>>>,
    in_flight: Arc<AtomicU64>,
    next_worker: AtomicUsize,
    respawned: AtomicU64,
}

impl WorkerShared {
    fn spawn_worker(self: &Arc<Self>) -> std::io::Result<JoinHandle<()>> {
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(self);
        std::thread::Builder::new()
            .name(format!("tile-worker-{id}"))
            .spawn(move || shared.work())
    }

    fn work(&self) {
        while let Ok(queued) = self.tasks.recv() {
            // Check cancellation before starting work.
            if queued.cancelled.load(Ordering::Relaxed) {
                self.in_flight.fetch_sub(1, Ordering::Relaxed);
                continue;
            }

            let GenerationTask { tile, world_seed } = queued.task;
            let start = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.pipeline.run(tile, world_seed)));
            let mut generated = outcome.unwrap_or_else(|payload| {
                let message = format!("panic: {}", panic_message(payload.as_ref()));
                self.pipeline.report_failure(tile, world_seed, &message);
                GeneratedTile::failed(tile, message)
            });
            generated.generation_time_us = start.elapsed().as_micros() as u64;
            let hung = generated.status == TileStatus::Hung;

            // settle the bookkeeping first so a receiver sees it done
            self.active_tasks
                .remove_if(&tile, |_, flag| Arc::ptr_eq(flag, &queued.cancelled));
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            if !queued.cancelled.load(Ordering::Relaxed) {
                let _ = self.results.send(generated);
            }

            if hung {
                // a replacement was spawned when the hang was detected
                info!(%tile, "retiring worker after hang");
                break;
            }
        }
    }
}

/// Runs [`TilePipeline`]s across a thread pool.
pub struct TileGenerator {
    task_sender: Sender<QueuedTask>,
    result_receiver: Receiver<GeneratedTile>,
    active_tasks: Arc<DashMap<TileCoord, Arc<AtomicBool>>>,
    in_flight: Arc<AtomicU64>,
    shared: Arc<WorkerShared>,
    shutdown: Option<Sender<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl TileGenerator {
    /// Creates the pool.
    ///
    /// # Arguments
    /// - `thread_count`: number of worker threads.
    /// - `max_concurrent`: queue depth; excess submissions are rejected.
    /// - `result_capacity`: bounded channel capacity for completed tiles.
    pub fn new(pipeline: Arc<TilePipeline>, thread_count: usize, max_concurrent: usize, result_capacity: usize) -> Self {
        let (task_sender, task_receiver) = bounded::<QueuedTask>(max_concurrent.max(1) * 2);
        let (result_sender, result_receiver) = bounded::<GeneratedTile>(result_capacity.max(1));
        let in_flight = Arc::new(AtomicU64::new(0));
        let active_tasks = Arc::new(DashMap::new());
        let hang_notices = pipeline.watchdog().hang_notices();

        let shared = Arc::new(WorkerShared {
            pipeline,
            tasks: task_receiver,
            results: result_sender,
            active_tasks: Arc::clone(&active_tasks),
            in_flight: Arc::clone(&in_flight),
            next_worker: AtomicUsize::new(0),
            respawned: AtomicU64::new(0),
        });
        for _ in 0..thread_count.max(1) {
            shared
                .spawn_worker()
                .expect("Failed to spawn tile generation worker thread");
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let monitor_shared = Arc::clone(&shared);
        let monitor = std::thread::Builder::new()
            .name("tile-worker-monitor".into())
            .spawn(move || monitor_hangs(&monitor_shared, &hang_notices, &shutdown_rx))
            .expect("Failed to spawn tile worker monitor thread");

        Self {
            task_sender,
            result_receiver,
            active_tasks,
            in_flight,
            shared,
            shutdown: Some(shutdown_tx),
            monitor: Some(monitor),
        }
    }

    /// Sizes the pool from `config`; zero threads means one per core, less
    /// two for the host.
    pub fn from_config(pipeline: Arc<TilePipeline>, config: &GenerationConfig) -> Self {
        let threads = if config.worker_threads == 0 {
            let cpus = num_cpus::get().max(2);
            (cpus - 2).max(1)
        } else {
            config.worker_threads
        };
        Self::new(pipeline, threads, config.max_in_flight, config.result_capacity)
    }

    /// Queue a tile for generation.
    ///
    /// Returns `Err(task)` if the queue is full.
    pub fn submit(&self, task: GenerationTask) -> Result<(), GenerationTask> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.active_tasks.insert(task.tile, Arc::clone(&cancelled));
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        self.task_sender
            .try_send(QueuedTask { task, cancelled })
            .map_err(|e| {
                self.in_flight.fetch_sub(1, Ordering::Relaxed);
                let task = e.into_inner().task;
                self.active_tasks.remove(&task.tile);
                task
            })
    }

    /// Cancel a pending or in-progress tile. No-op once it has completed.
    pub fn cancel(&self, tile: &TileCoord) {
        if let Some((_, cancelled)) = self.active_tasks.remove(tile) {
            cancelled.store(true, Ordering::Relaxed);
        }
    }

    /// Drain all completed tiles from the result channel.
    pub fn drain_results(&self) -> Vec<GeneratedTile> {
        self.result_receiver.try_iter().collect()
    }

    /// Submits every task, waiting for queue space as needed, and collects
    /// the results. Stops waiting at `timeout`.
    pub fn generate_all(&self, tasks: impl IntoIterator<Item = GenerationTask>, timeout: Duration) -> Vec<GeneratedTile> {
        let deadline = Instant::now() + timeout;
        let mut results = Vec::new();
        let mut submitted = 0;
        for task in tasks {
            let mut pending = task;
            loop {
                match self.submit(pending) {
                    Ok(()) => break,
                    Err(back) => {
                        if Instant::now() >= deadline {
                            warn!(tile = %back.tile, "gave up queueing tiles at the deadline");
                            return results;
                        }
                        pending = back;
                        results.extend(self.drain_results());
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
            }
            submitted += 1;
        }

        while results.len() < submitted {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.result_receiver.recv_timeout(remaining) {
                Ok(tile) => results.push(tile),
                Err(_) => {
                    warn!(received = results.len(), submitted, "timed out waiting for tiles");
                    break;
                }
            }
        }
        results
    }

    /// Number of tasks currently in flight (queued or executing).
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Returns `true` if a task for the given tile is currently pending.
    pub fn is_pending(&self, tile: &TileCoord) -> bool {
        self.active_tasks.contains_key(tile)
    }

    /// Workers started to replace hung ones.
    pub fn respawned_workers(&self) -> u64 {
        self.shared.respawned.load(Ordering::Relaxed)
    }

    pub fn pipeline(&self) -> &Arc<TilePipeline> {
        &self.shared.pipeline
    }
}

impl Drop for TileGenerator {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
    }
}

/// Replaces a worker for every hang the watchdog reports.
fn monitor_hangs(shared: &Arc<WorkerShared>, hangs: &Receiver<HangNotice>, shutdown: &Receiver<()>) {
    loop {
        select! {
            recv(hangs) -> notice => {
                let Ok(notice) = notice else { break };
                warn!(
                    tile = %notice.tile,
                    thread = %notice.thread,
                    identity = %notice.identity,
                    "worker hung, starting a replacement"
                );
                match shared.spawn_worker() {
                    Ok(_) => {
                        shared.respawned.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => error!("failed to spawn replacement worker: {e}"),
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
    debug!("tile worker monitor stopped");
}

#[cfg(test)]
mod tests {
    use strata_voxel::VoxelWorld;

    use super::*;
    use crate::biome::UniformBiome;
    use crate::crash::CollectingCrashReporter;
    use crate::heightmap::FlatHeightmap;

    fn base(materials: &MaterialRegistry, height: i32, sea_level: i32) -> BaseTerrain {
        let biomes = Arc::new(BiomeRegistry::overworld(materials));
        let plains = biomes.lookup_by_name("plains").unwrap();
        BaseTerrain::new(
            Arc::new(FlatHeightmap::new(height)),
            Arc::new(UniformBiome(plains)),
            biomes,
            materials,
            sea_level,
        )
        .unwrap()
    }

    fn pipeline(config: &Config) -> (Arc<TilePipeline>, Arc<CollectingCrashReporter>) {
        let reporter = Arc::new(CollectingCrashReporter::new());
        let grid: Arc<dyn WorldGrid> = Arc::new(VoxelWorld::new(config.generation.min_y, config.generation.max_y));
        let pipeline = TilePipeline::overworld(config, grid, Arc::clone(&reporter) as Arc<dyn CrashReporter>).unwrap();
        (Arc::new(pipeline), reporter)
    }

    #[test]
    fn test_base_fill_layers() {
        let materials = MaterialRegistry::with_defaults();
        let world = VoxelWorld::new(0, 127);
        let written = base(&materials, 64, 62).fill_base_terrain(&world, TileCoord::new(1, -1)).unwrap();
        assert_eq!(written, 16 * 16 * 65);

        let (x, z) = (16 + 3, -16 + 5);
        assert_eq!(world.block(IVec3::new(x, 64, z)), materials.lookup("grass_block").unwrap());
        assert_eq!(world.block(IVec3::new(x, 61, z)), materials.lookup("dirt").unwrap());
        assert_eq!(world.block(IVec3::new(x, 60, z)), materials.lookup("stone").unwrap());
        assert_eq!(world.block(IVec3::new(x, 65, z)), MaterialId::AIR);
    }

    #[test]
    fn test_base_fill_floods_to_sea_level() {
        let materials = MaterialRegistry::with_defaults();
        let world = VoxelWorld::new(0, 127);
        base(&materials, 50, 62).fill_base_terrain(&world, TileCoord::new(0, 0)).unwrap();
        let water = materials.lookup("water").unwrap();
        assert_eq!(world.block(IVec3::new(4, 51, 4)), water);
        assert_eq!(world.block(IVec3::new(4, 62, 4)), water);
        assert_eq!(world.block(IVec3::new(4, 63, 4)), MaterialId::AIR);
    }

    #[test]
    fn test_pipeline_runs_full_pass() {
        let mut config = Config::default();
        config.generation.world_seed = 42;
        let (pipeline, reporter) = pipeline(&config);
        let generated = pipeline.run(TileCoord::new(0, 0), 42);
        assert_ne!(generated.status, TileStatus::Failed, "{:?}", generated.error);
        assert_ne!(generated.status, TileStatus::Hung);
        let report = generated.decoration.expect("decoration report");
        assert!(report.items.iter().any(|r| r.identity == "ore_veins"));
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_generator_produces_every_tile() {
        let mut config = Config::default();
        config.generation.world_seed = 7;
        let (pipeline, _) = pipeline(&config);
        let generator = TileGenerator::new(pipeline, 4, 8, 16);

        let tasks: Vec<_> = TileCoord::new(0, 0)
            .neighborhood(1)
            .map(|tile| GenerationTask { tile, world_seed: 7 })
            .collect();
        let results = generator.generate_all(tasks.clone(), Duration::from_secs(60));

        assert_eq!(results.len(), tasks.len(), "Should receive all submitted tiles");
        for task in &tasks {
            assert!(results.iter().any(|r| r.tile == task.tile), "missing {}", task.tile);
        }
        assert_eq!(generator.in_flight_count(), 0);
    }

    #[test]
    fn test_delivered_tile_is_no_longer_in_flight() {
        let config = Config::default();
        let (pipeline, _) = pipeline(&config);
        let generator = TileGenerator::new(pipeline, 1, 8, 16);
        let tile = TileCoord::new(-2, 5);
        generator.submit(GenerationTask { tile, world_seed: 3 }).unwrap();

        let delivered = generator.result_receiver.recv_timeout(Duration::from_secs(60)).unwrap();
        assert_eq!(delivered.tile, tile);
        assert_eq!(generator.in_flight_count(), 0, "counted down before delivery");
        assert!(!generator.is_pending(&tile));
    }

    #[test]
    fn test_generation_is_order_independent() {
        let mut config = Config::default();
        config.generation.world_seed = 99;
        let tiles: Vec<_> = TileCoord::new(3, 3).neighborhood(1).collect();

        let (sequential, _) = pipeline(&config);
        for tile in &tiles {
            sequential.run(*tile, 99);
        }

        let (pooled, _) = pipeline(&config);
        let generator = TileGenerator::new(Arc::clone(&pooled), 4, 4, 16);
        let tasks = tiles.iter().rev().map(|&tile| GenerationTask { tile, world_seed: 99 });
        assert_eq!(generator.generate_all(tasks, Duration::from_secs(60)).len(), tiles.len());

        for tile in &tiles {
            assert_eq!(
                block_digest(sequential.grid().as_ref(), *tile),
                block_digest(pooled.grid().as_ref(), *tile),
                "tile {tile} differs between sequential and pooled generation"
            );
        }
    }

    fn block_digest(grid: &dyn WorldGrid, tile: TileCoord) -> Vec<MaterialId> {
        let mut blocks = Vec::new();
        for lz in 0..TILE_SIZE {
            for lx in 0..TILE_SIZE {
                for y in grid.min_y()..=grid.max_y() {
                    blocks.push(grid.block(tile.block_pos(lx, y, lz)));
                }
            }
        }
        blocks
    }

    #[test]
    fn test_cancelled_task_is_not_delivered() {
        let config = Config::default();
        let (pipeline, _) = pipeline(&config);
        let generator = TileGenerator::new(pipeline, 1, 8, 16);
        let tile = TileCoord::new(50, 50);
        generator.submit(GenerationTask { tile, world_seed: 0 }).unwrap();
        assert!(generator.is_pending(&tile));
        generator.cancel(&tile);
        assert!(!generator.is_pending(&tile));

        let deadline = Instant::now() + Duration::from_secs(30);
        while generator.in_flight_count() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(generator.drain_results().iter().all(|r| r.tile != tile));
    }
}
