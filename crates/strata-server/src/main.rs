//! Headless tile generator.
//!
//! Loads `config.ron` (CLI flags override it), generates every tile within
//! `--radius` of the origin on the worker pool and logs a summary.
//! Run with `cargo run -p strata-server -- --seed 42 --radius 3`.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use strata_config::{CliArgs, Config, default_config_dir};
use strata_math::TileCoord;
use strata_terrain::{
    CrashReporter, FanoutCrashReporter, FileCrashReporter, GenerationTask, LogCrashReporter, TileGenerator,
    TilePipeline, TileStatus,
};
use strata_voxel::{VoxelWorld, WorldGrid};
use tracing::{error, info, warn};

const GENERATE_TIMEOUT: Duration = Duration::from_secs(600);
const LOCATE_RINGS: i32 = 16;
const LOCATE_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("Invalid settings after command-line overrides: {e}");
        return ExitCode::FAILURE;
    }

    let log_dir = config_dir.join("logs");
    strata_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let mut reporter = FanoutCrashReporter::new().with(Arc::new(LogCrashReporter));
    if let Some(dir) = &config.debug.crash_report_dir {
        info!("Writing crash reports to {}", dir.display());
        reporter = reporter.with(Arc::new(FileCrashReporter::new(dir)));
    }
    let reporter: Arc<dyn CrashReporter> = Arc::new(reporter);

    let world = Arc::new(VoxelWorld::new(config.generation.min_y, config.generation.max_y));
    let grid: Arc<dyn WorldGrid> = Arc::clone(&world) as _;
    let pipeline = match TilePipeline::overworld(&config, grid, reporter) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            error!("Failed to build the generation pipeline: {e}");
            return ExitCode::FAILURE;
        }
    };

    let seed = config.generation.world_seed;
    report_nearest_structures(&pipeline, seed);

    let generator = TileGenerator::from_config(Arc::clone(&pipeline), &config.generation);
    let tasks: Vec<GenerationTask> = TileCoord::new(0, 0)
        .neighborhood(args.radius.max(0))
        .map(|tile| GenerationTask { tile, world_seed: seed })
        .collect();
    let expected = tasks.len();
    info!(seed, tiles = expected, "Generating tiles");

    let started = Instant::now();
    let results = generator.generate_all(tasks, GENERATE_TIMEOUT);

    let count = |status: TileStatus| results.iter().filter(|r| r.status == status).count();
    let placed: usize = results
        .iter()
        .filter_map(|r| r.decoration.as_ref())
        .map(|d| d.placed().count())
        .sum();
    let carved: usize = results.iter().map(|r| r.integration.blocks_carved).sum();
    let filled: usize = results.iter().map(|r| r.integration.blocks_filled).sum();
    info!(
        complete = count(TileStatus::Complete),
        partial = count(TileStatus::Partial),
        hung = count(TileStatus::Hung),
        failed = count(TileStatus::Failed),
        items_placed = placed,
        blocks_filled = filled,
        blocks_carved = carved,
        respawned_workers = generator.respawned_workers(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Generation finished"
    );
    info!("World content hash: {:016x}", world.content_hash());

    if results.len() < expected {
        warn!("{} of {} tiles did not finish in time", expected - results.len(), expected);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Logs the closest start of every registered structure to the origin.
fn report_nearest_structures(pipeline: &TilePipeline, seed: u64) {
    let engine = pipeline.engine();
    for structure in engine.registry().structures() {
        match engine
            .locator()
            .find_nearest(structure.as_ref(), seed, TileCoord::new(0, 0), LOCATE_RINGS, LOCATE_TIMEOUT)
        {
            Some(start) => info!(structure = structure.identity(), tile = %start.tile, "Nearest start"),
            None => info!(structure = structure.identity(), "No start within {LOCATE_RINGS} spacing cells"),
        }
    }
}
