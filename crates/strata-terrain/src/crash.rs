//! Crash reporting for hung or failed tiles.
//!
//! A report carries enough to reproduce the problem: world seed, tile,
//! biome, stage, phase, the item that was running, and the slow items seen
//! before it. Reporters are pluggable; the server fans out to the log and,
//! when configured, to JSON files.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use strata_math::TileCoord;
use thiserror::Error;
use tracing::{error, info};

use crate::biome::BiomeId;
use crate::stage::{GenerationStage, Phase};
use crate::watchdog::SlowItem;

#[derive(Debug, Error)]
pub enum CrashReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What was happening on the worker when the report was raised.
#[derive(Clone, Debug, Serialize)]
pub struct DiagnosticContext {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub world_seed: u64,
    pub tile: TileCoord,
    pub biome: Option<BiomeId>,
    pub stage: Option<GenerationStage>,
    pub phase: Option<Phase>,
    pub identity: Option<String>,
    pub elapsed_ms: u64,
    pub hang_limit_ms: u64,
    pub thread: String,
    pub slow_items: Vec<SlowItem>,
}

impl DiagnosticContext {
    /// Context with only the tile known, stamped with the calling thread.
    pub fn for_tile(world_seed: u64, tile: TileCoord) -> Self {
        Self {
            timestamp_ms: unix_millis(),
            world_seed,
            tile,
            biome: None,
            stage: None,
            phase: None,
            identity: None,
            elapsed_ms: 0,
            hang_limit_ms: 0,
            thread: current_thread_name(),
            slow_items: Vec::new(),
        }
    }

    /// Plain-text rendering, one section per concern.
    pub fn render(&self, cause: &CrashCause) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "---- Tile Generation Crash ----");
        let _ = writeln!(out, "Cause: {cause}");
        let _ = writeln!(out);
        let _ = writeln!(out, "-- Current Tile --");
        let _ = writeln!(out, "\tPos: {}", self.tile);
        let _ = writeln!(out, "\tSeed: {}", self.world_seed);
        if let Some(biome) = self.biome {
            let _ = writeln!(out, "\tBiome: {}", biome.0);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "-- Generation Watchdog --");
        let _ = writeln!(out, "\tThread: {}", self.thread);
        if let Some(stage) = self.stage {
            let _ = writeln!(out, "\tStage: {stage}");
        }
        if let Some(phase) = self.phase {
            let _ = writeln!(out, "\tPhase: {phase}");
        }
        if let Some(identity) = &self.identity {
            let _ = writeln!(out, "\tIdentifier: {identity}");
        }
        let _ = writeln!(out, "\tElapsed: {}ms", self.elapsed_ms);
        let _ = writeln!(out, "\tHang limit: {}ms", self.hang_limit_ms);
        if !self.slow_items.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "-- Slow Items --");
            for item in &self.slow_items {
                let _ = writeln!(
                    out,
                    "\t{} {} '{}' took {}ms",
                    item.stage, item.phase, item.identity, item.duration_ms
                );
            }
        }
        out
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrashCause {
    /// An item ran past the hard deadline.
    GenerationHang { elapsed_ms: u64, limit_ms: u64 },
    /// A tile-level failure outside item isolation.
    TileFailure { message: String },
}

impl std::fmt::Display for CrashCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GenerationHang {
                elapsed_ms,
                limit_ms,
            } => write!(f, "generation hang ({elapsed_ms}ms > {limit_ms}ms)"),
            Self::TileFailure { message } => write!(f, "tile failure: {message}"),
        }
    }
}

/// A stored report.
#[derive(Clone, Debug, Serialize)]
pub struct CrashReport {
    pub tile: TileCoord,
    pub context: DiagnosticContext,
    pub cause: CrashCause,
}

pub trait CrashReporter: Send + Sync {
    fn report(&self, tile: TileCoord, context: &DiagnosticContext, cause: &CrashCause);
}

/// Writes the rendered report to the log at error level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogCrashReporter;

impl CrashReporter for LogCrashReporter {
    fn report(&self, tile: TileCoord, context: &DiagnosticContext, cause: &CrashCause) {
        error!(%tile, %cause, "tile generation crash\n{}", context.render(cause));
    }
}

/// Writes each report as a pretty-printed JSON file.
#[derive(Debug)]
pub struct FileCrashReporter {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl FileCrashReporter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, report: &CrashReport) -> Result<PathBuf, CrashReportError> {
        std::fs::create_dir_all(&self.dir)?;
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "crash-{}-{}_{}-{n}.json",
            report.context.timestamp_ms, report.tile.x, report.tile.z
        );
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;
        info!("Crash report written to: {}", path.display());
        Ok(path)
    }

    /// Every `.json` report currently in the directory.
    pub fn pending_reports(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.path())
                    .filter(|p| p.extension().is_some_and(|e| e == "json"))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl CrashReporter for FileCrashReporter {
    fn report(&self, tile: TileCoord, context: &DiagnosticContext, cause: &CrashCause) {
        let report = CrashReport {
            tile,
            context: context.clone(),
            cause: cause.clone(),
        };
        if let Err(e) = self.write(&report) {
            error!(%tile, "failed to write crash report: {e}");
        }
    }
}

/// Keeps reports in memory for hosts that surface them elsewhere.
#[derive(Debug, Default)]
pub struct CollectingCrashReporter {
    reports: Mutex<Vec<CrashReport>>,
}

impl CollectingCrashReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<CrashReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CrashReporter for CollectingCrashReporter {
    fn report(&self, tile: TileCoord, context: &DiagnosticContext, cause: &CrashCause) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CrashReport {
                tile,
                context: context.clone(),
                cause: cause.clone(),
            });
    }
}

/// Forwards every report to each inner reporter in order.
#[derive(Default)]
pub struct FanoutCrashReporter {
    sinks: Vec<Arc<dyn CrashReporter>>,
}

impl FanoutCrashReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn CrashReporter>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl CrashReporter for FanoutCrashReporter {
    fn report(&self, tile: TileCoord, context: &DiagnosticContext, cause: &CrashCause) {
        for sink in &self.sinks {
            sink.report(tile, context, cause);
        }
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub(crate) fn current_thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}
