//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub watchdog: WatchdogConfig,
    pub terrain: TerrainConfig,
    pub content: ContentConfig,
    pub debug: DebugConfig,
}

/// What a tile's decoration pass does after an item fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Finish the current stage, then return the collected failures.
    #[default]
    Propagate,
    /// Record failures and keep going through every stage.
    LogAndContinue,
}

/// What the region guard does when a structure leaves its allowed area.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum BoundsPolicy {
    /// Warn and keep the out-of-range box.
    #[default]
    Log,
    /// Warn and clamp the box back into the allowed area.
    Clamp,
}

/// Tile generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub world_seed: u64,
    /// Worker threads in the tile pool. 0 picks one per core, leaving one spare.
    pub worker_threads: usize,
    /// Tiles submitted but not yet finished before `submit` starts refusing.
    pub max_in_flight: usize,
    /// Capacity of the finished-tile channel.
    pub result_capacity: usize,
    /// How many tiles around the tile under generation a structure may touch.
    pub region_radius: i32,
    /// How many tiles around the tile to look for structure starts.
    pub structure_search_radius: i32,
    pub failure_policy: FailurePolicy,
    pub bounds_policy: BoundsPolicy,
    pub min_y: i32,
    pub max_y: i32,
    pub sea_level: i32,
}

/// Hang detection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    /// Items slower than this are logged as slow.
    pub warn_ms: u64,
    /// Items slower than this abort the tile and produce a crash report.
    pub hang_ms: u64,
    /// How often the supervisor thread checks active slots.
    pub poll_interval_ms: u64,
    /// Slow items remembered per slot for crash reports.
    pub slow_history: usize,
}

/// Structure-aware terrain integration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    pub enabled: bool,
    /// Base radius around a piece, as a fraction of its shorter side.
    pub base_scale: f32,
    /// Height of the overhang cut above buried pieces.
    pub overhang: f32,
    /// Pieces this many blocks outside a tile are still considered.
    pub piece_search_blocks: i32,
    /// Material used to build up ground under raised pieces.
    pub fill_material: String,
    /// Materials the overhang carve may replace with air.
    pub carvable: Vec<String>,
}

/// Content toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContentConfig {
    /// Structure and feature identities the decoration engine skips.
    pub disabled: Vec<String>,
}

/// Debug/diagnostic settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter (e.g. "info", "debug,strata_terrain=trace").
    pub log_level: String,
    /// Directory for JSON crash reports. Reports only go to the log when unset.
    pub crash_report_dir: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            world_seed: 0,
            worker_threads: 0,
            max_in_flight: 256,
            result_capacity: 256,
            region_radius: 1,
            structure_search_radius: 1,
            failure_policy: FailurePolicy::default(),
            bounds_policy: BoundsPolicy::default(),
            min_y: 0,
            max_y: 255,
            sea_level: 62,
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warn_ms: 50,
            hang_ms: 60_000,
            poll_interval_ms: 250,
            slow_history: 32,
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_scale: 0.75,
            overhang: 8.0,
            piece_search_blocks: 12,
            fill_material: "stone".to_string(),
            carvable: [
                "stone",
                "dirt",
                "grass_block",
                "sand",
                "sandstone",
                "gravel",
                "snow_block",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            crash_report_dir: None,
        }
    }
}

/// Platform config directory for strata, e.g. `~/.config/strata` on Linux.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("strata")
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

impl Config {
    /// Loads `config.ron` from `config_dir`, writing a default one if absent.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join("config.ron"), serialized).map_err(ConfigError::WriteError)
    }

    /// Re-reads the file; `Some` only when it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join("config.ron"))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = ron::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;
        if generation.min_y >= generation.max_y {
            return Err(invalid(
                "generation.min_y",
                format!("{} must be below max_y {}", generation.min_y, generation.max_y),
            ));
        }
        if generation.region_radius < 0 || generation.structure_search_radius < 0 {
            return Err(invalid("generation.region_radius", "radii must not be negative".to_string()));
        }
        if self.watchdog.enabled && self.watchdog.hang_ms <= self.watchdog.warn_ms {
            return Err(invalid(
                "watchdog.hang_ms",
                format!("{} must exceed warn_ms {}", self.watchdog.hang_ms, self.watchdog.warn_ms),
            ));
        }
        if self.watchdog.poll_interval_ms == 0 {
            return Err(invalid("watchdog.poll_interval_ms", "must be at least 1".to_string()));
        }
        if self.terrain.base_scale.is_nan() || self.terrain.base_scale <= 0.0 || self.terrain.overhang < 0.0 {
            return Err(invalid(
                "terrain.base_scale",
                "base_scale must be positive and overhang non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether an item identity was switched off in `content.disabled`.
    pub fn is_disabled(&self, identity: &str) -> bool {
        self.content.disabled.iter().any(|d| d == identity)
    }
}
