//! Command-line arguments for the strata server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "strata", about = "Headless strata tile generator")]
pub struct CliArgs {
    /// World seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads (0 = one per core).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Generate tiles within this many tiles of the origin.
    #[arg(long, default_value_t = 2)]
    pub radius: i32,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Hard hang threshold in milliseconds.
    #[arg(long)]
    pub hang_ms: Option<u64>,

    /// Slow-item warning threshold in milliseconds.
    #[arg(long)]
    pub warn_ms: Option<u64>,

    /// Config directory (overrides the platform default).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(seed) = args.seed {
            self.generation.world_seed = seed;
        }
        if let Some(threads) = args.threads {
            self.generation.worker_threads = threads;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(hang) = args.hang_ms {
            self.watchdog.hang_ms = hang;
        }
        if let Some(warn) = args.warn_ms {
            self.watchdog.warn_ms = warn;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            seed: Some(42),
            hang_ms: Some(1_000),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.generation.world_seed, 42);
        assert_eq!(config.watchdog.hang_ms, 1_000);
        // untouched fields keep their defaults
        assert_eq!(config.watchdog.warn_ms, 50);
    }

    #[test]
    fn test_cli_no_override() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::try_parse_from([
            "strata", "--seed", "9", "--threads", "3", "--radius", "4", "--warn-ms", "10",
        ])
        .unwrap();
        assert_eq!(args.seed, Some(9));
        assert_eq!(args.threads, Some(3));
        assert_eq!(args.radius, 4);
        assert_eq!(args.warn_ms, Some(10));
        assert!(args.config.is_none());
    }
}
