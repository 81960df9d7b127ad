//! Supervisor thread that scans worker slots for hung items.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use strata_config::WatchdogConfig;
use strata_math::TileCoord;
use tracing::{debug, error, warn};

use super::WatchdogContext;
use super::slot::{WatchdogSlot, unpack};
use super::timer::DeadlineTimer;
use crate::biome::BiomeId;
use crate::content::StagedContent;
use crate::crash::{CrashCause, CrashReporter, DiagnosticContext, current_thread_name, unix_millis};
use crate::stage::{GenerationStage, Phase};

/// Sent once per hung tile so the owner can replace the stuck worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HangNotice {
    pub tile: TileCoord,
    pub thread: String,
    pub stage: GenerationStage,
    pub phase: Phase,
    pub identity: String,
    pub elapsed_ms: u64,
}

/// Hang notices queued before further ones are dropped.
pub const HANG_NOTICE_CAPACITY: usize = 64;

pub(crate) struct WatchdogShared {
    pub(crate) timer: DeadlineTimer,
    pub(crate) slots: DashMap<u64, Arc<WatchdogSlot>>,
    next_id: AtomicU64,
    reporter: Arc<dyn CrashReporter>,
    hang_tx: Sender<HangNotice>,
    hang_rx: Receiver<HangNotice>,
    slow_history: usize,
    hangs: AtomicU64,
}

impl WatchdogShared {
    fn sweep(&self) -> usize {
        // Clone out first so no shard lock is held while reporting.
        let slots: Vec<Arc<WatchdogSlot>> = self
            .slots
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut detected = 0;
        for slot in slots {
            let word = slot.word();
            let Some(snapshot) = unpack(word) else {
                continue;
            };
            let elapsed_ms = self.timer.since_stamp(snapshot.started);
            if !self.timer.is_hung(elapsed_ms) || !slot.claim_hung(word) {
                continue;
            }
            if slot.aborted.swap(true, Ordering::AcqRel) {
                continue;
            }

            let identity = slot.identity(&snapshot);
            let context = DiagnosticContext {
                timestamp_ms: unix_millis(),
                world_seed: slot.world_seed,
                tile: slot.tile,
                biome: slot.biome,
                stage: Some(snapshot.stage),
                phase: Some(snapshot.phase),
                identity: Some(identity.clone()),
                elapsed_ms,
                hang_limit_ms: self.timer.hang_ms(),
                thread: slot.thread.clone(),
                slow_items: slot.slow_items(),
            };
            let cause = CrashCause::GenerationHang {
                elapsed_ms,
                limit_ms: self.timer.hang_ms(),
            };
            error!(
                tile = %slot.tile,
                stage = %snapshot.stage,
                phase = %snapshot.phase,
                identity = %identity,
                elapsed_ms,
                thread = %slot.thread,
                "generation hang detected"
            );
            self.reporter.report(slot.tile, &context, &cause);
            let notice = HangNotice {
                tile: slot.tile,
                thread: slot.thread.clone(),
                stage: snapshot.stage,
                phase: snapshot.phase,
                identity,
                elapsed_ms,
            };
            if self.hang_tx.try_send(notice).is_err() {
                debug!(tile = %slot.tile, "hang notice queue full, notice dropped");
            }
            self.hangs.fetch_add(1, Ordering::Relaxed);
            detected += 1;
        }
        detected
    }
}

/// Watches every worker's current item against the hang deadline.
///
/// Detection is cooperative: a hung slot gets its abort flag set, a crash
/// report is raised exactly once, and a [`HangNotice`] is queued. The worker
/// observes the flag at its next checkpoint and stops the tile.
pub struct Watchdog {
    shared: Arc<WatchdogShared>,
    enabled: bool,
    shutdown: Option<Sender<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Creates a watchdog and, when enabled, starts its supervisor thread.
    pub fn new(config: &WatchdogConfig, reporter: Arc<dyn CrashReporter>) -> Self {
        let mut watchdog = Self::manual(config, reporter);
        if !config.enabled {
            watchdog.enabled = false;
            return watchdog;
        }

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let shared = Arc::clone(&watchdog.shared);
        let poll = Duration::from_millis(config.poll_interval_ms.max(1));
        let spawned = std::thread::Builder::new()
            .name("strata-watchdog".into())
            .spawn(move || {
                debug!("watchdog supervisor started");
                loop {
                    match shutdown_rx.recv_timeout(poll) {
                        Err(RecvTimeoutError::Timeout) => {
                            shared.sweep();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("watchdog supervisor stopped");
            });

        match spawned {
            Ok(handle) => {
                watchdog.shutdown = Some(shutdown_tx);
                watchdog.supervisor = Some(handle);
            }
            Err(e) => warn!("failed to spawn watchdog supervisor, hangs will not be detected: {e}"),
        }
        watchdog
    }

    /// A watchdog without a supervisor thread; call [`sweep`](Self::sweep)
    /// to check for hangs.
    pub fn manual(config: &WatchdogConfig, reporter: Arc<dyn CrashReporter>) -> Self {
        let (hang_tx, hang_rx) = crossbeam_channel::bounded(HANG_NOTICE_CAPACITY);
        Self {
            shared: Arc::new(WatchdogShared {
                timer: DeadlineTimer::from_config(config),
                slots: DashMap::new(),
                next_id: AtomicU64::new(0),
                reporter,
                hang_tx,
                hang_rx,
                slow_history: config.slow_history,
                hangs: AtomicU64::new(0),
            }),
            enabled: true,
            shutdown: None,
            supervisor: None,
        }
    }

    /// Never reports hangs. Slow items are still timed and logged.
    pub fn disabled() -> Self {
        let config = WatchdogConfig {
            enabled: false,
            ..WatchdogConfig::default()
        };
        let mut watchdog = Self::manual(&config, Arc::new(crate::crash::LogCrashReporter));
        watchdog.enabled = false;
        watchdog
    }

    /// Registers the calling thread's slot for `tile`. The slot is removed
    /// when the returned context is dropped.
    pub fn punch_in(
        &self,
        tile: TileCoord,
        world_seed: u64,
        biome: Option<BiomeId>,
        content: Option<Arc<StagedContent>>,
    ) -> WatchdogContext {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(WatchdogSlot::new(
            tile,
            world_seed,
            biome,
            current_thread_name(),
            content,
            self.shared.slow_history,
        ));
        self.shared.slots.insert(id, Arc::clone(&slot));
        WatchdogContext::new(Arc::clone(&self.shared), id, slot)
    }

    /// Checks every active slot once. Returns the number of newly hung slots.
    pub fn sweep(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        self.shared.sweep()
    }

    pub fn hang_notices(&self) -> Receiver<HangNotice> {
        self.shared.hang_rx.clone()
    }

    pub fn timer(&self) -> &DeadlineTimer {
        &self.shared.timer
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn active_slots(&self) -> usize {
        self.shared.slots.len()
    }

    /// Total hangs detected since creation.
    pub fn hangs_detected(&self) -> u64 {
        self.shared.hangs.load(Ordering::Relaxed)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.join();
        }
    }
}
