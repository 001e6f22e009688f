//! Background dream scheduler
//!
//! One tokio task per engine. Every tick fades the store and runs a dream
//! cycle; commands arrive over an mpsc channel and are honored while a cycle
//! is running.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::MemoryEngine;

/// Default time between dream cycles (1 hour)
pub const DEFAULT_DREAM_INTERVAL_SECS: u64 = 3600;

/// Default fraction of importance kept per day by the scheduled fade
pub const DEFAULT_DECAY_RATE: f64 = 0.95;

const COMMAND_BUFFER: usize = 16;

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between cycles
    pub interval: Duration,
    /// Passed to `fade_memories` before each cycle
    pub decay_rate: f64,
    /// Run a cycle as soon as the task starts
    pub run_on_start: bool,
    /// Save the store here after every cycle
    pub state_path: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_DREAM_INTERVAL_SECS),
            decay_rate: DEFAULT_DECAY_RATE,
            run_on_start: false,
            state_path: None,
        }
    }
}

impl SchedulerConfig {
    /// Defaults overridden by `REVERIE_DREAM_INTERVAL_SECS`,
    /// `REVERIE_DECAY_RATE` and `REVERIE_DREAM_ON_START`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = std::env::var("REVERIE_DREAM_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
        {
            config.interval = Duration::from_secs(secs);
        }
        if let Some(rate) = std::env::var("REVERIE_DECAY_RATE")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|r| (0.0..=1.0).contains(r))
        {
            config.decay_rate = rate;
        }
        if let Some(on_start) = std::env::var("REVERIE_DREAM_ON_START")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
        {
            config.run_on_start = on_start;
        }

        config
    }
}

/// Commands accepted by a running scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Start a cycle now unless one is running
    RunNow,
    /// Stop the running cycle after its current stage
    Interrupt,
    /// Interrupt any running cycle and end the task
    Shutdown,
}

/// Owner side of a spawned scheduler
#[derive(Debug)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Send a command; `false` if the scheduler has stopped
    pub async fn send(&self, command: SchedulerCommand) -> bool {
        self.tx.send(command).await.is_ok()
    }

    /// Request an immediate cycle
    pub async fn trigger(&self) -> bool {
        self.send(SchedulerCommand::RunNow).await
    }

    /// Interrupt the running cycle, if any
    pub async fn interrupt(&self) -> bool {
        self.send(SchedulerCommand::Interrupt).await
    }

    /// Whether the task has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the scheduler and wait for the task to end
    pub async fn shutdown(self) {
        let _ = self.tx.send(SchedulerCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!("Dream scheduler task failed: {}", e);
        }
    }
}

/// Periodic driver of fade + dream cycles
pub struct DreamScheduler {
    engine: MemoryEngine,
    config: SchedulerConfig,
    rx: mpsc::Receiver<SchedulerCommand>,
}

impl DreamScheduler {
    /// Start the scheduler on the current tokio runtime
    pub fn spawn(engine: MemoryEngine, config: SchedulerConfig) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        info!(
            interval_secs = config.interval.as_secs(),
            decay_rate = config.decay_rate,
            run_on_start = config.run_on_start,
            "Dream scheduler starting"
        );
        let scheduler = Self { engine, config, rx };
        let task = tokio::spawn(scheduler.run());
        SchedulerHandle { tx, task }
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.config.run_on_start {
            // The first tick completes immediately
            ticker.tick().await;
        }

        loop {
            let run = tokio::select! {
                _ = ticker.tick() => true,
                command = self.rx.recv() => match command {
                    Some(SchedulerCommand::RunNow) => true,
                    Some(SchedulerCommand::Interrupt) => {
                        debug!("Interrupt received while idle");
                        false
                    }
                    Some(SchedulerCommand::Shutdown) | None => break,
                },
            };

            if run && !self.run_watched_cycle().await {
                break;
            }
        }

        info!("Dream scheduler stopped");
    }

    /// Run one cycle while still listening for commands
    ///
    /// Returns `false` when the scheduler should stop.
    async fn run_watched_cycle(&mut self) -> bool {
        let cycle = run_cycle(self.engine.clone(), self.config.clone());
        tokio::pin!(cycle);

        let mut stopping = false;
        loop {
            tokio::select! {
                _ = &mut cycle => return !stopping,
                command = self.rx.recv(), if !stopping => match command {
                    Some(SchedulerCommand::RunNow) => debug!("Dream cycle already running"),
                    Some(SchedulerCommand::Interrupt) => {
                        self.engine.interrupt_dreaming();
                    }
                    Some(SchedulerCommand::Shutdown) | None => {
                        self.engine.interrupt_dreaming();
                        stopping = true;
                    }
                },
            }
        }
    }
}

async fn run_cycle(engine: MemoryEngine, config: SchedulerConfig) {
    match engine.fade_memories(config.decay_rate) {
        Ok(report) => debug!(
            faded = report.records_faded,
            cleared = report.activations_cleared,
            "Scheduled fade complete"
        ),
        Err(e) => warn!("Scheduled fade failed: {}", e),
    }

    match engine.dream().await {
        Ok(report) if report.skipped => debug!("Scheduled dream skipped, cycle already running"),
        Ok(report) => info!(
            created = report.total_created(),
            removed = report.total_removed(),
            interrupted = report.interrupted,
            duration_ms = report.duration_ms,
            "Scheduled dream complete"
        ),
        Err(e) => warn!("Scheduled dream failed: {}", e),
    }

    if let Some(path) = &config.state_path {
        if let Err(e) = engine.save_state(path) {
            warn!(path = %path.display(), "Failed to save memory state: {}", e);
        }
    }
}
