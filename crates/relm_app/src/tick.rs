//! Fixed-rate tick loop driving a [`World`].

use std::time::{Duration, Instant};

use relm_ecs::World;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Configuration for the tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    /// Time budget of one tick. The rate must be finite and positive.
    pub fn tick_duration(&self) -> anyhow::Result<Duration> {
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            anyhow::bail!("tick rate must be a positive number, got {}", self.tick_rate);
        }
        Ok(Duration::try_from_secs_f64(1.0 / self.tick_rate)?)
    }
}

/// Counters kept across the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub overruns: u64,
}

#[derive(Debug)]
pub struct TickLoop {
    config: TickConfig,
    stats: TickStats,
}

impl TickLoop {
    #[must_use]
    pub fn new(config: TickConfig) -> Self {
        Self {
            config,
            stats: TickStats::default(),
        }
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    /// Run one update. A failed tick is logged and counted; the world has
    /// already closed the tick window, so the loop carries on.
    pub fn tick(&mut self, world: &mut World, delta: f64) {
        self.stats.ticks += 1;
        match world.update(delta) {
            Ok(report) => {
                debug!(version = report.version, systems = report.ran.len(), "tick done");
                if !report.is_clean() {
                    self.stats.failed_ticks += 1;
                }
            }
            Err(err) => {
                self.stats.failed_ticks += 1;
                error!(version = world.version(), error = %err, "tick aborted");
            }
        }
    }

    /// Run until `max_ticks` is reached, or forever.
    pub async fn run(&mut self, world: &mut World) -> anyhow::Result<()> {
        let budget = self.config.tick_duration()?;
        let mut interval = tokio::time::interval(budget);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            interval.tick().await;
            let start = Instant::now();
            let delta = start.duration_since(last).as_secs_f64();
            last = start;

            self.tick(world, delta);

            let elapsed = start.elapsed();
            if elapsed > budget {
                self.stats.overruns += 1;
                warn!(
                    version = world.version(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }

            if self.config.max_ticks > 0 && self.stats.ticks >= self.config.max_ticks {
                info!(ticks = self.stats.ticks, failed = self.stats.failed_ticks, "tick loop complete");
                return Ok(());
            }
        }
    }
}
