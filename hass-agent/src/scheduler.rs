//! Tick driver
//!
//! All agents share one fixed-interval tick. Ticks are aligned to interval
//! boundaries shifted by a random per-process phase, so hosts started
//! together do not all publish in the same instant.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::agents::Agent;
use crate::error::{AgentError, Result};

/// Pause between agent start-up and the single cycle of a bounded run.
pub const WARM_UP: Duration = Duration::from_secs(10);

pub struct Scheduler {
    interval: Duration,
    phase: Duration,
}

impl Scheduler {
    /// Scheduler with a random phase in `[0, interval)`.
    pub fn new(interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1) as u64;
        let phase = Duration::from_millis(rand::thread_rng().gen_range(0..interval_ms));
        Self::with_phase(interval, phase)
    }

    pub fn with_phase(interval: Duration, phase: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            phase,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn phase(&self) -> Duration {
        self.phase
    }

    /// Time from `now_ms` (Unix milliseconds) to the next tick boundary.
    ///
    /// A `now` exactly on a boundary waits a full interval.
    pub fn delay_until_next_tick(&self, now_ms: i64) -> Duration {
        let interval = self.interval.as_millis() as i64;
        let phase = self.phase.as_millis() as i64;
        let elapsed = (now_ms - phase).rem_euclid(interval);
        Duration::from_millis((interval - elapsed) as u64)
    }

    /// Tick forever. Agent failures are logged and never stop the loop.
    pub async fn run_forever(&self, agents: &mut [Agent]) {
        info!(
            "Ticking every {}s with phase {}ms",
            self.interval.as_secs(),
            self.phase.as_millis()
        );

        loop {
            let delay = self.delay_until_next_tick(Utc::now().timestamp_millis());
            debug!("Next tick in {}ms", delay.as_millis());
            tokio::time::sleep(delay).await;

            tick_all(agents).await;
        }
    }

    /// One warm-up pause, then a single tick. Fails with the first agent
    /// error after every agent has run.
    pub async fn run_once(&self, agents: &mut [Agent], warm_up: Duration) -> Result<()> {
        debug!("Warming up for {}s", warm_up.as_secs());
        tokio::time::sleep(warm_up).await;

        match tick_all(agents).await.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Start every agent. Failures are logged; the agent still ticks.
pub async fn start_all(agents: &mut [Agent]) {
    for agent in agents.iter_mut() {
        if let Err(e) = agent.start().await {
            warn!("{}: start failed: {}", agent.label(), e);
        }
    }
}

/// Tick every agent in order and collect their failures.
async fn tick_all(agents: &mut [Agent]) -> Vec<AgentError> {
    let mut failures = Vec::new();
    for agent in agents.iter_mut() {
        if let Err(e) = agent.tick().await {
            if e.is_connection() {
                warn!("{}: cycle aborted: {}", agent.label(), e);
            } else {
                error!("{}: {}", agent.label(), e);
            }
            failures.push(e);
        }
    }
    failures
}
