//! Per-agent execution throttle
//!
//! All agents share one global tick. An agent with update frequency `N`
//! runs its body on one tick out of `N`, starting with the first tick after
//! [`UpdateThrottle::start`].

/// Cycle counter deciding whether an agent runs on a given tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateThrottle {
    frequency: u32,
    counter: u32,
}

impl UpdateThrottle {
    /// `frequency` is clamped to at least 1.
    pub fn new(frequency: u32) -> Self {
        Self {
            frequency: frequency.max(1),
            counter: 0,
        }
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Prime the counter so the next tick runs.
    pub fn start(&mut self) {
        self.counter = self.frequency;
    }

    /// Advance one tick. Returns `true` when the agent body is due.
    pub fn tick(&mut self) -> bool {
        self.counter = self.counter.saturating_add(1);
        if self.counter >= self.frequency {
            self.counter = 0;
            true
        } else {
            false
        }
    }
}
