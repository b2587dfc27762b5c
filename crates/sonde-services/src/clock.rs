//! Node tick clock. One tick is one millisecond since the node started.

use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct TickClock {
    origin: Instant,
}

impl TickClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Current tick. Wraps after ~49 days, like the hardware counter.
    pub fn now(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}

/// Duration of `n` ticks.
pub fn ticks(n: u32) -> Duration {
    Duration::from_millis(n as u64)
}
