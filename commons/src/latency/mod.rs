use std::time::Duration;

use rand::Rng;

/// Supplies the artificial processing delay for each handled call.
pub trait LatencySource: Send + Sync + 'static {
    fn next_delay(&self) -> Duration;
}

/// `base + U[0, spread)` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLatency {
    base_ms: u64,
    spread_ms: u64,
}

impl UniformLatency {
    /// 100-189 ms, the greeting handler's range.
    pub const GREETING: UniformLatency = UniformLatency::new(100, 90);
    /// 10-99 ms, the ping endpoint's range.
    pub const PING: UniformLatency = UniformLatency::new(10, 90);

    pub const fn new(base_ms: u64, spread_ms: u64) -> Self {
        Self { base_ms, spread_ms }
    }

    pub fn min(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    /// Largest delay this source can produce.
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.base_ms + self.spread_ms.saturating_sub(1))
    }
}

impl LatencySource for UniformLatency {
    fn next_delay(&self) -> Duration {
        let jitter = if self.spread_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..self.spread_ms)
        };
        Duration::from_millis(self.base_ms + jitter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedLatency(pub Duration);

impl FixedLatency {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

impl LatencySource for FixedLatency {
    fn next_delay(&self) -> Duration {
        self.0
    }
}
