//! Monitor port selection.

use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default range the wrapper's monitor port is drawn from.
pub const MONITOR_PORT_RANGE: RangeInclusive<u16> = 10000..=32767;

/// Picks pseudo-random monitor ports.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: RangeInclusive<u16>,
    rng: StdRng,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(MONITOR_PORT_RANGE)
    }
}

impl PortAllocator {
    /// Creates an allocator seeded from the OS.
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self {
            range: normalize(range),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Creates an allocator with a fixed seed.
    pub fn seeded(range: RangeInclusive<u16>, seed: u64) -> Self {
        Self {
            range: normalize(range),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Returns a port in range, never equal to `avoid` unless the range
    /// holds only that port.
    pub fn next_port(&mut self, avoid: Option<u16>) -> u16 {
        let (lo, hi) = (*self.range.start(), *self.range.end());
        match avoid {
            Some(bad) if lo < hi && self.range.contains(&bad) => {
                // Draw from one fewer slot and skip over the failed port.
                let port = self.rng.random_range(lo..=hi - 1);
                if port >= bad {
                    port + 1
                } else {
                    port
                }
            }
            _ => self.rng.random_range(lo..=hi),
        }
    }

    pub fn range(&self) -> &RangeInclusive<u16> {
        &self.range
    }
}

fn normalize(range: RangeInclusive<u16>) -> RangeInclusive<u16> {
    let (a, b) = (*range.start(), *range.end());
    a.min(b)..=a.max(b)
}
