//! Hardware information injected into the sizing policy.
//!
//! Constructed explicitly by the host application and passed by reference
//! into the [`PoolManager`](super::PoolManager), so tests can substitute a
//! fake processor count instead of relying on hidden global state.

use std::num::NonZeroUsize;
use std::thread;

/// Description of the hardware the simulation is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareEnvironment {
    logical_cores: usize,
}

impl HardwareEnvironment {
    /// Detects the hardware concurrency of the current machine, floored at 1
    /// when the platform cannot report it.
    pub fn detect() -> Self {
        let logical_cores = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self { logical_cores }
    }

    /// Creates an environment with an explicit core count, floored at 1.
    pub fn with_logical_cores(logical_cores: usize) -> Self {
        Self {
            logical_cores: logical_cores.max(1),
        }
    }

    /// Gets the number of logical processors.
    pub fn logical_cores(&self) -> usize {
        self.logical_cores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detected_core_count_is_at_least_one() {
        assert!(HardwareEnvironment::detect().logical_cores() >= 1);
    }

    #[test]
    fn explicit_core_count_is_floored_at_one() {
        assert_eq!(HardwareEnvironment::with_logical_cores(0).logical_cores(), 1);
        assert_eq!(HardwareEnvironment::with_logical_cores(8).logical_cores(), 8);
    }
}
