//! Pool ownership and the injected sizing policy.

use std::sync::Arc;

use super::environment::HardwareEnvironment;
use super::pool::Pool;
use super::task::WorkerInitHook;
use crate::error::Error;

/// Policy deciding the maximum parallelism degree available to the
/// simulation.
///
/// Injected into the [`PoolManager`] so hosts with different threading
/// arrangements can share one dispatch engine instead of maintaining
/// near-duplicate pools that drift apart.
pub trait SizingPolicy {
    /// Computes the maximum number of execution contexts the simulation may
    /// use on the given hardware. Implementations must return at least 1.
    fn max_parallelism(&self, env: &HardwareEnvironment) -> usize;
}

/// Default sizing policy: use every logical core, minus one reserved for the
/// renderer when rendering runs on its own thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderAwareSizing {
    /// Whether rendering is multithreaded and deserves a reserved core.
    pub rendering_is_multithreaded: bool,
}

impl SizingPolicy for RenderAwareSizing {
    fn max_parallelism(&self, env: &HardwareEnvironment) -> usize {
        let reserved = usize::from(self.rendering_is_multithreaded);
        env.logical_cores().saturating_sub(reserved).max(1)
    }
}

/// Owns exactly one live [`Pool`] and the parallelism configuration.
///
/// Reconfiguration is destroy-and-recreate: a pool is never resized in
/// place. Batch submission goes through [`pool_mut`](PoolManager::pool_mut),
/// whose exclusive borrow serializes it against reconfiguration.
pub struct PoolManager {
    max_parallelism: usize,
    current_parallelism: usize,
    init_hook: WorkerInitHook,
    pool: Pool,
}

impl PoolManager {
    /// Creates a manager sized by `policy` against `env`, with the initial
    /// pool at maximum parallelism.
    ///
    /// The maximum is computed once, here; later [`set_parallelism`] calls
    /// are bounded by it.
    ///
    /// [`set_parallelism`]: PoolManager::set_parallelism
    pub fn new(
        env: &HardwareEnvironment,
        policy: &dyn SizingPolicy,
        init_hook: WorkerInitHook,
    ) -> Result<Self, Error> {
        let max_parallelism = policy.max_parallelism(env).max(1);
        let pool = Pool::new(max_parallelism, Arc::clone(&init_hook))?;
        log::info!(
            "pool manager initialized: {} logical core(s), max parallelism {max_parallelism}",
            env.logical_cores()
        );
        Ok(Self {
            max_parallelism,
            current_parallelism: max_parallelism,
            init_hook,
            pool,
        })
    }

    /// Gets the maximum parallelism degree computed at construction.
    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Gets the parallelism degree of the live pool.
    pub fn parallelism(&self) -> usize {
        self.current_parallelism
    }

    /// Gets the live pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Gets the live pool for batch submission.
    pub fn pool_mut(&mut self) -> &mut Pool {
        &mut self.pool
    }

    /// Replaces the live pool with one of `parallelism` total execution
    /// contexts, joining the old pool's workers.
    ///
    /// The replacement is built before the old pool is torn down, so for the
    /// duration of this call both pools' worker threads exist; the overlap
    /// is what keeps the old pool live when the replacement cannot be built.
    ///
    /// Taking `&mut self` excludes any borrow of the current pool, so no
    /// batch can be in flight while the pools are swapped.
    ///
    /// # Errors
    /// [`Error::InvalidParallelism`] when `parallelism` is outside
    /// `1..=max_parallelism`; [`Error::WorkerSpawn`] when the replacement
    /// pool cannot be built, in which case the current pool stays live.
    pub fn set_parallelism(&mut self, parallelism: usize) -> Result<(), Error> {
        if parallelism == 0 || parallelism > self.max_parallelism {
            return Err(Error::InvalidParallelism {
                requested: parallelism,
                max: self.max_parallelism,
            });
        }

        // Build the replacement first so a spawn failure leaves the old pool
        // in place.
        let replacement = Pool::new(parallelism, Arc::clone(&self.init_hook))?;
        self.pool = replacement;
        self.current_parallelism = parallelism;
        log::info!("parallelism reconfigured to {parallelism}");
        Ok(())
    }
}
