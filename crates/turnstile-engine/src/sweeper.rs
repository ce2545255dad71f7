//! Auto-exit sweeper: closes sessions whose time cap elapsed without a
//! voluntary scan.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::SpaceEngine;
use crate::worker::WorkerHandle;

/// Spawner for the periodic auto-exit worker.
pub struct Sweeper;

impl Sweeper {
    /// Starts the sweeper at the engine's configured interval.
    ///
    /// Each tick runs [`SpaceEngine::sweep_once`]; errors are logged and
    /// the worker keeps ticking, since a transient persistence failure
    /// must not kill auto-exit for the lifetime of the process.
    #[must_use]
    pub fn spawn(engine: Arc<SpaceEngine>) -> WorkerHandle {
        let interval = Duration::from_secs(engine.config().sweep_interval_secs.max(1));
        WorkerHandle::spawn("auto-exit-sweeper", interval, move || {
            match engine.sweep_once() {
                Ok(0) => {}
                Ok(swept) => tracing::debug!(swept, "sweep tick closed sessions"),
                Err(error) => tracing::error!(%error, "sweep tick failed"),
            }
        })
    }
}
