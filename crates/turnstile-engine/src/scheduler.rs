//! Status scheduler: applies weekday auto-open/auto-close windows.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::SpaceEngine;
use crate::worker::WorkerHandle;

/// Spawner for the periodic status scheduler.
pub struct StatusScheduler;

impl StatusScheduler {
    /// Starts the scheduler at the engine's configured interval.
    ///
    /// Each tick runs [`SpaceEngine::schedule_tick`], which writes a
    /// status transition only when the wall clock has crossed an enabled
    /// auto-open or auto-close boundary on a weekday.
    #[must_use]
    pub fn spawn(engine: Arc<SpaceEngine>) -> WorkerHandle {
        let interval = Duration::from_secs(engine.config().schedule_interval_secs.max(1));
        WorkerHandle::spawn("status-scheduler", interval, move || {
            match engine.schedule_tick() {
                Ok(None) => {}
                Ok(Some(status)) => tracing::info!(%status, "auto schedule changed status"),
                Err(error) => tracing::error!(%error, "schedule tick failed"),
            }
        })
    }
}
