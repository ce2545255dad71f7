//! Periodic worker plumbing.
//!
//! Workers run on plain threads with a channel-based shutdown signal. The
//! tick loop waits on `recv_timeout`, so a shutdown request is observed at
//! the next tick boundary at the latest, and an in-flight tick always
//! completes before `stop` returns.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

/// Handle to a running periodic worker.
pub struct WorkerHandle {
    name: &'static str,
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawns a worker that runs `tick` every `interval` until stopped.
    pub fn spawn<F>(name: &'static str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        tracing::debug!(worker = name, "worker stopping");
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => tick(),
                }
            })
            .expect("failed to spawn worker thread");

        Self {
            name,
            stop_tx,
            join: Some(join),
        }
    }

    /// Signals the worker to stop and waits for the current tick to finish.
    pub fn stop(mut self) {
        self.signal_and_join();
    }

    fn signal_and_join(&mut self) {
        // Ignore send errors: the thread may already have exited.
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!(worker = self.name, "worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.signal_and_join();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn worker_ticks_and_stops() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let handle = WorkerHandle::spawn("test-worker", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(40));
        handle.stop();
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected at least two ticks, saw {seen}");

        // No further ticks after stop.
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn drop_stops_the_worker() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        {
            let _handle = WorkerHandle::spawn("drop-worker", Duration::from_millis(5), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            std::thread::sleep(Duration::from_millis(15));
        }
        let seen = ticks.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
