//! Serve command: run the engine with its background workers.

use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{Context, Result};

use turnstile_engine::{Notification, NotificationSink, StatusScheduler, Sweeper};

use crate::commands::util;
use crate::Config;

/// Emits notifications to stdout as JSON lines.
struct StdoutSink;

impl NotificationSink for StdoutSink {
    fn send(&self, notification: &Notification) -> Result<(), String> {
        match serde_json::to_string(notification) {
            Ok(line) => {
                println!("{line}");
                Ok(())
            }
            Err(error) => Err(error.to_string()),
        }
    }
}

pub fn run(config: &Config) -> Result<()> {
    let engine = Arc::new(util::build_engine(config)?);
    let connection = engine
        .hub()
        .register(Arc::new(StdoutSink) as Arc<dyn NotificationSink>, true);

    let sweeper = Sweeper::spawn(Arc::clone(&engine));
    let scheduler = StatusScheduler::spawn(Arc::clone(&engine));

    let snapshot = engine.get_state()?;
    tracing::info!(
        count = snapshot.count,
        max = snapshot.max,
        status = %snapshot.status,
        "engine serving; press ctrl-c to stop"
    );

    wait_for_interrupt()?;

    // Workers finish their in-flight tick before the join returns.
    sweeper.stop();
    scheduler.stop();
    engine.hub().unregister(connection);
    tracing::info!("engine stopped");
    Ok(())
}

fn wait_for_interrupt() -> Result<()> {
    let (tx, rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("failed to install signal handler")?;
    rx.recv().ok();
    Ok(())
}
