//! Run command implementation.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tcsync::prelude::*;
use tracing::info;

use crate::input::KeyboardMonitor;
use crate::session::FileSession;

/// Attach to the game and sync until stopped.
pub fn run(config_path: &Path, session_dir: &Path, watch_keys: bool) -> Result<()> {
    info!("tcsync starting...");

    let config = SyncConfig::load(config_path)
        .with_context(|| format!("Failed to load game table {}", config_path.display()))?;
    info!(
        "Loaded game table '{}' from {}",
        config.game.name,
        config_path.display()
    );
    let Some(process) = config.process.clone() else {
        bail!(
            "Game table {} has no [process] section",
            config_path.display()
        );
    };

    let shutdown = Arc::new(ShutdownSignal::new());
    let handler_signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || handler_signal.trigger())
        .context("Failed to install Ctrl+C handler")?;
    let keyboard = watch_keys.then(|| KeyboardMonitor::spawn(Arc::clone(&shutdown)));

    let session = FileSession::new(
        session_dir,
        config.locations.iter().flat_map(|rule| rule.locations()),
    );
    info!("Using session directory {}", session.dir().display());

    let mut sync = SyncLoop::new(
        Arc::new(config),
        ProcessAttacher::new(process),
        session,
        Arc::clone(&shutdown),
    );
    if watch_keys {
        info!("Press s for status, Esc or q to stop");
    }
    sync.run(|sync| {
        if keyboard
            .as_ref()
            .is_some_and(KeyboardMonitor::take_status_request)
        {
            log_status(sync);
        }
    });

    if let Some(keyboard) = keyboard {
        keyboard.join();
    }
    info!(
        "Stopped with {} locations left to check",
        sync.engine().remaining_locations()
    );
    Ok(())
}

fn log_status<A: Attach, S: Session>(sync: &SyncLoop<A, S>) {
    let engine = sync.engine();
    info!(
        "Status: {}, session {}, {} items applied, {} areas unlocked, {} locations left",
        sync.state(),
        if engine.is_connected() {
            "connected"
        } else {
            "disconnected"
        },
        engine.ledger().applied_index(),
        engine.graph().unlocked_count(),
        engine.remaining_locations()
    );
}
