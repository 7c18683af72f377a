//! Terminal keys for the run command.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use strum::Display;
use tcsync::ShutdownSignal;
use tracing::{debug, info, warn};

const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a key press asks the run command to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum KeyCommand {
    /// Esc, q or Ctrl+C
    Stop,
    /// s
    Status,
}

/// Map a key event to a command. Releases and repeats are ignored.
pub fn command_for(event: &KeyEvent) -> Option<KeyCommand> {
    if event.kind != KeyEventKind::Press {
        return None;
    }
    match event.code {
        KeyCode::Esc | KeyCode::Char('q' | 'Q') => Some(KeyCommand::Stop),
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyCommand::Stop)
        }
        KeyCode::Char('s' | 'S') => Some(KeyCommand::Status),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct KeyHandler {
    shutdown: Arc<ShutdownSignal>,
    status_requested: Arc<AtomicBool>,
}

impl KeyHandler {
    fn handle(&self, command: KeyCommand) {
        debug!("Key command: {}", command);
        match command {
            KeyCommand::Stop => {
                info!("Stop requested");
                self.shutdown.trigger();
            }
            KeyCommand::Status => self.status_requested.store(true, Ordering::SeqCst),
        }
    }

    fn watch(&self) {
        while !self.shutdown.is_shutdown() {
            match event::poll(KEY_POLL_INTERVAL) {
                Ok(false) => {}
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) => {
                        if let Some(command) = command_for(&key) {
                            self.handle(command);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Failed to read terminal input: {}", e);
                        return;
                    }
                },
                Err(e) => {
                    warn!("Terminal input unavailable: {}", e);
                    return;
                }
            }
        }
    }
}

/// Reads terminal keys on a background thread until shutdown.
///
/// Stop triggers the shared [`ShutdownSignal`]. Status requests are held
/// until the sync loop takes them between steps.
pub struct KeyboardMonitor {
    status_requested: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl KeyboardMonitor {
    pub fn spawn(shutdown: Arc<ShutdownSignal>) -> Self {
        let handler = KeyHandler {
            shutdown,
            status_requested: Arc::new(AtomicBool::new(false)),
        };
        let status_requested = Arc::clone(&handler.status_requested);
        let handle = thread::spawn(move || {
            debug!("Keyboard monitor started");
            handler.watch();
            debug!("Keyboard monitor stopped");
        });
        Self {
            status_requested,
            handle,
        }
    }

    /// Whether status was requested since the last call.
    pub fn take_status_request(&self) -> bool {
        self.status_requested.swap(false, Ordering::SeqCst)
    }

    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!("Keyboard monitor panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> Option<KeyCommand> {
        command_for(&KeyEvent::new(code, modifiers))
    }

    fn handler() -> KeyHandler {
        KeyHandler {
            shutdown: Arc::new(ShutdownSignal::new()),
            status_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_stop_keys() {
        assert_eq!(press(KeyCode::Esc, KeyModifiers::NONE), Some(KeyCommand::Stop));
        assert_eq!(press(KeyCode::Char('Q'), KeyModifiers::SHIFT), Some(KeyCommand::Stop));
        assert_eq!(
            press(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(KeyCommand::Stop)
        );
        assert_eq!(press(KeyCode::Char('c'), KeyModifiers::NONE), None);
    }

    #[test]
    fn test_status_key_and_releases() {
        assert_eq!(press(KeyCode::Char('s'), KeyModifiers::NONE), Some(KeyCommand::Status));
        assert_eq!(press(KeyCode::Enter, KeyModifiers::NONE), None);

        let release =
            KeyEvent::new_with_kind(KeyCode::Esc, KeyModifiers::NONE, KeyEventKind::Release);
        assert_eq!(command_for(&release), None);
    }

    #[test]
    fn test_stop_triggers_shutdown() {
        let handler = handler();
        handler.handle(KeyCommand::Stop);
        assert!(handler.shutdown.is_shutdown());
        assert!(!handler.status_requested.load(Ordering::SeqCst));
    }

    #[test]
    fn test_status_request_taken_once() {
        let handler = handler();
        let monitor = KeyboardMonitor {
            status_requested: Arc::clone(&handler.status_requested),
            handle: thread::spawn(|| {}),
        };
        assert!(!monitor.take_status_request());

        handler.handle(KeyCommand::Status);
        assert!(!handler.shutdown.is_shutdown());
        assert!(monitor.take_status_request());
        assert!(!monitor.take_status_request());
        monitor.join();
    }
}
