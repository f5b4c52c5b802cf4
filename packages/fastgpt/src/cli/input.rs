use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ratatui::crossterm::event::{self, Event, KeyEvent};
use tokio::sync::mpsc;
use tracing::warn;

/// Terminal key events read on a blocking thread.
///
/// The thread polls with a short timeout so it notices the shutdown flag;
/// dropping the reader stops it.
pub struct KeyReader {
    rx: mpsc::Receiver<KeyEvent>,
    shutdown: Arc<AtomicBool>,
}

impl KeyReader {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<KeyEvent>(64);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();

        std::thread::spawn(move || {
            loop {
                if shutdown_thread.load(Ordering::Relaxed) {
                    break;
                }
                match event::poll(Duration::from_millis(100)) {
                    Ok(false) => continue,
                    Ok(true) => {}
                    Err(e) => {
                        warn!("terminal poll failed: {e}");
                        break;
                    }
                }
                match event::read() {
                    Ok(Event::Key(key)) => {
                        if tx.blocking_send(key).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("terminal read failed: {e}");
                        break;
                    }
                }
            }
        });

        Self { rx, shutdown }
    }

    /// Next key press; `None` once the reader thread has stopped.
    pub async fn next(&mut self) -> Option<KeyEvent> {
        self.rx.recv().await
    }
}

impl Drop for KeyReader {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
