//! Cooperative cancellation.
//!
//! The orchestrator polls a [`CancellationSource`] at its suspension points;
//! nothing is ever interrupted preemptively.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use log::{info, warn};

pub trait CancellationSource {
    fn is_requested(&self) -> bool;
}

/// Never requests cancellation.
pub struct NeverCancel;

impl CancellationSource for NeverCancel {
    fn is_requested(&self) -> bool {
        false
    }
}

/// Shared flag; clones observe the same request.
#[derive(Clone, Default)]
pub struct CancellationFlag {
    requested: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }
}

impl CancellationSource for CancellationFlag {
    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

fn is_stop_command(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "q" | "quit" | "stop")
}

/// Spawns a detached thread that watches stdin and raises the flag when the
/// operator types `q`, `quit` or `stop`. End of input leaves the flag alone so
/// the scraper keeps running unattended with a closed stdin.
pub fn watch_stdin(flag: CancellationFlag) {
    let spawned = thread::Builder::new()
        .name("stdin-cancel".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) if is_stop_command(&line) => {
                        info!("Stop requested from keyboard. Finishing current target...");
                        flag.request();
                        return;
                    }
                    Ok(_) => {}
                    Err(_) => return,
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Could not start keyboard watcher: {}", e);
    }
}
