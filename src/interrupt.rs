//! Cooperative interrupt handling.
//!
//! Ctrl-C never preempts a running handler. It only raises a [`CancelToken`]
//! that the read loop and the pager look at, and the [`InterruptGate`] turns
//! a quick second interrupt into a forced quit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Window within which a second interrupt forces an immediate quit.
pub const DEBOUNCE: Duration = Duration::from_secs(1);

/// A cancellation request shared with the signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the request, returning whether one was pending.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    /// Route Ctrl-C to this token instead of terminating the process.
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || token.request())
    }
}

/// What an interrupt means at the current point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Drop the current input line and show the prompt again.
    CancelLine,
    /// Second interrupt inside the debounce window: quit now.
    ForceQuit,
}

/// Debounce timer for double-interrupt force quit.
#[derive(Debug, Clone)]
pub struct InterruptGate {
    window: Duration,
    last: Option<Instant>,
}

impl Default for InterruptGate {
    fn default() -> Self {
        Self::new(DEBOUNCE)
    }
}

impl InterruptGate {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn record(&mut self, now: Instant) -> Interrupt {
        match self.last {
            Some(last) if now.saturating_duration_since(last) <= self.window => {
                Interrupt::ForceQuit
            }
            _ => {
                self.last = Some(now);
                Interrupt::CancelLine
            }
        }
    }
}
