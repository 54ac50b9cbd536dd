use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set once Ctrl-C has been pressed.
///
/// Child processes get the signal directly from the terminal; executors check
/// the flag after the child exits to tell an interrupt from a crash.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// Flag that is never set by a signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the process-wide Ctrl-C handler. Can only be called once.
    pub fn install() -> Result<Self> {
        let flag = Self::new();
        let handle = flag.0.clone();
        ctrlc::set_handler(move || {
            handle.store(true, Ordering::SeqCst);
        })?;
        Ok(flag)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
