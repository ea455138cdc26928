//! One-shot runtime flags.

use std::sync::atomic::{AtomicBool, Ordering};

/// Flags that flip from `false` to `true` once per page lifetime.
#[derive(Debug, Default)]
pub struct RuntimeFlags {
    initial_pageload_sent: AtomicBool,
    listening_for_errors: AtomicBool,
    listening_for_core_web_vitals: AtomicBool,
    history_patched: AtomicBool,
}

impl RuntimeFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_pageload_sent(&self) -> bool {
        self.initial_pageload_sent.load(Ordering::SeqCst)
    }

    pub fn listening_for_errors(&self) -> bool {
        self.listening_for_errors.load(Ordering::SeqCst)
    }

    pub fn listening_for_core_web_vitals(&self) -> bool {
        self.listening_for_core_web_vitals.load(Ordering::SeqCst)
    }

    pub fn history_patched(&self) -> bool {
        self.history_patched.load(Ordering::SeqCst)
    }

    /// Set the flag. Returns `true` if this call flipped it.
    pub(crate) fn mark_initial_pageload_sent(&self) -> bool {
        !self.initial_pageload_sent.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn mark_listening_for_errors(&self) -> bool {
        !self.listening_for_errors.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn mark_listening_for_core_web_vitals(&self) -> bool {
        !self.listening_for_core_web_vitals.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn mark_history_patched(&self) -> bool {
        !self.history_patched.swap(true, Ordering::SeqCst)
    }

    /// Clear every flag.
    pub fn reset(&self) {
        for flag in [
            &self.initial_pageload_sent,
            &self.listening_for_errors,
            &self.listening_for_core_web_vitals,
            &self.history_patched,
        ] {
            flag.store(false, Ordering::SeqCst);
        }
    }
}
