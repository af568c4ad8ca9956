use std::sync::atomic::{AtomicUsize, Ordering};

use mito_protocol::ErrorDescriptor;

/// Callbacks into the UI state store, injected when the broker is built.
pub trait UiHooks: Send + Sync {
    /// Re-pull the canonical sheet/analysis snapshot from the host.
    fn refresh(&self);

    /// Surface a blocking error modal.
    fn show_error(&self, error: &ErrorDescriptor);

    /// A request outlived the loading delay.
    fn loading_started(&self) {}

    /// A request that raised the loading indicator resolved or was dropped.
    fn loading_finished(&self) {}
}

/// Hooks for hosts with no UI attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl UiHooks for NoopHooks {
    fn refresh(&self) {}

    fn show_error(&self, _error: &ErrorDescriptor) {}
}

/// Process-wide count of requests currently showing a spinner.
#[derive(Debug, Default)]
pub struct LoadingCounter {
    count: AtomicUsize,
}

impl LoadingCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) -> usize {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Floored at zero.
    pub fn decrement(&self) -> usize {
        let previous = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_loading(&self) -> bool {
        self.get() > 0
    }
}
