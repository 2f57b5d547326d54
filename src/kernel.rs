//! Outbound notifications to the surrounding application.

use std::sync::{Arc, Mutex};

/// Receiver of construction change notifications.
///
/// After every successful rebuild the construction calls
/// [`notify_reset`](KernelListener::notify_reset) and then
/// [`update_construction`](KernelListener::update_construction). Incremental
/// paths report single elements instead.
pub trait KernelListener: Send {
    /// All views must drop what they know about the construction.
    fn notify_reset(&mut self);

    /// The construction was rebuilt and re-evaluated.
    fn update_construction(&mut self);

    /// An element was added.
    fn element_added(&mut self, _label: &str) {}

    /// An element was removed.
    fn element_removed(&mut self, _label: &str) {}

    /// An element changed value or style in place.
    fn element_updated(&mut self, _label: &str) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpKernel;

impl KernelListener for NoOpKernel {
    fn notify_reset(&mut self) {
        // No-op
    }

    fn update_construction(&mut self) {
        // No-op
    }
}

/// Notification seen by a [`RecordingKernel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    /// `notify_reset`
    Reset,
    /// `update_construction`
    UpdateConstruction,
    /// `element_added`
    Added(String),
    /// `element_removed`
    Removed(String),
    /// `element_updated`
    Updated(String),
}

/// Listener that records every notification, for tests.
///
/// Clones share the same log, so a test keeps one handle and gives the other
/// to the construction.
#[derive(Debug, Default, Clone)]
pub struct RecordingKernel {
    events: Arc<Mutex<Vec<KernelEvent>>>,
}

impl RecordingKernel {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: KernelEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }

    /// Every notification so far.
    pub fn events(&self) -> Vec<KernelEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of `notify_reset` calls.
    pub fn resets(&self) -> usize {
        self.count(|e| *e == KernelEvent::Reset)
    }

    /// Number of `update_construction` calls.
    pub fn updates(&self) -> usize {
        self.count(|e| *e == KernelEvent::UpdateConstruction)
    }

    /// Forget recorded notifications.
    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn count(&self, pred: impl Fn(&KernelEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

impl KernelListener for RecordingKernel {
    fn notify_reset(&mut self) {
        self.push(KernelEvent::Reset);
    }

    fn update_construction(&mut self) {
        self.push(KernelEvent::UpdateConstruction);
    }

    fn element_added(&mut self, label: &str) {
        self.push(KernelEvent::Added(label.to_string()));
    }

    fn element_removed(&mut self, label: &str) {
        self.push(KernelEvent::Removed(label.to_string()));
    }

    fn element_updated(&mut self, label: &str) {
        self.push(KernelEvent::Updated(label.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_kernel_shares_log() {
        let handle = RecordingKernel::new();
        let mut listener: Box<dyn KernelListener> = Box::new(handle.clone());
        listener.notify_reset();
        listener.update_construction();
        listener.element_added("a");
        assert_eq!(handle.resets(), 1);
        assert_eq!(handle.updates(), 1);
        assert_eq!(handle.events().last(), Some(&KernelEvent::Added("a".to_string())));
    }
}
