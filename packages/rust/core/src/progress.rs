//! Progress reporting hooks for the build and release pipelines.

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each component source arrives. `current` counts completions,
    /// which may not follow merge order.
    fn component_fetched(&self, label: &str, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn component_fetched(&self, _label: &str, _current: usize, _total: usize) {}
}
