/// Receives human-readable status lines and transfer progress.
pub trait ProgressCallback {
    fn info(&self, msg: &str);

    /// Fraction of payload elements processed, `0.0..=1.0`.
    fn set_progress(&self, how_far: f32);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn info(&self, _msg: &str) {}

    fn set_progress(&self, _how_far: f32) {}
}

/// Forwards status lines and progress to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressCallback for TracingProgress {
    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn set_progress(&self, how_far: f32) {
        tracing::debug!(progress = how_far, "transfer progress");
    }
}
