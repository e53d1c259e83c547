//! The event surface consumed by the engine.
//!
//! Hosts plug in their own sink; the default discards everything and
//! `TracingNotifier` forwards to the `tracing` macros.

use crate::artifact::Artifact;

/// Receives engine events
pub trait Notifier: Send + Sync {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn progress(&self, _artifact: &Artifact, _bytes_done: u64, _bytes_total: Option<u64>) {}
}

/// Discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    fn progress(&self, artifact: &Artifact, bytes_done: u64, bytes_total: Option<u64>) {
        match bytes_total {
            Some(total) => tracing::debug!("{}: {}/{} bytes", artifact.file, bytes_done, total),
            None => tracing::debug!("{}: {} bytes", artifact.file, bytes_done),
        }
    }
}
