//! Observer interface for per-file pipeline notifications.
//!
//! Workers running in parallel emit through the same [`Notifier`], so
//! messages from different files interleave freely. Ordering is only
//! guaranteed within one file's pipeline run.

use log::{error, info, warn};
use std::sync::Arc;

/// Receives the three notification severities emitted by the unlock
/// pipeline. Implementations must tolerate calls from multiple threads.
pub trait Observer: Send + Sync {
    fn on_info(&self, message: &str);
    fn on_warning(&self, message: &str);
    fn on_error(&self, message: &str);
}

/// Cloneable handle given to every pipeline run.
#[derive(Clone)]
pub struct Notifier(Arc<dyn Observer>);

impl Notifier {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self(observer)
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.0.on_info(message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.0.on_warning(message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.0.on_error(message.as_ref());
    }
}

/// Forwards notifications to the global logger.
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_info(&self, message: &str) {
        info!("{}", message);
    }

    fn on_warning(&self, message: &str) {
        warn!("{}", message);
    }

    fn on_error(&self, message: &str) {
        error!("{}", message);
    }
}
