use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{info, warn};

pub mod catalog;
pub mod controller;
pub mod dispatch;
mod loader;
pub mod session;

pub use catalog::{CatalogError, GestureCatalog};
pub use controller::{
    AttemptId, ControllerConfig, KeyOutcome, Phase, RecognitionController, START_TIMEOUT,
};
pub use dispatch::QueuedDispatcher;
pub use loader::StoredCatalogLoader;
pub use session::RecognitionSession;

/// Source of the gesture catalog, consulted once per screen-on.
#[async_trait]
pub trait CatalogLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<GestureCatalog>, CatalogError>;
}

pub struct MissingCatalogLoader;

#[async_trait]
impl CatalogLoader for MissingCatalogLoader {
    async fn load(&self) -> Result<Arc<GestureCatalog>, CatalogError> {
        Err(CatalogError::Unavailable(
            "no catalog loader is configured".into(),
        ))
    }
}

/// Serves a fixed catalog; used by hosts that do not persist gestures.
pub struct StaticCatalogLoader {
    catalog: Arc<GestureCatalog>,
}

impl StaticCatalogLoader {
    pub fn new(catalog: GestureCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }
}

#[async_trait]
impl CatalogLoader for StaticCatalogLoader {
    async fn load(&self) -> Result<Arc<GestureCatalog>, CatalogError> {
        Ok(self.catalog.clone())
    }
}

/// Receives the message of a uniquely matched gesture. Must not block.
pub trait MessageDispatcher: Send + Sync {
    fn dispatch(&self, message: &str);
}

pub struct MissingMessageDispatcher;

impl MessageDispatcher for MissingMessageDispatcher {
    fn dispatch(&self, message: &str) {
        warn!(len = message.len(), "no message dispatcher configured; dropping match");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HapticPulse {
    pub duration: Duration,
    pub amplitude: u8,
}

impl HapticPulse {
    /// Short, weak pulse: tracking has been armed.
    pub const ARMED: Self = Self {
        duration: Duration::from_millis(30),
        amplitude: 1,
    };
    /// Stronger pulse: a gesture matched and its message was handed off.
    pub const CONFIRMED: Self = Self {
        duration: Duration::from_millis(100),
        amplitude: u8::MAX,
    };
}

pub trait Haptics: Send + Sync {
    fn pulse(&self, pulse: HapticPulse);
}

pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn pulse(&self, _pulse: HapticPulse) {}
}

/// Stand-in for a vibration motor on hosts without one.
pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn pulse(&self, pulse: HapticPulse) {
        info!(
            duration_ms = pulse.duration.as_millis() as u64,
            amplitude = pulse.amplitude,
            "haptic pulse"
        );
    }
}
