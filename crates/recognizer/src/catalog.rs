use shared::domain::Gesture;
use thiserror::Error;
use tracing::warn;

/// Why a recognition attempt cannot start. The attempt stays inert until the next screen-on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("gesture catalog unavailable: {0}")]
    Unavailable(String),
    #[error("no gestures have been configured")]
    MissingGestures,
    #[error("no matrix configuration has been stored")]
    MissingDispatchConfig,
    #[error("matrix configuration is incomplete; missing {}", .0.join(", "))]
    Incomplete(Vec<&'static str>),
}

/// Immutable snapshot of the configured gestures for one recognition attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GestureCatalog {
    gestures: Vec<Gesture>,
}

impl GestureCatalog {
    /// Gestures without any steps can never match and are dropped.
    pub fn new(gestures: Vec<Gesture>) -> Self {
        let gestures = gestures
            .into_iter()
            .filter(|gesture| {
                if gesture.entries.is_empty() {
                    warn!(gesture = %gesture.name, "skipping gesture without steps");
                    false
                } else {
                    true
                }
            })
            .collect();
        Self { gestures }
    }

    pub fn gestures(&self) -> &[Gesture] {
        &self.gestures
    }

    pub fn get(&self, index: usize) -> Option<&Gesture> {
        self.gestures.get(index)
    }

    pub fn len(&self) -> usize {
        self.gestures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty()
    }

    /// Pairs of gestures with identical step sequences. Such pairs never produce a unique match.
    pub fn duplicate_patterns(&self) -> Vec<(&Gesture, &Gesture)> {
        let mut duplicates = Vec::new();
        for (i, first) in self.gestures.iter().enumerate() {
            for second in &self.gestures[i + 1..] {
                if first.same_pattern(second) {
                    duplicates.push((first, second));
                }
            }
        }
        duplicates
    }
}
