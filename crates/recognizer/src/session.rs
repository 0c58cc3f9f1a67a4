use std::sync::Arc;

use shared::domain::{Gesture, GestureInput, KeyCode};

use crate::catalog::GestureCatalog;

/// Progressive matcher for one recognition attempt.
///
/// Candidates are indices into the shared catalog. Each captured input is
/// compared only against the step at its own position, so a candidate that
/// fails once is gone for the rest of the session.
#[derive(Debug, Clone)]
pub struct RecognitionSession {
    catalog: Arc<GestureCatalog>,
    candidates: Vec<usize>,
    inputs: Vec<GestureInput>,
}

impl RecognitionSession {
    pub fn new(catalog: Arc<GestureCatalog>) -> Self {
        let candidates = (0..catalog.len()).collect();
        Self {
            catalog,
            candidates,
            inputs: Vec::new(),
        }
    }

    pub fn add_input(&mut self, key: KeyCode, duration_ms: u64) {
        self.inputs.push(GestureInput { key, duration_ms });
        let index = self.inputs.len() - 1;

        let catalog = &self.catalog;
        self.candidates.retain(|&candidate| {
            catalog
                .get(candidate)
                .and_then(|gesture| gesture.entries.get(index))
                .is_some_and(|entry| entry.accepts(key, duration_ms))
        });
    }

    pub fn can_still_match(&self) -> bool {
        !self.candidates.is_empty()
    }

    /// A match needs exactly one survivor whose steps have all been consumed.
    /// A survivor that is still only a prefix does not count.
    pub fn has_match(&self) -> bool {
        self.matched_gesture().is_some()
    }

    pub fn matched_gesture(&self) -> Option<&Gesture> {
        match self.candidates.as_slice() {
            [only] => self
                .catalog
                .get(*only)
                .filter(|gesture| gesture.entries.len() == self.inputs.len()),
            _ => None,
        }
    }

    pub fn matched_message(&self) -> Option<&str> {
        self.matched_gesture().map(|gesture| gesture.message.as_str())
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Gesture> + '_ {
        self.candidates
            .iter()
            .filter_map(|&index| self.catalog.get(index))
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn inputs(&self) -> &[GestureInput] {
        &self.inputs
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
