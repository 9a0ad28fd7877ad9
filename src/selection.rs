//! Session-scoped selection: the inspected factor and the last training artifact.

use serde::Serialize;

use crate::logging::log_selection;

/// Single owned state object; the workflow is its only writer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    selected_factor: Option<String>,
    last_artifacts_dir: Option<String>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_factor(&self) -> Option<&str> {
        self.selected_factor.as_deref()
    }

    pub fn artifacts_dir(&self) -> Option<&str> {
        self.last_artifacts_dir.as_deref()
    }

    /// Does not touch the artifact directory.
    pub fn select_factor(&mut self, name: impl Into<String>) {
        self.selected_factor = Some(name.into());
        log_selection("factor_selected", self.selected_factor(), self.artifacts_dir());
    }

    pub fn record_artifact(&mut self, dir: impl Into<String>) {
        self.last_artifacts_dir = Some(dir.into());
        log_selection("artifact_recorded", self.selected_factor(), self.artifacts_dir());
    }

    /// Returns the directory that was dropped, if any.
    pub fn invalidate_artifact(&mut self) -> Option<String> {
        let dropped = self.last_artifacts_dir.take();
        if dropped.is_some() {
            log_selection("artifact_invalidated", self.selected_factor(), dropped.as_deref());
        }
        dropped
    }

    pub fn has_reusable_artifact(&self) -> bool {
        self.last_artifacts_dir.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let s = SelectionState::new();
        assert_eq!(s.selected_factor(), None);
        assert!(!s.has_reusable_artifact());
    }

    #[test]
    fn test_select_keeps_artifact() {
        let mut s = SelectionState::new();
        s.record_artifact("artifacts/run1");
        s.select_factor("momentum_5");
        assert_eq!(s.selected_factor(), Some("momentum_5"));
        assert_eq!(s.artifacts_dir(), Some("artifacts/run1"));
    }

    #[test]
    fn test_invalidate_clears_only_artifact() {
        let mut s = SelectionState::new();
        s.select_factor("spread");
        s.record_artifact("artifacts/run1");
        assert!(s.has_reusable_artifact());
        assert_eq!(s.invalidate_artifact().as_deref(), Some("artifacts/run1"));
        assert!(!s.has_reusable_artifact());
        assert_eq!(s.selected_factor(), Some("spread"));
        assert_eq!(s.invalidate_artifact(), None);
    }
}
