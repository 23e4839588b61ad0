use crate::types::TargetSpec;

/// Manual target saved when leaving "no preset", with optional humidity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SavedTarget {
    pub target: TargetSpec,
    pub humidity: Option<f32>,
}

/// Active preset label plus the manual target to restore on exit.
///
/// The snapshot is taken only when moving from no preset to a preset, so
/// chaining presets keeps the original manual target.
#[derive(Debug, Clone, Default)]
pub struct PresetStore {
    active: Option<String>,
    saved: Option<SavedTarget>,
}

impl PresetStore {
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn saved(&self) -> Option<SavedTarget> {
        self.saved
    }

    pub fn activate(&mut self, name: &str, current_manual: SavedTarget) {
        if self.active.is_none() {
            self.saved = Some(current_manual);
        }
        self.active = Some(name.to_string());
    }

    /// Clears the preset and hands back the target to restore.
    pub fn deactivate(&mut self) -> Option<SavedTarget> {
        self.active = None;
        self.saved.take()
    }
}
