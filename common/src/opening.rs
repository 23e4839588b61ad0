//! Debounced window/door contacts.
//!
//! Each opening runs a small state machine:
//!
//! ```text
//! Closed --raw open--> PendingOpen --open_timeout--> Open
//! Open --raw closed--> PendingClose --close_timeout--> Closed
//! ```
//!
//! A raw transition back to the stable value while pending cancels the flip.
//! An unavailable contact counts as closed.

use tracing::debug;

use crate::{config::OpeningConfig, error::ControlError, types::HvacMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawContact {
    Open,
    Closed,
    Unavailable,
}

impl RawContact {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" | "on" | "true" | "1" => Self::Open,
            "closed" | "off" | "false" | "0" => Self::Closed,
            _ => Self::Unavailable,
        }
    }

    fn is_open(self) -> bool {
        self == Self::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpeningPhase {
    Closed,
    PendingOpen { since_ms: u64 },
    Open,
    PendingClose { since_ms: u64 },
}

impl OpeningPhase {
    /// Debounced view: pending phases still report the previous stable state.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::PendingClose { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpeningTransition {
    pub id: String,
    pub open: bool,
}

#[derive(Debug, Clone)]
struct Opening {
    config: OpeningConfig,
    raw: RawContact,
    phase: OpeningPhase,
}

impl Opening {
    fn set_raw(&mut self, raw: RawContact, now_ms: u64) {
        self.raw = raw;
        let wants_open = raw.is_open();

        self.phase = match (self.phase, wants_open) {
            (OpeningPhase::Closed, true) => OpeningPhase::PendingOpen { since_ms: now_ms },
            (OpeningPhase::Open, false) => OpeningPhase::PendingClose { since_ms: now_ms },
            // Reversal while pending: drop the pending flip.
            (OpeningPhase::PendingOpen { .. }, false) => OpeningPhase::Closed,
            (OpeningPhase::PendingClose { .. }, true) => OpeningPhase::Open,
            (phase, _) => phase,
        };
    }

    fn deadline_ms(&self) -> Option<u64> {
        match self.phase {
            OpeningPhase::PendingOpen { since_ms } => {
                Some(since_ms.saturating_add(self.config.open_timeout_ms))
            }
            OpeningPhase::PendingClose { since_ms } => {
                Some(since_ms.saturating_add(self.config.close_timeout_ms))
            }
            _ => None,
        }
    }

    fn commit_if_due(&mut self, now_ms: u64) -> Option<bool> {
        let deadline = self.deadline_ms()?;
        if now_ms < deadline {
            return None;
        }
        self.phase = match self.phase {
            OpeningPhase::PendingOpen { .. } => OpeningPhase::Open,
            _ => OpeningPhase::Closed,
        };
        Some(self.phase.is_open())
    }

    fn applies_to(&self, mode: HvacMode) -> bool {
        self.config.modes.is_empty() || self.config.modes.contains(&mode)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpeningDebouncer {
    openings: Vec<Opening>,
}

impl OpeningDebouncer {
    pub fn new(configs: &[OpeningConfig]) -> Self {
        Self {
            openings: configs
                .iter()
                .cloned()
                .map(|config| Opening {
                    config,
                    raw: RawContact::Closed,
                    phase: OpeningPhase::Closed,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.openings.is_empty()
    }

    /// Feeds a raw contact transition. Zero timeouts flip immediately.
    pub fn set_raw(&mut self, id: &str, raw: RawContact, now_ms: u64) -> Result<(), ControlError> {
        let opening = self
            .openings
            .iter_mut()
            .find(|opening| opening.config.id == id)
            .ok_or_else(|| ControlError::UnknownOpening(id.to_string()))?;

        opening.set_raw(raw, now_ms);
        if let Some(open) = opening.commit_if_due(now_ms) {
            debug!(opening = id, open, "opening debounced immediately");
        }
        Ok(())
    }

    /// Commits every pending flip whose timeout has elapsed.
    pub fn tick(&mut self, now_ms: u64) -> Vec<OpeningTransition> {
        let mut transitions = Vec::new();
        for opening in &mut self.openings {
            if let Some(open) = opening.commit_if_due(now_ms) {
                debug!(opening = %opening.config.id, open, "opening debounced");
                transitions.push(OpeningTransition {
                    id: opening.config.id.clone(),
                    open,
                });
            }
        }
        transitions
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.openings.iter().filter_map(Opening::deadline_ms).min()
    }

    pub fn is_any_open(&self, scope: HvacMode) -> bool {
        if scope == HvacMode::Off {
            return false;
        }
        self.openings
            .iter()
            .any(|opening| opening.applies_to(scope) && opening.phase.is_open())
    }

    pub fn debounced(&self, id: &str) -> Option<bool> {
        self.openings
            .iter()
            .find(|opening| opening.config.id == id)
            .map(|opening| opening.phase.is_open())
    }

    pub fn phase(&self, id: &str) -> Option<OpeningPhase> {
        self.openings
            .iter()
            .find(|opening| opening.config.id == id)
            .map(|opening| opening.phase)
    }

    pub fn raw(&self, id: &str) -> Option<RawContact> {
        self.openings
            .iter()
            .find(|opening| opening.config.id == id)
            .map(|opening| opening.raw)
    }
}
