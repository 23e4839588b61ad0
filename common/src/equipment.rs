//! Per-switch actuation with minimum cycle gating and keep-alive resends.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::{
    thermostat::EngineAction,
    types::{EquipmentRole, SwitchState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquipmentPhase {
    Idle,
    Engaging,
    Active,
    Disengaging,
}

/// Calendar-day memory of whether the secondary heater has fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuxDayMemory {
    pub day_marker: Option<NaiveDate>,
    pub engaged_today: bool,
}

impl AuxDayMemory {
    /// Resets the flag when the calendar day has moved on.
    pub fn refresh(&mut self, today: NaiveDate) {
        if self.day_marker != Some(today) {
            self.day_marker = Some(today);
            self.engaged_today = false;
        }
    }
}

#[derive(Debug, Clone)]
pub struct EquipmentMachine {
    role: EquipmentRole,
    switch_ref: String,
    desired: SwitchState,
    actual: SwitchState,
    last_transition_ms: Option<u64>,
    on_since_ms: Option<u64>,
    last_sent_ms: Option<u64>,
    min_cycle_ms: u64,
    keep_alive_ms: Option<u64>,
    day_memory: Option<AuxDayMemory>,
}

impl EquipmentMachine {
    pub fn new(
        role: EquipmentRole,
        switch_ref: impl Into<String>,
        min_cycle_ms: u64,
        keep_alive_ms: Option<u64>,
    ) -> Self {
        Self {
            role,
            switch_ref: switch_ref.into(),
            desired: SwitchState::Off,
            actual: SwitchState::Off,
            last_transition_ms: None,
            on_since_ms: None,
            last_sent_ms: None,
            min_cycle_ms,
            keep_alive_ms: keep_alive_ms.filter(|interval| *interval > 0),
            day_memory: (role == EquipmentRole::AuxHeater).then(AuxDayMemory::default),
        }
    }

    pub fn role(&self) -> EquipmentRole {
        self.role
    }

    pub fn switch_ref(&self) -> &str {
        &self.switch_ref
    }

    pub fn desired(&self) -> SwitchState {
        self.desired
    }

    pub fn actual(&self) -> SwitchState {
        self.actual
    }

    pub fn is_on(&self) -> bool {
        self.actual.is_on()
    }

    pub fn last_transition_ms(&self) -> Option<u64> {
        self.last_transition_ms
    }

    pub fn phase(&self) -> EquipmentPhase {
        match (self.actual, self.desired) {
            (SwitchState::Off, SwitchState::Off) => EquipmentPhase::Idle,
            (SwitchState::Off, SwitchState::On) => EquipmentPhase::Engaging,
            (SwitchState::On, SwitchState::On) => EquipmentPhase::Active,
            (SwitchState::On, SwitchState::Off) => EquipmentPhase::Disengaging,
        }
    }

    /// Continuous time in the on state.
    pub fn on_duration_ms(&self, now_ms: u64) -> u64 {
        match self.on_since_ms {
            Some(since) if self.is_on() => now_ms.saturating_sub(since),
            _ => 0,
        }
    }

    pub fn engaged_today(&self) -> bool {
        self.day_memory
            .map(|memory| memory.engaged_today)
            .unwrap_or(false)
    }

    pub fn day_memory(&self) -> Option<AuxDayMemory> {
        self.day_memory
    }

    pub fn refresh_day(&mut self, today: NaiveDate) {
        if let Some(memory) = self.day_memory.as_mut() {
            memory.refresh(today);
        }
    }

    /// Sets the target state. Asking for the current state again cancels a
    /// deferred transition.
    pub fn request(&mut self, desired: SwitchState) {
        if self.desired != desired {
            debug!(role = self.role.as_str(), ?desired, "equipment request");
        }
        self.desired = desired;
    }

    pub fn can_transition(&self, now_ms: u64) -> bool {
        self.last_transition_ms
            .map(|last| now_ms.saturating_sub(last) >= self.min_cycle_ms)
            .unwrap_or(true)
    }

    /// Applies a deferred transition once the minimum cycle has elapsed, or
    /// resends the current state when the keep-alive interval is due.
    pub fn tick(&mut self, now_ms: u64) -> Option<EngineAction> {
        if self.desired != self.actual {
            if self.can_transition(now_ms) {
                return Some(self.transition(self.desired, now_ms));
            }
            debug!(
                role = self.role.as_str(),
                remaining_ms = self
                    .min_cycle_ms
                    .saturating_sub(now_ms.saturating_sub(self.last_transition_ms.unwrap_or(0))),
                "transition deferred by minimum cycle"
            );
        }

        self.keep_alive_if_due(now_ms)
    }

    /// Safety-path transition that ignores the minimum cycle.
    pub fn force(&mut self, desired: SwitchState, now_ms: u64) -> Option<EngineAction> {
        self.desired = desired;
        if self.actual == desired {
            return self.keep_alive_if_due(now_ms);
        }
        Some(self.transition(desired, now_ms))
    }

    fn keep_alive_if_due(&mut self, now_ms: u64) -> Option<EngineAction> {
        let interval = self.keep_alive_ms?;
        let due = self
            .last_sent_ms
            .map(|last| now_ms.saturating_sub(last) >= interval)
            .unwrap_or(true);
        if !due {
            return None;
        }

        self.last_sent_ms = Some(now_ms);
        Some(EngineAction::KeepAlive {
            role: self.role,
            switch_ref: self.switch_ref.clone(),
            state: self.actual,
        })
    }

    fn transition(&mut self, state: SwitchState, now_ms: u64) -> EngineAction {
        info!(
            role = self.role.as_str(),
            switch = %self.switch_ref,
            state = state.as_str(),
            "equipment transition"
        );

        self.actual = state;
        self.last_transition_ms = Some(now_ms);
        self.last_sent_ms = Some(now_ms);
        self.on_since_ms = state.is_on().then_some(now_ms);
        if state.is_on() {
            if let Some(memory) = self.day_memory.as_mut() {
                memory.engaged_today = true;
            }
        }

        EngineAction::Switch {
            role: self.role,
            switch_ref: self.switch_ref.clone(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heater(min_cycle_ms: u64) -> EquipmentMachine {
        EquipmentMachine::new(EquipmentRole::Heater, "switch.heater", min_cycle_ms, None)
    }

    fn switch(state: SwitchState) -> Option<EngineAction> {
        Some(EngineAction::Switch {
            role: EquipmentRole::Heater,
            switch_ref: "switch.heater".to_string(),
            state,
        })
    }

    #[test]
    fn first_transition_is_not_gated() {
        let mut machine = heater(300_000);
        machine.request(SwitchState::On);

        assert_eq!(machine.tick(0), switch(SwitchState::On));
        assert_eq!(machine.phase(), EquipmentPhase::Active);
    }

    #[test]
    fn deferred_transition_applies_after_min_cycle() {
        let mut machine = heater(300_000);
        machine.request(SwitchState::On);
        machine.tick(1_000);

        machine.request(SwitchState::Off);
        assert_eq!(machine.tick(60_000), None);
        assert_eq!(machine.phase(), EquipmentPhase::Disengaging);
        assert!(machine.is_on());

        assert_eq!(machine.tick(301_000), switch(SwitchState::Off));
        assert_eq!(machine.phase(), EquipmentPhase::Idle);
    }

    #[test]
    fn reverting_request_cancels_deferred_transition() {
        let mut machine = heater(300_000);
        machine.request(SwitchState::On);
        machine.tick(0);

        machine.request(SwitchState::Off);
        assert_eq!(machine.tick(10_000), None);
        machine.request(SwitchState::On);

        assert_eq!(machine.tick(400_000), None);
        assert_eq!(machine.last_transition_ms(), Some(0));
    }

    #[test]
    fn force_bypasses_min_cycle() {
        let mut machine = heater(300_000);
        machine.request(SwitchState::On);
        machine.tick(0);

        assert_eq!(machine.force(SwitchState::Off, 5_000), switch(SwitchState::Off));
        assert_eq!(machine.desired(), SwitchState::Off);
    }

    #[test]
    fn keep_alive_resends_without_transition() {
        let mut machine =
            EquipmentMachine::new(EquipmentRole::Heater, "switch.heater", 300_000, Some(60_000));
        machine.request(SwitchState::On);
        machine.tick(0);

        assert_eq!(machine.tick(59_999), None);
        assert_eq!(
            machine.tick(60_000),
            Some(EngineAction::KeepAlive {
                role: EquipmentRole::Heater,
                switch_ref: "switch.heater".to_string(),
                state: SwitchState::On,
            })
        );
        assert_eq!(machine.last_transition_ms(), Some(0));
    }

    #[test]
    fn keep_alive_fires_while_transition_is_deferred() {
        let mut machine =
            EquipmentMachine::new(EquipmentRole::Heater, "switch.heater", 300_000, Some(60_000));
        machine.request(SwitchState::On);
        machine.tick(0);
        machine.request(SwitchState::Off);

        assert!(matches!(
            machine.tick(120_000),
            Some(EngineAction::KeepAlive {
                state: SwitchState::On,
                ..
            })
        ));
    }

    #[test]
    fn tracks_continuous_on_time() {
        let mut machine = heater(0);
        machine.request(SwitchState::On);
        machine.tick(10_000);

        assert_eq!(machine.on_duration_ms(70_000), 60_000);
        machine.request(SwitchState::Off);
        machine.tick(80_000);
        assert_eq!(machine.on_duration_ms(90_000), 0);
    }

    #[test]
    fn aux_day_memory_resets_on_new_day() {
        let day1 = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let day2 = day1.succ_opt().unwrap();
        let mut aux = EquipmentMachine::new(EquipmentRole::AuxHeater, "switch.aux", 0, None);

        aux.refresh_day(day1);
        assert!(!aux.engaged_today());
        aux.request(SwitchState::On);
        aux.tick(0);
        assert!(aux.engaged_today());

        aux.refresh_day(day1);
        assert!(aux.engaged_today());
        aux.refresh_day(day2);
        assert!(!aux.engaged_today());
    }

    #[test]
    fn only_aux_role_has_day_memory() {
        assert!(heater(0).day_memory().is_none());
    }
}
