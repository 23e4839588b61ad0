use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, FixedOffset};
use tracing::{debug, info, warn};

use crate::{
    config::ThermostatConfig,
    environment::{EnvironmentTracker, SensorKind},
    equipment::EquipmentMachine,
    error::{ConfigError, ControlError},
    heat_pump::HeatPump,
    hysteresis::{decide, decide_humidity, fan_zone_decide, FanZone, HysteresisRole, Intent},
    opening::{OpeningDebouncer, RawContact},
    preset::{PresetStore, SavedTarget},
    types::{
        ActionReason, ControllerStatePayload, ControllerStatus, EquipmentRole,
        ExternalActionReason, HvacAction, HvacMode, InternalActionReason, SwitchState, TargetSpec,
    },
};

/// Name that clears the active preset.
pub const PRESET_NONE: &str = "none";

/// Switch commands produced by a tick. Both are fire-and-forget.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    Switch {
        role: EquipmentRole,
        switch_ref: String,
        state: SwitchState,
    },
    /// Resend of the current state without a logical transition.
    KeepAlive {
        role: EquipmentRole,
        switch_ref: String,
        state: SwitchState,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlDecision {
    pub hvac_action: HvacAction,
    pub action_reason: InternalActionReason,
    pub equipment_targets: BTreeMap<EquipmentRole, SwitchState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FloorGate {
    TooHot,
    TooCold,
}

/// Latched hysteresis outputs carried between ticks.
#[derive(Debug, Clone, Copy, Default)]
struct Demand {
    heat: bool,
    cool: bool,
    fan: bool,
    dry: bool,
}

#[derive(Debug, Clone)]
struct Plan {
    targets: BTreeMap<EquipmentRole, SwitchState>,
    forced: BTreeSet<EquipmentRole>,
    force_all: bool,
    reason: InternalActionReason,
}

impl Plan {
    fn hold(reason: InternalActionReason) -> Self {
        Self {
            targets: BTreeMap::new(),
            forced: BTreeSet::new(),
            force_all: false,
            reason,
        }
    }

    fn shutdown(reason: InternalActionReason) -> Self {
        Self {
            force_all: true,
            ..Self::hold(reason)
        }
    }

    fn set(&mut self, role: EquipmentRole, on: bool) {
        self.targets.insert(role, SwitchState::from_bool(on));
    }

    fn force(&mut self, role: EquipmentRole, on: bool) {
        self.set(role, on);
        self.forced.insert(role);
    }

    fn target(&self, role: EquipmentRole) -> SwitchState {
        self.targets.get(&role).copied().unwrap_or(SwitchState::Off)
    }

    fn is_forced(&self, role: EquipmentRole) -> bool {
        self.force_all || self.forced.contains(&role)
    }
}

pub fn epoch_ms(now: &DateTime<FixedOffset>) -> u64 {
    u64::try_from(now.timestamp_millis()).unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct ThermostatEngine {
    config: ThermostatConfig,
    misconfiguration: Option<ConfigError>,

    mode: HvacMode,
    target: TargetSpec,
    target_humidity: Option<f32>,
    fan_zone_enabled: bool,
    rejected_mode: Option<HvacMode>,

    environment: EnvironmentTracker,
    openings: OpeningDebouncer,
    presets: PresetStore,
    heat_pump: Option<HeatPump>,
    equipment: Vec<EquipmentMachine>,

    demand: Demand,
    hvac_action: HvacAction,
    internal_reason: InternalActionReason,
    external_reason: Option<ExternalActionReason>,
    last_decision: Option<ControlDecision>,
}

impl ThermostatEngine {
    /// Builds the engine. An invalid configuration is absorbed: the engine
    /// holds every switch off and reports a misconfiguration.
    pub fn new(config: ThermostatConfig) -> Self {
        let misconfiguration = config.validate().err();
        if let Some(err) = &misconfiguration {
            warn!("configuration rejected, holding equipment off: {err}");
        }

        let equipment = config
            .equipment
            .configured()
            .map(|(role, switch)| {
                EquipmentMachine::new(
                    role,
                    switch,
                    config.min_cycle_duration_ms,
                    config.keep_alive_ms,
                )
            })
            .collect();

        let target = match &misconfiguration {
            Some(_) => config.initial_target,
            None => config.initial_target.clamp(config.min_temp, config.max_temp),
        };

        Self {
            misconfiguration,
            mode: config.initial_mode,
            target,
            target_humidity: config.target_humidity,
            fan_zone_enabled: true,
            rejected_mode: None,
            environment: EnvironmentTracker::from_config(&config),
            openings: OpeningDebouncer::new(&config.openings),
            presets: PresetStore::default(),
            heat_pump: config.is_heat_pump().then(HeatPump::default),
            equipment,
            demand: Demand::default(),
            hvac_action: HvacAction::Off,
            internal_reason: InternalActionReason::None,
            external_reason: None,
            last_decision: None,
            config,
        }
    }

    pub fn config(&self) -> &ThermostatConfig {
        &self.config
    }

    pub fn misconfiguration(&self) -> Option<&ConfigError> {
        self.misconfiguration.as_ref()
    }

    pub fn mode(&self) -> HvacMode {
        self.mode
    }

    pub fn target(&self) -> TargetSpec {
        self.target
    }

    pub fn target_humidity(&self) -> Option<f32> {
        self.target_humidity
    }

    pub fn preset(&self) -> Option<&str> {
        self.presets.active()
    }

    pub fn hvac_action(&self) -> HvacAction {
        self.hvac_action
    }

    pub fn internal_reason(&self) -> InternalActionReason {
        self.internal_reason
    }

    pub fn external_reason(&self) -> Option<ExternalActionReason> {
        self.external_reason
    }

    /// External reason when one is set, otherwise the derived one.
    pub fn action_reason(&self) -> ActionReason {
        match self.external_reason {
            Some(reason) => ActionReason::External(reason),
            None => ActionReason::Internal(self.internal_reason),
        }
    }

    pub fn decision(&self) -> Option<&ControlDecision> {
        self.last_decision.as_ref()
    }

    pub fn environment(&self) -> &EnvironmentTracker {
        &self.environment
    }

    pub fn openings(&self) -> &OpeningDebouncer {
        &self.openings
    }

    pub fn equipment(&self, role: EquipmentRole) -> Option<&EquipmentMachine> {
        self.equipment.iter().find(|machine| machine.role() == role)
    }

    pub fn is_on(&self, role: EquipmentRole) -> bool {
        self.equipment(role).is_some_and(EquipmentMachine::is_on)
    }

    pub fn fan_zone_enabled(&self) -> bool {
        self.fan_zone_enabled
    }

    pub fn available_modes(&self) -> Vec<HvacMode> {
        if let Some(pump) = &self.heat_pump {
            return pump.available_modes();
        }
        [
            HvacMode::Off,
            HvacMode::Heat,
            HvacMode::Cool,
            HvacMode::HeatCool,
            HvacMode::FanOnly,
            HvacMode::Dry,
        ]
        .into_iter()
        .filter(|mode| self.supports(*mode))
        .collect()
    }

    pub fn update_sensor(&mut self, kind: SensorKind, value: f32, now_ms: u64) -> bool {
        let accepted = self.environment.update(kind, value, now_ms);
        if !accepted {
            debug!(?kind, value, "sensor reading rejected");
        }
        accepted
    }

    pub fn mark_sensor_unavailable(&mut self, kind: SensorKind) {
        self.environment.mark_unavailable(kind);
    }

    pub fn set_opening(
        &mut self,
        id: &str,
        raw: RawContact,
        now_ms: u64,
    ) -> Result<(), ControlError> {
        self.openings.set_raw(id, raw, now_ms)
    }

    pub fn set_heat_pump_cooling(&mut self, cooling: Option<bool>) -> bool {
        let Some(pump) = self.heat_pump.as_mut() else {
            return false;
        };
        let changed = pump.set_cooling(cooling);
        if changed {
            // The single switch changes role; start the band from scratch.
            self.demand = Demand::default();
            info!(?cooling, "heat pump direction changed");
        }
        changed
    }

    /// Sets the live target. Leaves any active preset label and its saved
    /// snapshot untouched.
    pub fn set_target(&mut self, target: TargetSpec) -> Result<bool, ControlError> {
        if !target.is_valid() {
            return Err(ControlError::InvalidTarget);
        }
        let clamped = target.clamp(self.config.min_temp, self.config.max_temp);
        if !clamped.is_valid() {
            return Err(ControlError::InvalidTarget);
        }
        if clamped == self.target {
            return Ok(false);
        }
        self.target = clamped;
        Ok(true)
    }

    pub fn set_target_humidity(&mut self, humidity: f32) -> Result<bool, ControlError> {
        if !self.config.valid_humidity.contains(humidity) {
            return Err(ControlError::InvalidTarget);
        }
        let changed = self.target_humidity != Some(humidity);
        self.target_humidity = Some(humidity);
        Ok(changed)
    }

    pub fn set_mode(&mut self, mode: HvacMode) -> Result<bool, ControlError> {
        if let Some(err) = &self.misconfiguration {
            return Err(ControlError::Misconfigured(err.clone()));
        }
        if !self.supports(mode) {
            warn!(?mode, "mode rejected: equipment not configured");
            return Err(ControlError::ModeUnsupported(mode));
        }
        if let Some(pump) = &self.heat_pump {
            if !pump.accepts(mode) {
                warn!(?mode, "mode rejected by heat pump direction");
                self.rejected_mode = Some(mode);
                return Err(ControlError::ModeUnavailable(mode));
            }
        }

        self.rejected_mode = None;
        if self.mode == mode {
            return Ok(false);
        }
        info!(from = ?self.mode, to = ?mode, "hvac mode changed");
        self.mode = mode;
        self.demand = Demand::default();
        Ok(true)
    }

    /// Activates a configured preset, or clears it with `"none"`.
    pub fn set_preset(&mut self, name: &str) -> Result<bool, ControlError> {
        if name.eq_ignore_ascii_case(PRESET_NONE) {
            let Some(saved) = self.presets.deactivate() else {
                return Ok(false);
            };
            info!("preset cleared, restoring manual target");
            self.target = saved.target;
            self.target_humidity = saved.humidity;
            return Ok(true);
        }

        let Some(preset) = self.config.presets.get(name).copied() else {
            warn!(preset = name, "unknown preset rejected");
            return Err(ControlError::UnknownPreset(name.to_string()));
        };

        self.presets.activate(
            name,
            SavedTarget {
                target: self.target,
                humidity: self.target_humidity,
            },
        );
        self.target = preset.target;
        if preset.humidity.is_some() {
            self.target_humidity = preset.humidity;
        }
        info!(preset = name, "preset activated");
        Ok(true)
    }

    pub fn set_fan_zone_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.fan_zone_enabled != enabled;
        self.fan_zone_enabled = enabled;
        changed
    }

    /// Only this call changes the external reason; ticks never do.
    pub fn set_external_reason(&mut self, reason: Option<ExternalActionReason>) {
        self.external_reason = reason;
    }

    /// One control pass: refresh gates, decide, drive every switch.
    pub fn tick(&mut self, now: DateTime<FixedOffset>) -> Vec<EngineAction> {
        let now_ms = epoch_ms(&now);
        let today = now.date_naive();

        for machine in &mut self.equipment {
            machine.refresh_day(today);
        }
        for transition in self.openings.tick(now_ms) {
            info!(opening = %transition.id, open = transition.open, "opening state changed");
        }

        let plan = self.plan(now_ms);
        let actions = self.drive(&plan, now_ms);

        self.hvac_action = self.derive_action(plan.reason);
        self.internal_reason = plan.reason;
        self.last_decision = Some(ControlDecision {
            hvac_action: self.hvac_action,
            action_reason: plan.reason,
            equipment_targets: self
                .equipment
                .iter()
                .map(|machine| (machine.role(), plan.target(machine.role())))
                .collect(),
        });

        actions
    }

    pub fn status(&self, now_ms: u64) -> ControllerStatus {
        ControllerStatus {
            hvac_mode: self.mode.as_str(),
            hvac_action: self.hvac_action.as_str(),
            action_reason: self.action_reason().as_str(),
            internal_reason: self.internal_reason.as_str(),
            external_reason: self.external_reason.map(ExternalActionReason::as_str),
            current_temp: self.environment.read(SensorKind::Temperature, now_ms),
            current_humidity: self.environment.read(SensorKind::Humidity, now_ms),
            floor_temp: self.environment.read(SensorKind::FloorTemperature, now_ms),
            outside_temp: self.environment.read(SensorKind::OutsideTemperature, now_ms),
            target: self.target,
            target_humidity: self.target_humidity,
            preset: self.presets.active().map(str::to_string),
            available_modes: self
                .available_modes()
                .into_iter()
                .map(HvacMode::as_str)
                .collect(),
            equipment: self.equipment_states(),
            opening_open: self.openings.is_any_open(self.mode),
            fan_zone_enabled: self.fan_zone_enabled,
            aux_engaged_today: self
                .equipment(EquipmentRole::AuxHeater)
                .is_some_and(EquipmentMachine::engaged_today),
            sensor_valid: !self.environment.stalled(SensorKind::Temperature, now_ms)
                && self.environment.read(SensorKind::Temperature, now_ms).is_some(),
        }
    }

    pub fn state_payload(&self, now_ms: u64) -> ControllerStatePayload {
        ControllerStatePayload {
            mode: self.mode.as_str(),
            action: self.hvac_action.as_str(),
            reason: self.action_reason().as_str(),
            temp: self.environment.read(SensorKind::Temperature, now_ms),
            humidity: self.environment.read(SensorKind::Humidity, now_ms),
            target: self.target,
            preset: self.presets.active().map(str::to_string),
            equipment: self.equipment_states(),
        }
    }

    fn equipment_states(&self) -> BTreeMap<EquipmentRole, SwitchState> {
        self.equipment
            .iter()
            .map(|machine| (machine.role(), machine.actual()))
            .collect()
    }

    fn supports(&self, mode: HvacMode) -> bool {
        let has = |role| self.config.equipment.switch_for(role).is_some();
        let heat_pump = self.heat_pump.is_some();
        match mode {
            HvacMode::Off => true,
            HvacMode::Heat => has(EquipmentRole::Heater),
            HvacMode::Cool => has(EquipmentRole::Cooler) || heat_pump,
            HvacMode::HeatCool => {
                (has(EquipmentRole::Heater) && has(EquipmentRole::Cooler)) || heat_pump
            }
            HvacMode::FanOnly => has(EquipmentRole::Fan) && !heat_pump,
            HvacMode::Dry => has(EquipmentRole::Dryer) && !heat_pump,
        }
    }

    fn mode_available(&self, mode: HvacMode) -> bool {
        self.supports(mode)
            && self
                .heat_pump
                .as_ref()
                .map(|pump| pump.accepts(mode))
                .unwrap_or(true)
    }

    fn heat_setpoint(&self) -> f32 {
        match self.target {
            TargetSpec::Single(value) => value,
            TargetSpec::Range { low, .. } => low,
        }
    }

    fn cool_setpoint(&self) -> f32 {
        match self.target {
            TargetSpec::Single(value) => value,
            TargetSpec::Range { high, .. } => high,
        }
    }

    /// Whether the heater switch is currently doing the heating.
    fn heater_heats(&self) -> bool {
        if self.config.equipment.heater.is_none() {
            return false;
        }
        match &self.heat_pump {
            Some(pump) => !pump.is_cooling(),
            None => matches!(self.mode, HvacMode::Heat | HvacMode::HeatCool),
        }
    }

    fn floor_gate(&self, now_ms: u64) -> Option<FloorGate> {
        if !self.heater_heats() {
            return None;
        }
        let floor = self
            .environment
            .read(SensorKind::FloorTemperature, now_ms)?;
        let limits = &self.config.floor;

        if limits.max_floor_temp.is_some_and(|max| floor >= max) {
            return Some(FloorGate::TooHot);
        }
        if limits.min_floor_temp.is_some_and(|min| floor <= min) {
            return Some(FloorGate::TooCold);
        }
        None
    }

    fn plan(&mut self, now_ms: u64) -> Plan {
        if self.misconfiguration.is_some()
            || self.rejected_mode.is_some()
            || !self.mode_available(self.mode)
        {
            self.demand = Demand::default();
            return Plan::shutdown(InternalActionReason::Misconfiguration);
        }

        if self.mode == HvacMode::Off {
            self.demand = Demand::default();
            return Plan::shutdown(InternalActionReason::None);
        }

        if self.mode == HvacMode::Dry {
            return self.plan_humidity(now_ms);
        }

        if self.environment.stalled(SensorKind::Temperature, now_ms) {
            debug!("temperature sensor stalled, forcing equipment off");
            self.demand = Demand::default();
            return Plan::shutdown(InternalActionReason::TemperatureSensorStalled);
        }

        let floor = self.floor_gate(now_ms);

        if self.openings.is_any_open(self.mode) {
            self.demand = Demand::default();
            let mut plan = Plan::shutdown(InternalActionReason::Opening);
            match floor {
                Some(FloorGate::TooHot) => plan.reason = InternalActionReason::FloorTempLimit,
                Some(FloorGate::TooCold) => {
                    plan.force(EquipmentRole::Heater, true);
                    plan.reason = InternalActionReason::FloorTempProtection;
                }
                None => {}
            }
            return plan;
        }

        let mut plan = match self.environment.read(SensorKind::Temperature, now_ms) {
            Some(current) => self.plan_temperature(current, now_ms),
            None => {
                self.demand = Demand::default();
                Plan::hold(InternalActionReason::None)
            }
        };

        match floor {
            Some(FloorGate::TooHot) => {
                debug!("floor over max temperature, heater held off");
                plan.force(EquipmentRole::Heater, false);
                plan.force(EquipmentRole::AuxHeater, false);
                plan.reason = InternalActionReason::FloorTempLimit;
            }
            Some(FloorGate::TooCold) => {
                debug!("floor under min temperature, heater forced on");
                plan.force(EquipmentRole::Heater, true);
                // Heating and cooling never run against each other.
                plan.force(EquipmentRole::Cooler, false);
                self.demand.cool = false;
                plan.reason = InternalActionReason::FloorTempProtection;
            }
            None => {}
        }

        plan
    }

    fn plan_temperature(&mut self, current: f32, now_ms: u64) -> Plan {
        let cold = self.config.tolerances.cold_tolerance;
        let hot = self.config.tolerances.hot_tolerance;

        if let Some(pump) = self.heat_pump {
            let role = pump.role();
            let setpoint = match role {
                HysteresisRole::Heater => self.heat_setpoint(),
                HysteresisRole::Cooler => self.cool_setpoint(),
            };
            let on = decide(role, current, setpoint, cold, hot).resolve(self.demand.heat);
            self.demand = Demand {
                heat: on,
                ..Demand::default()
            };

            let mut plan = Plan::hold(Self::comfort_reason(on));
            plan.set(EquipmentRole::Heater, on);
            return plan;
        }

        match self.mode {
            HvacMode::Heat => {
                self.demand.heat = decide(
                    HysteresisRole::Heater,
                    current,
                    self.heat_setpoint(),
                    cold,
                    hot,
                )
                .resolve(self.demand.heat);
                self.demand.cool = false;
                self.demand.fan = false;
            }
            HvacMode::Cool => {
                self.demand.heat = false;
                self.update_cooling_demand(current, now_ms);
            }
            HvacMode::HeatCool => {
                let heat = decide(
                    HysteresisRole::Heater,
                    current,
                    self.heat_setpoint(),
                    cold,
                    hot,
                );
                self.demand.heat = heat.resolve(self.demand.heat);
                self.update_cooling_demand(current, now_ms);

                if heat == Intent::On {
                    self.demand.cool = false;
                    self.demand.fan = false;
                } else if self.demand.cool || self.demand.fan {
                    self.demand.heat = false;
                }
            }
            HvacMode::FanOnly => {
                self.demand.heat = false;
                self.demand.cool = false;
                self.demand.fan = decide(
                    HysteresisRole::Cooler,
                    current,
                    self.cool_setpoint(),
                    cold,
                    hot,
                )
                .resolve(self.demand.fan);
            }
            HvacMode::Off | HvacMode::Dry => {}
        }
        self.demand.dry = false;

        let reason = if self.demand.heat || self.demand.cool {
            InternalActionReason::TargetTempNotReached
        } else if self.demand.fan && self.mode != HvacMode::FanOnly {
            InternalActionReason::TargetTempNotReachedWithFan
        } else {
            Self::comfort_reason(self.demand.fan)
        };

        let mut plan = Plan::hold(reason);
        self.stage_heating(&mut plan, now_ms);
        plan.set(EquipmentRole::Cooler, self.demand.cool);
        plan.set(EquipmentRole::Fan, self.demand.fan);
        plan
    }

    fn update_cooling_demand(&mut self, current: f32, now_ms: u64) {
        let tolerances = &self.config.tolerances;
        let setpoint = self.cool_setpoint();

        match tolerances.fan_hot_tolerance.filter(|_| self.config.has_fan_zone()) {
            Some(fan_hot_tolerance) => {
                let zone = FanZone {
                    fan_hot_tolerance,
                    enabled: self.fan_zone_enabled,
                    outside_gate: tolerances.fan_air_outside,
                };
                let decision = fan_zone_decide(
                    &zone,
                    current,
                    setpoint,
                    tolerances.cold_tolerance,
                    tolerances.hot_tolerance,
                    self.environment
                        .read(SensorKind::OutsideTemperature, now_ms),
                );
                self.demand.cool = decision.cooler.resolve(self.demand.cool);
                self.demand.fan = decision.fan.resolve(self.demand.fan);
            }
            None => {
                self.demand.cool = decide(
                    HysteresisRole::Cooler,
                    current,
                    setpoint,
                    tolerances.cold_tolerance,
                    tolerances.hot_tolerance,
                )
                .resolve(self.demand.cool);
                self.demand.fan = false;
            }
        }
    }

    /// Splits heating demand across the primary and secondary stages.
    fn stage_heating(&self, plan: &mut Plan, now_ms: u64) {
        if !self.demand.heat {
            plan.set(EquipmentRole::Heater, false);
            plan.set(EquipmentRole::AuxHeater, false);
            return;
        }

        let (Some(aux), Some(timeout_ms)) = (
            self.equipment(EquipmentRole::AuxHeater),
            self.config.secondary_heater.timeout_ms,
        ) else {
            plan.set(EquipmentRole::Heater, true);
            return;
        };

        let primary_on_ms = self
            .equipment(EquipmentRole::Heater)
            .map(|heater| heater.on_duration_ms(now_ms))
            .unwrap_or(0);
        let engage_aux = aux.engaged_today() || aux.is_on() || primary_on_ms >= timeout_ms;

        if engage_aux {
            plan.set(EquipmentRole::AuxHeater, true);
            plan.set(
                EquipmentRole::Heater,
                self.config.secondary_heater.dual_mode,
            );
        } else {
            plan.set(EquipmentRole::Heater, true);
            plan.set(EquipmentRole::AuxHeater, false);
        }
    }

    fn plan_humidity(&mut self, now_ms: u64) -> Plan {
        self.demand.heat = false;
        self.demand.cool = false;
        self.demand.fan = false;

        if self.environment.stalled(SensorKind::Humidity, now_ms) {
            debug!("humidity sensor stalled, forcing dryer off");
            self.demand.dry = false;
            return Plan::shutdown(InternalActionReason::HumiditySensorStalled);
        }
        if self.openings.is_any_open(self.mode) {
            self.demand.dry = false;
            return Plan::shutdown(InternalActionReason::Opening);
        }

        let (Some(current), Some(target)) = (
            self.environment.read(SensorKind::Humidity, now_ms),
            self.target_humidity,
        ) else {
            self.demand.dry = false;
            return Plan::hold(InternalActionReason::None);
        };

        let tolerances = &self.config.tolerances;
        self.demand.dry = decide_humidity(
            current,
            target,
            tolerances.dry_tolerance,
            tolerances.moist_tolerance,
        )
        .resolve(self.demand.dry);

        let reason = if self.demand.dry {
            InternalActionReason::TargetHumidityNotReached
        } else {
            InternalActionReason::TargetHumidityReached
        };
        let mut plan = Plan::hold(reason);
        plan.set(EquipmentRole::Dryer, self.demand.dry);
        plan
    }

    fn comfort_reason(active: bool) -> InternalActionReason {
        if active {
            InternalActionReason::TargetTempNotReached
        } else {
            InternalActionReason::TargetTempReached
        }
    }

    fn drive(&mut self, plan: &Plan, now_ms: u64) -> Vec<EngineAction> {
        let mut actions = Vec::new();

        // Turn-offs are emitted before turn-ons.
        for turning_on in [false, true] {
            for machine in &mut self.equipment {
                let role = machine.role();
                let target = plan.target(role);
                if target.is_on() != turning_on {
                    continue;
                }

                let action = if plan.is_forced(role) {
                    machine.force(target, now_ms)
                } else {
                    machine.request(target);
                    machine.tick(now_ms)
                };
                actions.extend(action);
            }
        }

        actions
    }

    fn derive_action(&self, reason: InternalActionReason) -> HvacAction {
        if self.mode == HvacMode::Off || reason == InternalActionReason::Misconfiguration {
            return HvacAction::Off;
        }

        let heater_on = self.is_on(EquipmentRole::Heater) || self.is_on(EquipmentRole::AuxHeater);
        let pump_cooling = self.heat_pump.is_some_and(|pump| pump.is_cooling());

        if heater_on {
            if pump_cooling {
                HvacAction::Cooling
            } else {
                HvacAction::Heating
            }
        } else if self.is_on(EquipmentRole::Cooler) {
            HvacAction::Cooling
        } else if self.is_on(EquipmentRole::Dryer) {
            HvacAction::Drying
        } else if self.is_on(EquipmentRole::Fan) {
            HvacAction::Fan
        } else {
            HvacAction::Idle
        }
    }
}
