use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    FanOnly,
    Dry,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::HeatCool => "heat_cool",
            Self::FanOnly => "fan_only",
            Self::Dry => "dry",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "heat" => Some(Self::Heat),
            "cool" => Some(Self::Cool),
            "heat_cool" | "heatcool" | "auto" => Some(Self::HeatCool),
            "fan_only" | "fan" => Some(Self::FanOnly),
            "dry" => Some(Self::Dry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacAction {
    Off,
    Idle,
    Heating,
    Cooling,
    Fan,
    Drying,
}

impl HvacAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Idle => "idle",
            Self::Heating => "heating",
            Self::Cooling => "cooling",
            Self::Fan => "fan",
            Self::Drying => "drying",
        }
    }
}

/// Reason derived by the engine on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalActionReason {
    None,
    TargetTempNotReached,
    TargetTempReached,
    TargetTempNotReachedWithFan,
    TargetHumidityNotReached,
    TargetHumidityReached,
    Misconfiguration,
    Opening,
    FloorTempLimit,
    FloorTempProtection,
    TemperatureSensorStalled,
    HumiditySensorStalled,
}

impl InternalActionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::TargetTempNotReached => "target_temp_not_reached",
            Self::TargetTempReached => "target_temp_reached",
            Self::TargetTempNotReachedWithFan => "target_temp_not_reached_with_fan",
            Self::TargetHumidityNotReached => "target_humidity_not_reached",
            Self::TargetHumidityReached => "target_humidity_reached",
            Self::Misconfiguration => "misconfiguration",
            Self::Opening => "opening",
            Self::FloorTempLimit => "limit",
            Self::FloorTempProtection => "floor_protection",
            Self::TemperatureSensorStalled => "temperature_sensor_stalled",
            Self::HumiditySensorStalled => "humidity_sensor_stalled",
        }
    }
}

/// Reason set from outside (automations, service calls). Ticks never touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalActionReason {
    Presence,
    Schedule,
    Emergency,
    Malfunction,
}

impl ExternalActionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Presence => "presence",
            Self::Schedule => "schedule",
            Self::Emergency => "emergency",
            Self::Malfunction => "malfunction",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "presence" => Some(Self::Presence),
            "schedule" => Some(Self::Schedule),
            "emergency" => Some(Self::Emergency),
            "malfunction" => Some(Self::Malfunction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ActionReason {
    Internal(InternalActionReason),
    External(ExternalActionReason),
}

impl ActionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal(reason) => reason.as_str(),
            Self::External(reason) => reason.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentRole {
    Heater,
    AuxHeater,
    Cooler,
    Fan,
    Dryer,
}

impl EquipmentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heater => "heater",
            Self::AuxHeater => "aux_heater",
            Self::Cooler => "cooler",
            Self::Fan => "fan",
            Self::Dryer => "dryer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }

    pub fn from_bool(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Single(f32),
    Range { low: f32, high: f32 },
}

impl TargetSpec {
    pub fn single(&self) -> Option<f32> {
        match *self {
            Self::Single(value) => Some(value),
            Self::Range { .. } => None,
        }
    }

    pub fn range(&self) -> Option<(f32, f32)> {
        match *self {
            Self::Single(_) => None,
            Self::Range { low, high } => Some((low, high)),
        }
    }

    pub fn is_valid(&self) -> bool {
        match *self {
            Self::Single(value) => value.is_finite(),
            Self::Range { low, high } => low.is_finite() && high.is_finite() && low < high,
        }
    }

    /// Clamps into `[min, max]`. Unordered or NaN bounds leave the target as is.
    pub fn clamp(self, min: f32, max: f32) -> Self {
        if min.is_nan() || max.is_nan() || min > max {
            return self;
        }
        match self {
            Self::Single(value) => Self::Single(value.clamp(min, max)),
            Self::Range { low, high } => Self::Range {
                low: low.clamp(min, max),
                high: high.clamp(min, max),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    #[serde(rename = "hvacMode")]
    pub hvac_mode: &'static str,
    #[serde(rename = "hvacAction")]
    pub hvac_action: &'static str,
    #[serde(rename = "actionReason")]
    pub action_reason: &'static str,
    #[serde(rename = "internalReason")]
    pub internal_reason: &'static str,
    #[serde(rename = "externalReason")]
    pub external_reason: Option<&'static str>,
    #[serde(rename = "currentTemp")]
    pub current_temp: Option<f32>,
    #[serde(rename = "currentHumidity")]
    pub current_humidity: Option<f32>,
    #[serde(rename = "floorTemp")]
    pub floor_temp: Option<f32>,
    #[serde(rename = "outsideTemp")]
    pub outside_temp: Option<f32>,
    pub target: TargetSpec,
    #[serde(rename = "targetHumidity")]
    pub target_humidity: Option<f32>,
    pub preset: Option<String>,
    #[serde(rename = "availableModes")]
    pub available_modes: Vec<&'static str>,
    pub equipment: BTreeMap<EquipmentRole, SwitchState>,
    #[serde(rename = "openingOpen")]
    pub opening_open: bool,
    #[serde(rename = "fanZoneEnabled")]
    pub fan_zone_enabled: bool,
    #[serde(rename = "auxEngagedToday")]
    pub aux_engaged_today: bool,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatePayload {
    pub mode: &'static str,
    pub action: &'static str,
    pub reason: &'static str,
    pub temp: Option<f32>,
    pub humidity: Option<f32>,
    pub target: TargetSpec,
    pub preset: Option<String>,
    pub equipment: BTreeMap<EquipmentRole, SwitchState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_aliases() {
        assert_eq!(HvacMode::parse("HEAT"), Some(HvacMode::Heat));
        assert_eq!(HvacMode::parse("auto"), Some(HvacMode::HeatCool));
        assert_eq!(HvacMode::parse(" fan_only "), Some(HvacMode::FanOnly));
        assert_eq!(HvacMode::parse("boost"), None);
    }

    #[test]
    fn target_range_must_be_ordered() {
        assert!(TargetSpec::Range { low: 18.0, high: 24.0 }.is_valid());
        assert!(!TargetSpec::Range { low: 24.0, high: 24.0 }.is_valid());
        assert!(!TargetSpec::Single(f32::NAN).is_valid());
    }

    #[test]
    fn clamp_ignores_unordered_bounds() {
        assert_eq!(TargetSpec::Single(40.0).clamp(7.0, 35.0), TargetSpec::Single(35.0));
        assert_eq!(TargetSpec::Single(20.0).clamp(30.0, 10.0), TargetSpec::Single(20.0));
        assert_eq!(
            TargetSpec::Range { low: 18.0, high: 24.0 }.clamp(f32::NAN, 10.0),
            TargetSpec::Range { low: 18.0, high: 24.0 }
        );
    }

    #[test]
    fn target_spec_deserializes_both_shapes() {
        let single: TargetSpec = serde_json::from_str("21.5").unwrap();
        assert_eq!(single, TargetSpec::Single(21.5));

        let range: TargetSpec = serde_json::from_str(r#"{"low":18.0,"high":24.0}"#).unwrap();
        assert_eq!(range, TargetSpec::Range { low: 18.0, high: 24.0 });
    }

    #[test]
    fn external_reason_overrides_display_string() {
        let reason = ActionReason::External(ExternalActionReason::Emergency);
        assert_eq!(reason.as_str(), "emergency");
        assert_eq!(
            ActionReason::Internal(InternalActionReason::FloorTempLimit).as_str(),
            "limit"
        );
    }
}
