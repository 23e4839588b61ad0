use thiserror::Error;

use crate::types::{EquipmentRole, HvacMode};

/// Raised while resolving the configuration. The engine absorbs it into a
/// permanent misconfiguration instead of failing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no equipment switch configured")]
    NoEquipment,
    #[error("{role:?} switch `{switch}` is also used as a sensor")]
    SwitchIsSensor { role: EquipmentRole, switch: String },
    #[error("switch `{0}` is assigned to more than one role")]
    SharedSwitch(String),
    #[error("floor temperature limits require a floor sensor")]
    FloorLimitsWithoutSensor,
    #[error("min_floor_temp ({min}) must be below max_floor_temp ({max})")]
    FloorLimitsInverted { min: f32, max: f32 },
    #[error("secondary heater requires a primary heater")]
    SecondaryWithoutHeater,
    #[error("secondary heater requires secondary_heater_timeout_ms")]
    SecondaryWithoutTimeout,
    #[error("fan_hot_tolerance requires a fan switch")]
    FanToleranceWithoutFan,
    #[error("dryer requires a humidity sensor")]
    DryerWithoutHumiditySensor,
    #[error("heat pump mode requires a heater switch")]
    HeatPumpWithoutHeater,
    #[error("heat pump mode drives a single switch; remove the cooler")]
    HeatPumpWithCooler,
    #[error("tolerance `{0}` must be a non-negative number")]
    InvalidTolerance(&'static str),
    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("min_temp ({min}) must be below max_temp ({max})")]
    TempBoundsInverted { min: f32, max: f32 },
    #[error("preset `{0}` has an invalid target")]
    InvalidPreset(String),
    #[error("initial target is not a valid setpoint or range")]
    InvalidInitialTarget,
    #[error("opening `{0}` is configured more than once")]
    DuplicateOpening(String),
}

/// Synchronous rejection of a command. No state changes when one of these is
/// returned, except the sticky misconfiguration recorded for
/// [`ControlError::ModeUnavailable`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("unknown preset `{0}`")]
    UnknownPreset(String),
    #[error("unknown opening `{0}`")]
    UnknownOpening(String),
    #[error("mode {0:?} needs equipment that is not configured")]
    ModeUnsupported(HvacMode),
    #[error("mode {0:?} is not available while the heat pump reports the opposite direction")]
    ModeUnavailable(HvacMode),
    #[error("invalid target")]
    InvalidTarget,
    #[error("controller is misconfigured: {0}")]
    Misconfigured(ConfigError),
}
