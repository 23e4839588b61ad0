pub mod config;
pub mod environment;
pub mod equipment;
pub mod error;
pub mod heat_pump;
pub mod hysteresis;
pub mod opening;
pub mod preset;
pub mod thermostat;
pub mod topics;
pub mod types;

pub use config::ThermostatConfig;
pub use environment::SensorKind;
pub use error::{ConfigError, ControlError};
pub use opening::RawContact;
pub use thermostat::{EngineAction, ThermostatEngine};
pub use topics::*;
pub use types::{
    ControllerStatePayload, ControllerStatus, EquipmentRole, ExternalActionReason, HvacAction,
    HvacMode, InternalActionReason, SwitchState, TargetSpec,
};
