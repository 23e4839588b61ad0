use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    types::{EquipmentRole, HvacMode, TargetSpec},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquipmentConfig {
    #[serde(default)]
    pub heater: Option<String>,
    #[serde(default)]
    pub secondary_heater: Option<String>,
    #[serde(default)]
    pub cooler: Option<String>,
    #[serde(default)]
    pub fan: Option<String>,
    #[serde(default)]
    pub dryer: Option<String>,
}

impl EquipmentConfig {
    pub fn switch_for(&self, role: EquipmentRole) -> Option<&str> {
        match role {
            EquipmentRole::Heater => self.heater.as_deref(),
            EquipmentRole::AuxHeater => self.secondary_heater.as_deref(),
            EquipmentRole::Cooler => self.cooler.as_deref(),
            EquipmentRole::Fan => self.fan.as_deref(),
            EquipmentRole::Dryer => self.dryer.as_deref(),
        }
    }

    pub fn configured(&self) -> impl Iterator<Item = (EquipmentRole, &str)> {
        [
            EquipmentRole::Heater,
            EquipmentRole::AuxHeater,
            EquipmentRole::Cooler,
            EquipmentRole::Fan,
            EquipmentRole::Dryer,
        ]
        .into_iter()
        .filter_map(|role| self.switch_for(role).map(|switch| (role, switch)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorConfig {
    pub temperature: String,
    #[serde(default)]
    pub humidity: Option<String>,
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub outside: Option<String>,
    /// Boolean "currently cooling" signal; its presence selects heat pump mode.
    #[serde(default)]
    pub heat_pump_cooling: Option<String>,
}

impl SensorConfig {
    fn references(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.temperature.as_str()).chain(
            [
                self.humidity.as_deref(),
                self.floor.as_deref(),
                self.outside.as_deref(),
                self.heat_pump_cooling.as_deref(),
            ]
            .into_iter()
            .flatten(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToleranceConfig {
    pub cold_tolerance: f32,
    pub hot_tolerance: f32,
    #[serde(default)]
    pub dry_tolerance: f32,
    #[serde(default)]
    pub moist_tolerance: f32,
    /// Width of the fan-before-cooling zone above `target + hot_tolerance`.
    #[serde(default)]
    pub fan_hot_tolerance: Option<f32>,
    /// Suppress the fan zone when outside air is hotter than inside.
    #[serde(default)]
    pub fan_air_outside: bool,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            cold_tolerance: 0.3,
            hot_tolerance: 0.3,
            dry_tolerance: 3.0,
            moist_tolerance: 3.0,
            fan_hot_tolerance: None,
            fan_air_outside: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpeningConfig {
    pub id: String,
    #[serde(default)]
    pub open_timeout_ms: u64,
    #[serde(default)]
    pub close_timeout_ms: u64,
    /// Modes this opening applies to. Empty means every mode.
    #[serde(default)]
    pub modes: Vec<HvacMode>,
}

impl OpeningConfig {
    pub fn new(id: impl Into<String>, open_timeout_ms: u64, close_timeout_ms: u64) -> Self {
        Self {
            id: id.into(),
            open_timeout_ms,
            close_timeout_ms,
            modes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloorConfig {
    #[serde(default)]
    pub min_floor_temp: Option<f32>,
    #[serde(default)]
    pub max_floor_temp: Option<f32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PresetConfig {
    pub target: TargetSpec,
    #[serde(default)]
    pub humidity: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecondaryHeaterConfig {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Keep the primary stage running alongside the secondary one.
    #[serde(default)]
    pub dual_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidRange {
    pub min: f32,
    pub max: f32,
}

impl ValidRange {
    pub fn contains(&self, value: f32) -> bool {
        value.is_finite() && (self.min..=self.max).contains(&value)
    }
}

/// Fully resolved configuration handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermostatConfig {
    pub sensors: SensorConfig,
    #[serde(default)]
    pub equipment: EquipmentConfig,
    #[serde(default)]
    pub tolerances: ToleranceConfig,
    #[serde(default)]
    pub min_cycle_duration_ms: u64,
    #[serde(default)]
    pub keep_alive_ms: Option<u64>,
    #[serde(default)]
    pub stale_duration_ms: Option<u64>,
    #[serde(default)]
    pub openings: Vec<OpeningConfig>,
    #[serde(default)]
    pub floor: FloorConfig,
    #[serde(default)]
    pub presets: BTreeMap<String, PresetConfig>,
    #[serde(default)]
    pub secondary_heater: SecondaryHeaterConfig,
    pub min_temp: f32,
    pub max_temp: f32,
    pub initial_mode: HvacMode,
    pub initial_target: TargetSpec,
    #[serde(default)]
    pub target_humidity: Option<f32>,
    pub valid_temp: ValidRange,
    pub valid_humidity: ValidRange,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            sensors: SensorConfig {
                temperature: "sensor.room_temperature".to_string(),
                ..SensorConfig::default()
            },
            equipment: EquipmentConfig {
                heater: Some("switch.heater".to_string()),
                ..EquipmentConfig::default()
            },
            tolerances: ToleranceConfig::default(),
            min_cycle_duration_ms: 300_000,
            keep_alive_ms: None,
            stale_duration_ms: Some(1_800_000),
            openings: Vec::new(),
            floor: FloorConfig::default(),
            presets: BTreeMap::new(),
            secondary_heater: SecondaryHeaterConfig::default(),
            min_temp: 7.0,
            max_temp: 35.0,
            initial_mode: HvacMode::Off,
            initial_target: TargetSpec::Single(20.0),
            target_humidity: None,
            valid_temp: ValidRange {
                min: -40.0,
                max: 100.0,
            },
            valid_humidity: ValidRange {
                min: 0.0,
                max: 100.0,
            },
        }
    }
}

impl ThermostatConfig {
    pub fn is_heat_pump(&self) -> bool {
        self.sensors.heat_pump_cooling.is_some()
    }

    pub fn has_fan_zone(&self) -> bool {
        self.tolerances.fan_hot_tolerance.is_some() && self.equipment.fan.is_some()
    }

    /// Enforces the conditional dependencies between optional fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let switches: Vec<(EquipmentRole, &str)> = self.equipment.configured().collect();
        if switches.is_empty() {
            return Err(ConfigError::NoEquipment);
        }

        let sensors: HashSet<&str> = self.sensors.references().collect();
        let mut seen = HashSet::new();
        for (role, switch) in &switches {
            if sensors.contains(switch) {
                return Err(ConfigError::SwitchIsSensor {
                    role: *role,
                    switch: switch.to_string(),
                });
            }
            if !seen.insert(*switch) {
                return Err(ConfigError::SharedSwitch(switch.to_string()));
            }
        }

        let tolerances = [
            ("cold_tolerance", Some(self.tolerances.cold_tolerance)),
            ("hot_tolerance", Some(self.tolerances.hot_tolerance)),
            ("dry_tolerance", Some(self.tolerances.dry_tolerance)),
            ("moist_tolerance", Some(self.tolerances.moist_tolerance)),
            ("fan_hot_tolerance", self.tolerances.fan_hot_tolerance),
        ];
        for (name, value) in tolerances {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(ConfigError::InvalidTolerance(name));
                }
            }
        }

        if self.stale_duration_ms == Some(0) {
            return Err(ConfigError::ZeroDuration("stale_duration_ms"));
        }

        if self.min_temp.is_nan() || self.max_temp.is_nan() || self.min_temp >= self.max_temp {
            return Err(ConfigError::TempBoundsInverted {
                min: self.min_temp,
                max: self.max_temp,
            });
        }

        let floor = &self.floor;
        if (floor.min_floor_temp.is_some() || floor.max_floor_temp.is_some())
            && self.sensors.floor.is_none()
        {
            return Err(ConfigError::FloorLimitsWithoutSensor);
        }
        if let (Some(min), Some(max)) = (floor.min_floor_temp, floor.max_floor_temp) {
            if min >= max {
                return Err(ConfigError::FloorLimitsInverted { min, max });
            }
        }

        if self.equipment.secondary_heater.is_some() {
            if self.equipment.heater.is_none() {
                return Err(ConfigError::SecondaryWithoutHeater);
            }
            match self.secondary_heater.timeout_ms {
                None => return Err(ConfigError::SecondaryWithoutTimeout),
                Some(0) => return Err(ConfigError::ZeroDuration("secondary_heater.timeout_ms")),
                Some(_) => {}
            }
        }

        if self.tolerances.fan_hot_tolerance.is_some() && self.equipment.fan.is_none() {
            return Err(ConfigError::FanToleranceWithoutFan);
        }

        if self.equipment.dryer.is_some() && self.sensors.humidity.is_none() {
            return Err(ConfigError::DryerWithoutHumiditySensor);
        }

        if self.is_heat_pump() {
            if self.equipment.heater.is_none() {
                return Err(ConfigError::HeatPumpWithoutHeater);
            }
            if self.equipment.cooler.is_some() {
                return Err(ConfigError::HeatPumpWithCooler);
            }
        }

        if !self.initial_target.is_valid() {
            return Err(ConfigError::InvalidInitialTarget);
        }

        for (name, preset) in &self.presets {
            let in_bounds = match preset.target {
                TargetSpec::Single(value) => (self.min_temp..=self.max_temp).contains(&value),
                TargetSpec::Range { low, high } => {
                    (self.min_temp..=self.max_temp).contains(&low)
                        && (self.min_temp..=self.max_temp).contains(&high)
                }
            };
            if !preset.target.is_valid() || !in_bounds {
                return Err(ConfigError::InvalidPreset(name.clone()));
            }
        }

        let mut opening_ids = HashSet::new();
        for opening in &self.openings {
            if !opening_ids.insert(opening.id.as_str()) {
                return Err(ConfigError::DuplicateOpening(opening.id.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(ThermostatConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_heater_equal_to_sensor() {
        let mut config = ThermostatConfig::default();
        config.equipment.heater = Some(config.sensors.temperature.clone());

        assert!(matches!(
            config.validate(),
            Err(ConfigError::SwitchIsSensor {
                role: EquipmentRole::Heater,
                ..
            })
        ));
    }

    #[test]
    fn floor_limits_require_floor_sensor() {
        let mut config = ThermostatConfig::default();
        config.floor.max_floor_temp = Some(28.0);
        assert_eq!(config.validate(), Err(ConfigError::FloorLimitsWithoutSensor));

        config.sensors.floor = Some("sensor.floor".to_string());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn secondary_heater_requires_timeout() {
        let mut config = ThermostatConfig::default();
        config.equipment.secondary_heater = Some("switch.aux".to_string());
        assert_eq!(config.validate(), Err(ConfigError::SecondaryWithoutTimeout));

        config.secondary_heater.timeout_ms = Some(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("secondary_heater.timeout_ms"))
        );

        config.secondary_heater.timeout_ms = Some(600_000);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn zero_stale_duration_is_rejected() {
        let mut config = ThermostatConfig::default();
        config.stale_duration_ms = Some(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("stale_duration_ms"))
        );

        config.stale_duration_ms = None;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn heat_pump_rejects_separate_cooler() {
        let mut config = ThermostatConfig::default();
        config.sensors.heat_pump_cooling = Some("binary_sensor.hp_cooling".to_string());
        config.equipment.cooler = Some("switch.ac".to_string());

        assert_eq!(config.validate(), Err(ConfigError::HeatPumpWithCooler));
    }

    #[test]
    fn rejects_out_of_bounds_preset() {
        let mut config = ThermostatConfig::default();
        config.presets.insert(
            "away".to_string(),
            PresetConfig {
                target: TargetSpec::Single(2.0),
                humidity: None,
            },
        );

        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidPreset("away".to_string()))
        );
    }

    #[test]
    fn deserializes_minimal_json() {
        let raw = r#"{
            "sensors": { "temperature": "sensor.t" },
            "equipment": { "heater": "switch.h", "cooler": "switch.c" },
            "min_temp": 5.0,
            "max_temp": 30.0,
            "initial_mode": "heat_cool",
            "initial_target": { "low": 19.0, "high": 24.0 },
            "valid_temp": { "min": -40.0, "max": 100.0 },
            "valid_humidity": { "min": 0.0, "max": 100.0 },
            "openings": [{ "id": "window", "open_timeout_ms": 30000, "modes": ["heat"] }]
        }"#;

        let config: ThermostatConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.initial_mode, HvacMode::HeatCool);
        assert_eq!(config.openings[0].close_timeout_ms, 0);
        assert_eq!(config.tolerances.cold_tolerance, 0.3);
        assert_eq!(config.validate(), Ok(()));
    }
}
