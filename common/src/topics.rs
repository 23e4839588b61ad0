use crate::environment::SensorKind;

pub const TOPIC_SENSOR_TEMP: &str = "thermostat/sensor/temperature";
pub const TOPIC_SENSOR_HUMIDITY: &str = "thermostat/sensor/humidity";
pub const TOPIC_SENSOR_FLOOR: &str = "thermostat/sensor/floor";
pub const TOPIC_SENSOR_OUTSIDE: &str = "thermostat/sensor/outside";
pub const TOPIC_OPENING_PREFIX: &str = "thermostat/opening/";
pub const TOPIC_HEAT_PUMP_COOLING: &str = "thermostat/heat_pump/cooling";

pub const TOPIC_CONTROLLER_STATE: &str = "thermostat/controller/state";

pub const TOPIC_CMD_TARGET: &str = "thermostat/cmnd/target";
pub const TOPIC_CMD_TARGET_LOW_HIGH: &str = "thermostat/cmnd/target_low_high";
pub const TOPIC_CMD_HUMIDITY: &str = "thermostat/cmnd/humidity";
pub const TOPIC_CMD_MODE: &str = "thermostat/cmnd/mode";
pub const TOPIC_CMD_PRESET: &str = "thermostat/cmnd/preset";
pub const TOPIC_CMD_REASON: &str = "thermostat/cmnd/reason";
pub const TOPIC_CMD_FAN_ZONE: &str = "thermostat/cmnd/fan_zone";

pub fn sensor_topic(kind: SensorKind) -> &'static str {
    match kind {
        SensorKind::Temperature => TOPIC_SENSOR_TEMP,
        SensorKind::Humidity => TOPIC_SENSOR_HUMIDITY,
        SensorKind::FloorTemperature => TOPIC_SENSOR_FLOOR,
        SensorKind::OutsideTemperature => TOPIC_SENSOR_OUTSIDE,
    }
}

pub fn sensor_kind_for_topic(topic: &str) -> Option<SensorKind> {
    SensorKind::ALL
        .into_iter()
        .find(|kind| sensor_topic(*kind) == topic)
}

/// Topic for one opening contact. `opening_topic("+")` is the subscription filter.
pub fn opening_topic(id: &str) -> String {
    format!("{TOPIC_OPENING_PREFIX}{id}")
}

pub fn opening_id_for_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(TOPIC_OPENING_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Command topic for an equipment switch. Payload is `ON` or `OFF`.
pub fn switch_topic(switch_ref: &str) -> String {
    format!("thermostat/switch/{switch_ref}/set")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_topics_map_back_to_kinds() {
        for kind in SensorKind::ALL {
            assert_eq!(sensor_kind_for_topic(sensor_topic(kind)), Some(kind));
        }
        assert_eq!(sensor_kind_for_topic("thermostat/sensor/pressure"), None);
    }

    #[test]
    fn opening_ids_are_taken_from_the_suffix() {
        assert_eq!(
            opening_id_for_topic(&opening_topic("kitchen_window")),
            Some("kitchen_window")
        );
        assert_eq!(opening_id_for_topic("thermostat/opening/"), None);
        assert_eq!(opening_id_for_topic(TOPIC_CMD_MODE), None);
    }

    #[test]
    fn opening_wildcard_covers_every_opening() {
        let filter = opening_topic("+");
        assert_eq!(filter, "thermostat/opening/+");
        assert!(opening_topic("front_door").starts_with(filter.trim_end_matches('+')));
    }

    #[test]
    fn switch_topic_embeds_reference() {
        assert_eq!(
            switch_topic("switch.heater"),
            "thermostat/switch/switch.heater/set"
        );
    }
}
