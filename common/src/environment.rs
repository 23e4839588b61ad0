use crate::config::{ThermostatConfig, ValidRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Temperature,
    Humidity,
    FloorTemperature,
    OutsideTemperature,
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        Self::Temperature,
        Self::Humidity,
        Self::FloorTemperature,
        Self::OutsideTemperature,
    ];

    fn index(self) -> usize {
        match self {
            Self::Temperature => 0,
            Self::Humidity => 1,
            Self::FloorTemperature => 2,
            Self::OutsideTemperature => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    pub value: Option<f32>,
    pub last_updated_ms: Option<u64>,
}

#[derive(Debug, Clone)]
struct Channel {
    reading: Reading,
    stale_after_ms: Option<u64>,
    valid: ValidRange,
}

/// Latest reading per sensor kind. Samples older than the stale duration are
/// hidden from [`EnvironmentTracker::read`] but stay in memory.
#[derive(Debug, Clone)]
pub struct EnvironmentTracker {
    channels: [Channel; 4],
}

impl EnvironmentTracker {
    pub fn new(stale_after_ms: Option<u64>, valid_temp: ValidRange, valid_humidity: ValidRange) -> Self {
        let channel = |valid: &ValidRange| Channel {
            reading: Reading::default(),
            stale_after_ms,
            valid: valid.clone(),
        };

        Self {
            channels: [
                channel(&valid_temp),
                channel(&valid_humidity),
                channel(&valid_temp),
                // Outside air only gates the fan zone; it never shuts equipment down.
                Channel {
                    stale_after_ms: None,
                    ..channel(&valid_temp)
                },
            ],
        }
    }

    pub fn from_config(config: &ThermostatConfig) -> Self {
        Self::new(
            config.stale_duration_ms,
            config.valid_temp.clone(),
            config.valid_humidity.clone(),
        )
    }

    /// Records a reading. Non-finite or out-of-range values are rejected and
    /// leave the previous sample in place.
    pub fn update(&mut self, kind: SensorKind, value: f32, now_ms: u64) -> bool {
        let channel = &mut self.channels[kind.index()];
        if !channel.valid.contains(value) {
            return false;
        }
        channel.reading = Reading {
            value: Some(value),
            last_updated_ms: Some(now_ms),
        };
        true
    }

    pub fn mark_unavailable(&mut self, kind: SensorKind) {
        self.channels[kind.index()].reading.value = None;
    }

    pub fn read(&self, kind: SensorKind, now_ms: u64) -> Option<f32> {
        if self.stalled(kind, now_ms) {
            return None;
        }
        self.channels[kind.index()].reading.value
    }

    pub fn raw(&self, kind: SensorKind) -> Reading {
        self.channels[kind.index()].reading
    }

    /// A reading was received at some point and has since aged past the
    /// stale duration.
    pub fn stalled(&self, kind: SensorKind, now_ms: u64) -> bool {
        let channel = &self.channels[kind.index()];
        match (channel.stale_after_ms, channel.reading.last_updated_ms) {
            (Some(stale_after), Some(last)) => now_ms.saturating_sub(last) >= stale_after,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(stale_after_ms: Option<u64>) -> EnvironmentTracker {
        EnvironmentTracker::new(
            stale_after_ms,
            ValidRange {
                min: -40.0,
                max: 100.0,
            },
            ValidRange {
                min: 0.0,
                max: 100.0,
            },
        )
    }

    #[test]
    fn returns_latest_reading() {
        let mut env = tracker(Some(60_000));
        assert_eq!(env.read(SensorKind::Temperature, 0), None);

        assert!(env.update(SensorKind::Temperature, 20.5, 1_000));
        assert!(env.update(SensorKind::Temperature, 21.0, 2_000));

        assert_eq!(env.read(SensorKind::Temperature, 2_500), Some(21.0));
    }

    #[test]
    fn stale_reading_is_hidden_until_refreshed() {
        let mut env = tracker(Some(60_000));
        env.update(SensorKind::Temperature, 20.0, 0);

        assert!(!env.stalled(SensorKind::Temperature, 59_999));
        assert!(env.stalled(SensorKind::Temperature, 60_000));
        assert_eq!(env.read(SensorKind::Temperature, 60_000), None);
        assert_eq!(env.raw(SensorKind::Temperature).value, Some(20.0));

        env.update(SensorKind::Temperature, 20.2, 70_000);
        assert!(!env.stalled(SensorKind::Temperature, 70_000));
        assert_eq!(env.read(SensorKind::Temperature, 70_000), Some(20.2));
    }

    #[test]
    fn rejects_invalid_values() {
        let mut env = tracker(None);
        env.update(SensorKind::Humidity, 45.0, 0);

        assert!(!env.update(SensorKind::Humidity, f32::NAN, 10));
        assert!(!env.update(SensorKind::Humidity, 140.0, 10));
        assert_eq!(env.raw(SensorKind::Humidity).last_updated_ms, Some(0));
        assert_eq!(env.read(SensorKind::Humidity, 10), Some(45.0));
    }

    #[test]
    fn never_stalls_without_a_first_reading_or_duration() {
        let env = tracker(Some(1_000));
        assert!(!env.stalled(SensorKind::FloorTemperature, 1_000_000));

        let mut env = tracker(None);
        env.update(SensorKind::Temperature, 20.0, 0);
        assert!(!env.stalled(SensorKind::Temperature, u64::MAX));
    }

    #[test]
    fn outside_temperature_does_not_go_stale() {
        let mut env = tracker(Some(1_000));
        env.update(SensorKind::OutsideTemperature, 30.0, 0);

        assert_eq!(env.read(SensorKind::OutsideTemperature, 10_000), Some(30.0));
    }

    #[test]
    fn unavailable_clears_value() {
        let mut env = tracker(Some(1_000));
        env.update(SensorKind::FloorTemperature, 22.0, 0);
        env.mark_unavailable(SensorKind::FloorTemperature);

        assert_eq!(env.read(SensorKind::FloorTemperature, 10), None);
    }
}
