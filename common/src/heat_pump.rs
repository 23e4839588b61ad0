use crate::{hysteresis::HysteresisRole, types::HvacMode};

/// Single-switch heat pump whose direction comes from an external
/// "currently cooling" signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeatPump {
    cooling: Option<bool>,
}

impl HeatPump {
    /// `None` means the signal is unavailable; treated as heating.
    pub fn set_cooling(&mut self, cooling: Option<bool>) -> bool {
        let changed = self.cooling != cooling;
        self.cooling = cooling;
        changed
    }

    pub fn is_cooling(&self) -> bool {
        self.cooling.unwrap_or(false)
    }

    pub fn role(&self) -> HysteresisRole {
        if self.is_cooling() {
            HysteresisRole::Cooler
        } else {
            HysteresisRole::Heater
        }
    }

    pub fn available_modes(&self) -> Vec<HvacMode> {
        if self.is_cooling() {
            vec![HvacMode::Off, HvacMode::Cool, HvacMode::HeatCool]
        } else {
            vec![HvacMode::Off, HvacMode::Heat, HvacMode::HeatCool]
        }
    }

    pub fn accepts(&self, mode: HvacMode) -> bool {
        self.available_modes().contains(&mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_signal_is_heating_capable() {
        let pump = HeatPump::default();
        assert_eq!(pump.role(), HysteresisRole::Heater);
        assert!(pump.accepts(HvacMode::Heat));
        assert!(!pump.accepts(HvacMode::Cool));
    }

    #[test]
    fn cooling_signal_swaps_available_modes() {
        let mut pump = HeatPump::default();
        assert!(pump.set_cooling(Some(true)));
        assert!(!pump.set_cooling(Some(true)));

        assert_eq!(pump.role(), HysteresisRole::Cooler);
        assert!(pump.accepts(HvacMode::Cool));
        assert!(pump.accepts(HvacMode::HeatCool));
        assert!(!pump.accepts(HvacMode::Heat));
        assert!(!pump.accepts(HvacMode::FanOnly));
    }
}
