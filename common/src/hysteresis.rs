//! Tolerance-band decisions. Everything here is a pure function of its inputs;
//! holding the previous state inside the band is what prevents chatter.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HysteresisRole {
    Heater,
    Cooler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    On,
    Off,
    Unchanged,
}

impl Intent {
    /// Resolves the intent against the state currently held.
    pub fn resolve(self, currently_on: bool) -> bool {
        match self {
            Self::On => true,
            Self::Off => false,
            Self::Unchanged => currently_on,
        }
    }
}

pub fn decide(
    role: HysteresisRole,
    current: f32,
    target: f32,
    cold_tolerance: f32,
    hot_tolerance: f32,
) -> Intent {
    let too_cold = current <= target - cold_tolerance;
    let too_hot = current >= target + hot_tolerance;

    match role {
        HysteresisRole::Heater if too_cold => Intent::On,
        HysteresisRole::Heater if too_hot => Intent::Off,
        HysteresisRole::Cooler if too_hot => Intent::On,
        HysteresisRole::Cooler if too_cold => Intent::Off,
        _ => Intent::Unchanged,
    }
}

/// Dehumidifier: on once humidity reaches `target + moist_tolerance`, off at
/// `target - dry_tolerance`.
pub fn decide_humidity(current: f32, target: f32, dry_tolerance: f32, moist_tolerance: f32) -> Intent {
    if current >= target + moist_tolerance {
        Intent::On
    } else if current <= target - dry_tolerance {
        Intent::Off
    } else {
        Intent::Unchanged
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FanZone {
    pub fan_hot_tolerance: f32,
    /// Runtime toggle; disabled falls back to the plain cooler decision.
    pub enabled: bool,
    /// Skip the fan when outside air is hotter than inside.
    pub outside_gate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanZoneDecision {
    pub cooler: Intent,
    pub fan: Intent,
}

/// Splits the region above `target + hot_tolerance` into a fan band of width
/// `fan_hot_tolerance` followed by the cooler band.
pub fn fan_zone_decide(
    zone: &FanZone,
    current: f32,
    target: f32,
    cold_tolerance: f32,
    hot_tolerance: f32,
    outside: Option<f32>,
) -> FanZoneDecision {
    let cooler = decide(
        HysteresisRole::Cooler,
        current,
        target,
        cold_tolerance,
        hot_tolerance,
    );

    if !zone.enabled {
        return FanZoneDecision {
            cooler,
            fan: Intent::Off,
        };
    }

    match cooler {
        Intent::On => {
            let outside_hotter = zone.outside_gate && outside.is_some_and(|value| value > current);
            let in_fan_band = current < target + hot_tolerance + zone.fan_hot_tolerance;
            if in_fan_band && !outside_hotter {
                FanZoneDecision {
                    cooler: Intent::Off,
                    fan: Intent::On,
                }
            } else {
                FanZoneDecision {
                    cooler: Intent::On,
                    fan: Intent::Off,
                }
            }
        }
        Intent::Off => FanZoneDecision {
            cooler: Intent::Off,
            fan: Intent::Off,
        },
        Intent::Unchanged => FanZoneDecision {
            cooler: Intent::Unchanged,
            fan: Intent::Unchanged,
        },
    }
}
