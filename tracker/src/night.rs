//! Sunset/sunrise latch. Edge-triggered so servos are switched off once per
//! night and re-engaged once per morning.

/// What an Auto cycle should do with the freshly computed target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NightAction {
    /// Sun just set: latch and power the servos down
    Sleep,
    /// Still night: nothing to do
    Rest,
    /// Sun just rose: clear the latch and glide to the target
    Wake,
    /// Daytime tracking: jump to the target
    Track,
}

impl NightAction {
    /// Latch value after applying this action
    pub fn is_night(&self) -> bool {
        matches!(self, NightAction::Sleep | NightAction::Rest)
    }
}

pub fn evaluate(is_night: bool, sun_altitude: f32) -> NightAction {
    if sun_altitude <= 0.0 {
        if is_night {
            NightAction::Rest
        } else {
            NightAction::Sleep
        }
    } else if is_night {
        NightAction::Wake
    } else {
        NightAction::Track
    }
}
