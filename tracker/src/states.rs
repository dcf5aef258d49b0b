// This module contains the operating modes of the tracker.
// To add a mode, extend `Mode` and its code table below.

use std::time::Duration;

/// - Auto: follows the sun from the computed solar position
/// - Manual: holds whatever pose the last manual command set
/// - Calibration: holds the fixed 90/90 pose
/// - Demo: runs the unattended demonstration sweep
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum Mode {
    #[default]
    Auto,
    Manual,
    Calibration,
    Demo,
}

pub const DEMO_CYCLE: Duration = Duration::from_millis(100);
pub const TRACKING_CYCLE: Duration = Duration::from_millis(2000);

impl Mode {
    /// Map the numeric mode code used by the request layer
    pub fn from_code(code: u8) -> Option<Mode> {
        match code {
            0 => Some(Mode::Auto),
            1 => Some(Mode::Manual),
            2 => Some(Mode::Calibration),
            3 => Some(Mode::Demo),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Mode::Auto => 0,
            Mode::Manual => 1,
            Mode::Calibration => 2,
            Mode::Demo => 3,
        }
    }

    /// Pause between control loop cycles while in this mode
    pub fn cycle_period(&self) -> Duration {
        match self {
            Mode::Demo => DEMO_CYCLE,
            _ => TRACKING_CYCLE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Auto => "auto",
            Mode::Manual => "manual",
            Mode::Calibration => "calibration",
            Mode::Demo => "demo",
        }
    }
}
