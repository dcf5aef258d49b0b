use crate::demo::DemoSweep;
use crate::states::Mode;

/// Everything the control loop and the request layer share. Lives only
/// inside the controller's lock.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerState {
    pub mode: Mode,
    pub current_horizontal: i32,
    pub current_vertical: i32,
    pub sun_azimuth: f32,
    pub sun_altitude: f32,
    pub panel_voltage: f32,
    pub is_night: bool,
    pub demo: DemoSweep,
    pub needs_restart: bool,
}

impl Default for TrackerState {
    fn default() -> Self {
        TrackerState {
            mode: Mode::Auto,
            current_horizontal: 90,
            current_vertical: 90,
            sun_azimuth: 0.0,
            sun_altitude: 0.0,
            panel_voltage: 0.0,
            is_night: false,
            demo: DemoSweep::default(),
            needs_restart: false,
        }
    }
}

/// Copy of the status fields taken under the lock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub mode: Mode,
    pub current_horizontal: i32,
    pub current_vertical: i32,
    pub sun_azimuth: f32,
    pub sun_altitude: f32,
    pub panel_voltage: f32,
    pub is_night: bool,
}

impl TrackerState {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            mode: self.mode,
            current_horizontal: self.current_horizontal,
            current_vertical: self.current_vertical,
            sun_azimuth: self.sun_azimuth,
            sun_altitude: self.sun_altitude,
            panel_voltage: self.panel_voltage,
            is_night: self.is_night,
        }
    }
}
