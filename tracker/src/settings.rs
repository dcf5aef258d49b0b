/// The part of the stored configuration the controller reads each cycle.
///
/// Replaced as a whole between cycles, never edited in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub latitude: f64,
    pub longitude: f64,
    pub gmt_offset_hours: i32,
    pub vertical_min: i32,
    pub vertical_max: i32,
    pub horizontal_offset: i32,
    pub vertical_offset: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            latitude: 51.1333,
            longitude: 71.4333,
            gmt_offset_hours: 5,
            vertical_min: 15,
            vertical_max: 90,
            horizontal_offset: 0,
            vertical_offset: 0,
        }
    }
}

/// Vertical travel allowed outside of calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerticalLimits {
    pub min: i32,
    pub max: i32,
}

impl Settings {
    pub fn limits(&self) -> VerticalLimits {
        VerticalLimits {
            min: self.vertical_min,
            max: self.vertical_max,
        }
    }
}
