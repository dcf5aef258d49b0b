//! Solar position from astronav's NOAA sun model.

use astronav::coords::noaa_sun::NOAASun;
use chrono::{Datelike, Timelike};

/// Azimuth (clockwise from north) and altitude above the horizon, degrees.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SolarAngles {
    pub azimuth: f32,
    pub altitude: f32,
}

pub trait SunPosition {
    /// `timestamp` is seconds since the Unix epoch (UTC).
    fn compute(
        &self,
        latitude: f64,
        longitude: f64,
        timestamp: i64,
        utc_offset_hours: i32,
    ) -> SolarAngles;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoaaSun;

// acos can leave the domain by a rounding error with the sun at the zenith
fn finite(angle: f64) -> f32 {
    if angle.is_finite() {
        angle as f32
    } else {
        0.0
    }
}

impl SunPosition for NoaaSun {
    fn compute(
        &self,
        latitude: f64,
        longitude: f64,
        timestamp: i64,
        utc_offset_hours: i32,
    ) -> SolarAngles {
        // The model wants local civil time plus its zone
        let (local, zone) = match crate::clock::local_time(timestamp, utc_offset_hours) {
            Some(local) => (local, utc_offset_hours),
            None => match crate::clock::local_time(timestamp, 0) {
                Some(utc) => (utc, 0),
                None => return SolarAngles::default(),
            },
        };

        let sun = NOAASun {
            year: local.year() as u16,
            doy: local.ordinal() as u16,
            long: longitude as f32,
            lat: latitude as f32,
            timezone: zone as f32,
            hour: local.hour() as u8,
            min: local.minute() as u8,
            sec: local.second() as u8,
        };

        SolarAngles {
            azimuth: finite(sun.azimuth_in_deg()),
            altitude: finite(sun.altitude_in_deg()),
        }
    }
}
