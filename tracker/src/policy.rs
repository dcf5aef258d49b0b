use crate::settings::Settings;
use clock::SolarAngles;

/// Integer linear map with truncating division. Saturates instead of
/// overflowing.
pub fn map_range(x: i64, in_min: i64, in_max: i64, out_min: i64, out_max: i64) -> i64 {
    x.saturating_sub(in_min)
        .saturating_mul(out_max - out_min)
        .checked_div(in_max - in_min)
        .unwrap_or(0)
        .saturating_add(out_min)
}

fn narrow(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Mechanical targets for a sun position, before clamping.
///
/// Azimuth 90..270 (east through south to west) spans the horizontal
/// travel; outside that range the map extrapolates.
pub fn sun_targets(sun: SolarAngles, settings: &Settings) -> (i32, i32) {
    let mapped = map_range(sun.azimuth as i64, 90, 270, 0, 180);
    let horizontal = narrow(mapped.saturating_add(settings.horizontal_offset as i64));
    // float to int casts saturate
    let vertical = (sun.altitude + settings.vertical_offset as f32) as i32;
    (horizontal, vertical)
}
