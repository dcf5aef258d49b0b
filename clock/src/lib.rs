pub mod clock {
    use chrono::{DateTime, FixedOffset, Utc};

    /// Timestamps at or below this many seconds since the epoch come from a
    /// clock that has not been synchronized yet.
    pub const SYNC_THRESHOLD_SECS: i64 = 100_000;

    /// Wall-clock source, seconds since the Unix epoch (UTC).
    pub trait ClockSource {
        fn now(&self) -> i64;

        fn is_synchronized(&self) -> bool {
            is_synchronized(self.now())
        }
    }

    pub fn is_synchronized(timestamp: i64) -> bool {
        timestamp > SYNC_THRESHOLD_SECS
    }

    /// System time, set by SNTP on the device.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SystemClock;

    impl ClockSource for SystemClock {
        fn now(&self) -> i64 {
            Utc::now().timestamp()
        }
    }

    /// Method for converting a timestamp into local time at a whole-hour offset
    pub fn local_time(timestamp: i64, gmt_offset_hours: i32) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(gmt_offset_hours * 3600)?;
        let utc = DateTime::<Utc>::from_timestamp(timestamp, 0)?;
        Some(utc.with_timezone(&offset))
    }

    /// `HH:MM:SS` local time, or `00:00:00` while the clock is unsynchronized.
    pub fn format_local_time(timestamp: i64, gmt_offset_hours: i32) -> String {
        if !is_synchronized(timestamp) {
            return String::from("00:00:00");
        }
        match local_time(timestamp, gmt_offset_hours) {
            Some(local) => local.format("%H:%M:%S").to_string(),
            None => String::from("00:00:00"),
        }
    }
}

pub mod sun;

pub use clock::{ClockSource, SystemClock};
pub use sun::{NoaaSun, SolarAngles, SunPosition};

#[cfg(test)]
mod tests {
    use super::clock::*;

    #[test]
    fn rejects_unsynchronized_timestamps() {
        assert!(!is_synchronized(0));
        assert!(!is_synchronized(SYNC_THRESHOLD_SECS));
        assert!(is_synchronized(SYNC_THRESHOLD_SECS + 1));
    }

    #[test]
    fn formats_local_time_with_offset() {
        // 2024-06-21T07:16:05Z
        let ts = 1_718_954_165;
        assert_eq!(format_local_time(ts, 5), "12:16:05");
        assert_eq!(format_local_time(ts, -5), "02:16:05");
    }

    #[test]
    fn unsynchronized_clock_formats_as_midnight() {
        assert_eq!(format_local_time(42, 5), "00:00:00");
    }
}
