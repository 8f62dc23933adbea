// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Conversions between wall-clock time and time-since-GPS-epoch.
//!
//! Class-B scheduling is expressed as a duration since the GPS epoch
//! (1980-01-06T00:00:00 UTC).  GPS time does not observe leap seconds, so
//! it currently runs ahead of UTC by a fixed offset; the offset is a
//! constant here and can be overridden through configuration when the next
//! leap second is announced.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Unix timestamp of the GPS epoch, 1980-01-06T00:00:00Z.
pub const GPS_EPOCH_UNIX_SECS: i64 = 315_964_800;

/// Number of leap seconds by which GPS time currently leads UTC.
pub const GPS_UTC_LEAP_SECONDS: i64 = 18;

/// A converter between UTC wall time and GPS-epoch durations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Clock {
    leap_seconds: Duration,
}

impl Default for Clock {
    fn default() -> Self {
        Clock::new(GPS_UTC_LEAP_SECONDS)
    }
}

impl Clock {
    pub fn new(leap_seconds: i64) -> Clock {
        Clock {
            leap_seconds: Duration::seconds(leap_seconds),
        }
    }

    /// Duration elapsed on the GPS clock since the GPS epoch at wall time
    /// `t`.
    pub fn time_since_gps_epoch(&self, t: DateTime<Utc>) -> Duration {
        t - gps_epoch() + self.leap_seconds
    }

    /// Wall time at which the GPS clock reads `d` past the epoch.
    pub fn to_date_time(&self, d: Duration) -> DateTime<Utc> {
        gps_epoch() + d - self.leap_seconds
    }
}

fn gps_epoch() -> DateTime<Utc> {
    // Infallible: the epoch is a fixed valid timestamp.
    Utc.timestamp_opt(GPS_EPOCH_UNIX_SECS, 0)
        .single()
        .expect("GPS epoch is a valid timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_maps_to_leap_offset() {
        let clock = Clock::default();
        assert_eq!(
            clock.time_since_gps_epoch(gps_epoch()),
            Duration::seconds(GPS_UTC_LEAP_SECONDS)
        );
        assert_eq!(clock.to_date_time(Duration::zero()), gps_epoch() - Duration::seconds(18));
    }

    #[test]
    fn known_timestamp() {
        // 2018-07-01T00:00:00Z was 1_214_265_618 GPS seconds after the
        // epoch (18 leap seconds by then).
        let clock = Clock::default();
        let t = Utc.timestamp_opt(1_530_403_200, 0).single().unwrap();
        assert_eq!(
            clock.time_since_gps_epoch(t),
            Duration::seconds(1_530_403_200 - GPS_EPOCH_UNIX_SECS + 18)
        );
    }

    #[test]
    fn round_trip_is_involution_1980_to_2100() {
        let clock = Clock::default();
        // Sweep the supported range in odd steps so we cross year and DST
        // boundaries, checking sub-microsecond exactness.
        let start = gps_epoch();
        let end = Utc.timestamp_opt(4_102_444_800, 0).single().unwrap(); // 2100-01-01
        let mut t = start;
        while t < end {
            let d = clock.time_since_gps_epoch(t);
            assert_eq!(clock.to_date_time(d), t);
            t += Duration::seconds(86_400 * 97 + 12_345) + Duration::microseconds(7);
        }
    }

    #[test]
    fn custom_leap_seconds() {
        let clock = Clock::new(19);
        let t = Utc.timestamp_opt(2_000_000_000, 123_000).single().unwrap();
        let d = clock.time_since_gps_epoch(t);
        assert_eq!(clock.to_date_time(d), t);
        assert_eq!(
            d - Clock::default().time_since_gps_epoch(t),
            Duration::seconds(1)
        );
    }
}
