//! Wall-clock helpers for log records and the verbose status line:
//! UTC broken-down time and GPS week / time-of-week conversion.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

/// Leap seconds (GPST - UTC) effective from the given UTC date, newest
/// first.
const LEAPS: &[((i32, u32, u32), f64)] = &[
    ((2017, 1, 1), 18.0),
    ((2015, 7, 1), 17.0),
    ((2012, 7, 1), 16.0),
    ((2009, 1, 1), 15.0),
    ((2006, 1, 1), 14.0),
    ((1999, 1, 1), 13.0),
    ((1997, 7, 1), 12.0),
    ((1996, 1, 1), 11.0),
    ((1994, 7, 1), 10.0),
    ((1993, 7, 1), 9.0),
    ((1992, 7, 1), 8.0),
    ((1991, 1, 1), 7.0),
    ((1990, 1, 1), 6.0),
    ((1988, 1, 1), 5.0),
    ((1985, 7, 1), 4.0),
    ((1983, 7, 1), 3.0),
    ((1982, 7, 1), 2.0),
    ((1981, 7, 1), 1.0),
];

const WEEK_SECS: f64 = 604800.0;

fn leap_seconds(t: DateTime<Utc>) -> f64 {
    for &((y, m, d), ls) in LEAPS {
        let eff = Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap();
        if t >= eff {
            return ls;
        }
    }
    0.0
}

/// GPS week number and time of week (s) for a UTC instant.
pub fn gpst_week_tow(t: DateTime<Utc>) -> (i64, f64) {
    let epoch = Utc.with_ymd_and_hms(1980, 1, 6, 0, 0, 0).unwrap();
    let dt = t - epoch;
    let secs = dt.num_milliseconds() as f64 / 1000.0 + leap_seconds(t);
    let week = (secs / WEEK_SECS).floor();
    (week as i64, secs - week * WEEK_SECS)
}

/// UTC broken-down time (year, month, day, hour, min, seconds-with-fraction).
pub fn utc_ymdhms(t: DateTime<Utc>) -> (i32, u32, u32, u32, u32, f64) {
    let s = t.second() as f64 + t.nanosecond() as f64 * 1e-9;
    (t.year(), t.month(), t.day(), t.hour(), t.minute(), s)
}
