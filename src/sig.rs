//! GNSS signal table.
//!
//! Maps signal identifiers to carrier frequency, primary code period and
//! constellation, validates PRN numbers and formats satellite ids. The
//! acquisition scheduler leans on this table: the carrier ratio scales
//! assisted-acquisition Doppler hints, the code period decides which signals
//! are cheap to search blind, and the satellite id pairs channels that ride
//! the same spacecraft.

use std::collections::HashMap;

use lazy_static::lazy_static;

/// Constellation owning a signal, for satellite id formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gnss {
    Gps,
    Glonass,
    Galileo,
    Beidou,
    Navic,
}

struct SigInfo {
    /// Carrier frequency (Hz)
    freq: f64,
    /// Primary code period (s)
    period: f64,
    gnss: Gnss,
    /// Valid PRN ranges, inclusive
    prns: &'static [(i32, i32)],
}

const GPS_PRNS: &[(i32, i32)] = &[(1, 32), (193, 202)];
const GPS_SBAS_PRNS: &[(i32, i32)] = &[(1, 32), (120, 158), (193, 202)];
const QZS_PRNS: &[(i32, i32)] = &[(193, 202)];
const GLO_PRNS: &[(i32, i32)] = &[(1, 27)];
const GAL_PRNS: &[(i32, i32)] = &[(1, 36)];
const BDS_PRNS: &[(i32, i32)] = &[(1, 63)];
const BDS3_PRNS: &[(i32, i32)] = &[(19, 50)];
const BDS_B2I_PRNS: &[(i32, i32)] = &[(1, 18)];
const IRN_PRNS: &[(i32, i32)] = &[(1, 14)];

lazy_static! {
    static ref SIGS: HashMap<&'static str, SigInfo> = {
        use Gnss::*;
        let mut m = HashMap::new();
        let mut add = |sig, freq, period, gnss, prns| {
            m.insert(sig, SigInfo { freq, period, gnss, prns });
        };
        add("L1CA", 1575.42e6, 1e-3, Gps, GPS_SBAS_PRNS);
        add("L1CP", 1575.42e6, 10e-3, Gps, GPS_PRNS);
        add("L1CD", 1575.42e6, 10e-3, Gps, GPS_PRNS);
        add("L2CM", 1227.60e6, 20e-3, Gps, GPS_PRNS);
        add("L5I", 1176.45e6, 1e-3, Gps, GPS_SBAS_PRNS);
        add("L5Q", 1176.45e6, 1e-3, Gps, GPS_SBAS_PRNS);
        add("L6D", 1278.75e6, 4e-3, Gps, QZS_PRNS);
        add("L6E", 1278.75e6, 4e-3, Gps, QZS_PRNS);
        add("G1CA", 1602.00e6, 1e-3, Glonass, GLO_PRNS);
        add("G2CA", 1246.00e6, 1e-3, Glonass, GLO_PRNS);
        add("E1B", 1575.42e6, 4e-3, Galileo, GAL_PRNS);
        add("E1C", 1575.42e6, 4e-3, Galileo, GAL_PRNS);
        add("E5AI", 1176.45e6, 1e-3, Galileo, GAL_PRNS);
        add("E5AQ", 1176.45e6, 1e-3, Galileo, GAL_PRNS);
        add("E5BI", 1207.14e6, 1e-3, Galileo, GAL_PRNS);
        add("E5BQ", 1207.14e6, 1e-3, Galileo, GAL_PRNS);
        add("E6B", 1278.75e6, 1e-3, Galileo, GAL_PRNS);
        add("E6C", 1278.75e6, 1e-3, Galileo, GAL_PRNS);
        add("B1I", 1561.098e6, 1e-3, Beidou, BDS_PRNS);
        add("B1CD", 1575.42e6, 10e-3, Beidou, BDS3_PRNS);
        add("B1CP", 1575.42e6, 10e-3, Beidou, BDS3_PRNS);
        add("B2AD", 1176.45e6, 1e-3, Beidou, BDS3_PRNS);
        add("B2AP", 1176.45e6, 1e-3, Beidou, BDS3_PRNS);
        add("B2I", 1207.14e6, 1e-3, Beidou, BDS_B2I_PRNS);
        add("B3I", 1268.52e6, 1e-3, Beidou, BDS_PRNS);
        add("I5S", 1176.45e6, 1e-3, Navic, IRN_PRNS);
        m
    };
}

/// Carrier frequency (Hz) of a signal, or `None` for unknown signals.
pub fn sig_freq(sig: &str) -> Option<f64> {
    SIGS.get(sig).map(|s| s.freq)
}

/// Primary code period (s) of a signal.
pub fn sig_period(sig: &str) -> Option<f64> {
    SIGS.get(sig).map(|s| s.period)
}

/// Whether `prn` is valid for `sig`.
pub fn sig_prn_valid(sig: &str, prn: i32) -> bool {
    SIGS.get(sig)
        .map(|s| s.prns.iter().any(|&(lo, hi)| prn >= lo && prn <= hi))
        .unwrap_or(false)
}

/// Satellite id for (signal, PRN), e.g. "G01", "R09", "J02", "S129".
/// `None` if the signal is unknown or the PRN out of range.
pub fn sat_id(sig: &str, prn: i32) -> Option<String> {
    let info = SIGS.get(sig)?;
    if !sig_prn_valid(sig, prn) {
        return None;
    }
    let id = match info.gnss {
        Gnss::Gps if (120..=158).contains(&prn) => format!("S{:3}", prn),
        Gnss::Gps if (193..=202).contains(&prn) => format!("J{:02}", prn - 192),
        Gnss::Gps => format!("G{:02}", prn),
        Gnss::Glonass => format!("R{:02}", prn),
        Gnss::Galileo => format!("E{:02}", prn),
        Gnss::Beidou => format!("C{:02}", prn),
        Gnss::Navic => format!("I{:02}", prn),
    };
    Some(id)
}
