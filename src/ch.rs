//! Tracking-channel state shared between the receiver, its workers and the
//! DSP kernel.
//!
//! The orchestration treats the channel as a bundle of scalar observables:
//! every field read across threads is atomic, and cross-channel readers
//! (the acquisition scheduler, the status view) tolerate transient
//! staleness. The per-channel DSP itself lives behind [`TrackingKernel`];
//! this crate ships only the [`NullKernel`] placeholder.

use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::buffer::IfBuffer;
use crate::cpx::AtomicF64;
use crate::sig;
use crate::{Error, Result};

/// Channel life-cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChState {
    /// Not searching, not tracking
    Idle = 0,
    /// Acquisition in progress
    Search = 1,
    /// Code and carrier tracking
    Lock = 2,
}

impl ChState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ChState::Search,
            2 => ChState::Lock,
            _ => ChState::Idle,
        }
    }
}

/// Navigation-message decoding counters, written by the kernel.
#[derive(Default)]
pub struct NavData {
    /// Bit sync position (> 0 once synchronized)
    pub ssync: AtomicI32,
    /// Frame sync position (> 0 once synchronized)
    pub fsync: AtomicI32,
    /// Data polarity reversal flag
    pub rev: AtomicI32,
    /// Decoded subframe/page counts: [ok, error]
    pub count: [AtomicU32; 2],
    /// Navigation data error count
    pub nerr: AtomicU32,
    /// Last decoded message type
    pub mt: AtomicI32,
    /// Time of week (s)
    pub tow: AtomicF64,
}

/// Tracking-loop error metrics, written by the kernel.
#[derive(Default)]
pub struct TrkData {
    /// Secondary-code sync position (> 0 once synchronized)
    pub sec_sync: AtomicI32,
    /// Carrier phase error (cyc)
    pub err_phas: AtomicF64,
    /// Code tracking error (s)
    pub err_code: AtomicF64,
}

/// One tracking channel.
pub struct Channel {
    /// Channel number (1-based)
    pub no: usize,
    /// Signal identifier, e.g. "L1CA"
    pub sig: String,
    pub prn: i32,
    /// Satellite id, e.g. "G01"; channels on the same satellite assist
    /// each other's acquisition
    pub sat: String,
    /// Carrier frequency (Hz)
    pub fc: f64,
    /// Sampling frequency (Hz)
    pub fs: f64,
    /// IF frequency (Hz)
    pub fi: f64,
    /// Integration period = primary code period (s)
    pub period: f64,
    /// Samples per integration period
    pub n: usize,
    /// Correlator spacing (chip)
    pub sp_corr: f64,
    /// Doppler search range: (center, half-span) (Hz)
    pub dop: (f64, f64),

    state: AtomicU8,
    /// Lock counter (integration intervals since acquisition)
    pub lock: AtomicI64,
    /// Loss-of-lock count
    pub lost: AtomicU32,
    /// Code offset (s)
    pub coff: AtomicF64,
    /// Doppler (Hz)
    pub fd: AtomicF64,
    /// Accumulated Doppler range (cyc)
    pub adr: AtomicF64,
    /// Carrier-to-noise density (dB-Hz)
    pub cn0: AtomicF64,
    /// Last-update timestamp (s of stream time)
    pub time: AtomicF64,
    /// External Doppler hint for the next acquisition (NaN = none)
    fd_ext: AtomicF64,
    pub nav: NavData,
    pub trk: TrkData,

    kernel: Mutex<Box<dyn TrackingKernel>>,
}

impl Channel {
    /// Build a channel for (signal, PRN), validating both against the
    /// signal table.
    pub fn new(
        sig: &str,
        prn: i32,
        fs: f64,
        fi: f64,
        sp_corr: f64,
        dop: (f64, f64),
        kernel: Box<dyn TrackingKernel>,
    ) -> Result<Self> {
        let (fc, period, sat) = match (sig::sig_freq(sig), sig::sig_period(sig), sig::sat_id(sig, prn)) {
            (Some(fc), Some(period), Some(sat)) => (fc, period, sat),
            _ => {
                return Err(Error::Signal {
                    sig: sig.to_string(),
                    prn,
                })
            }
        };
        Ok(Self {
            no: 0,
            sig: sig.to_string(),
            prn,
            sat,
            fc,
            fs,
            fi,
            period,
            n: (fs * period).round() as usize,
            sp_corr,
            dop,
            state: AtomicU8::new(ChState::Idle as u8),
            lock: AtomicI64::new(0),
            lost: AtomicU32::new(0),
            coff: AtomicF64::default(),
            fd: AtomicF64::default(),
            adr: AtomicF64::default(),
            cn0: AtomicF64::default(),
            time: AtomicF64::default(),
            fd_ext: AtomicF64::new(f64::NAN),
            nav: NavData::default(),
            trk: TrkData::default(),
            kernel: Mutex::new(kernel),
        })
    }

    pub fn state(&self) -> ChState {
        ChState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, s: ChState) {
        self.state.store(s as u8, Ordering::Relaxed);
    }

    /// Doppler hint seeded by re-acquisition or assisted acquisition.
    pub fn hint(&self) -> Option<f64> {
        let v = self.fd_ext.load();
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    pub fn set_hint(&self, fd: f64) {
        self.fd_ext.store(fd);
    }

    pub fn clear_hint(&self) {
        self.fd_ext.store(f64::NAN);
    }

    /// Lock duration (s).
    pub fn lock_time(&self) -> f64 {
        self.lock.load(Ordering::Relaxed) as f64 * self.period
    }

    /// Advance the channel by one integration interval on the samples
    /// starting at slot `off` of `buff` (wrapping modulo the buffer length).
    pub fn update(&self, time: f64, buff: &IfBuffer, off: usize) {
        if self.state() != ChState::Idle {
            self.time.store(time);
        }
        self.kernel.lock().update(self, time, buff, off);
    }

    /// Replace the DSP kernel (embedding applications, tests).
    pub fn set_kernel(&self, kernel: Box<dyn TrackingKernel>) {
        *self.kernel.lock() = kernel;
    }
}

/// Per-channel DSP kernel contract.
///
/// `update` reads `ch.n` samples beginning at `buff.samples()[off]`,
/// wrapping modulo the buffer length, and moves the channel through
/// SEARCH -> LOCK -> IDLE by writing its atomic fields. The kernel must not
/// retain references into the buffer across calls.
pub trait TrackingKernel: Send {
    fn update(&mut self, ch: &Channel, time: f64, buff: &IfBuffer, off: usize);
}

/// Kernel that leaves the channel untouched. Stands in for the external
/// DSP when only the orchestration is under test or the embedding
/// application injects kernels later.
pub struct NullKernel;

impl TrackingKernel for NullKernel {
    fn update(&mut self, _ch: &Channel, _time: f64, _buff: &IfBuffer, _off: usize) {}
}

/// Scripted kernels for orchestration tests.
#[cfg(test)]
pub(crate) mod test_kernels {
    use super::*;

    /// Wraps a closure as a kernel; the closure drives the channel state.
    pub(crate) struct FnKernel<F: FnMut(&Channel, f64) + Send>(pub F);

    impl<F: FnMut(&Channel, f64) + Send> TrackingKernel for FnKernel<F> {
        fn update(&mut self, ch: &Channel, time: f64, _buff: &IfBuffer, _off: usize) {
            (self.0)(ch, time)
        }
    }
}
