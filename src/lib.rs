//! GNSS SDR receiver core.
//!
//! Ingests a stream of digitized intermediate-frequency samples from a file,
//! standard input or a USB front-end, distributes the samples into a bounded
//! shared ring buffer and runs a bank of per-signal tracking channels that
//! concurrently acquire, lock and track satellite signals.
//!
//! Threading model:
//! - One receiver thread reads and decodes one 1-ms block per tick, publishes
//!   the write cursor and schedules signal searches.
//! - One worker thread per tracking channel consumes published blocks and
//!   drives the channel's DSP kernel.
//!
//! The DSP kernel itself (correlators, PLL/DLL, navigation decoding) is an
//! external collaborator behind the [`ch::TrackingKernel`] trait.

pub mod buffer;
pub mod ch;
pub mod cpx;
pub mod decode;
pub mod gtime;
pub mod logger;
pub mod rcv;
pub mod sig;
pub mod source;
pub mod status;
#[cfg(feature = "usb")]
pub mod usb;
pub mod worker;

pub use buffer::IfBuffer;
pub use ch::{ChState, Channel, NullKernel, TrackingKernel};
pub use cpx::Cpx;
pub use decode::{Fmt, IqMode, SampleDecoder};
pub use logger::Logger;
pub use rcv::{ChSpec, RcvConfig, Receiver};
pub use source::IfInput;

/// IF data read cycle (s).
pub const T_CYC: f64 = 1e-3;
/// Receiver and channel log cycle, in read cycles.
pub const LOG_CYC: i64 = 1000;
/// Channel worker poll cycle (ms).
pub const TH_CYC: u64 = 10;
/// Re-acquisition timeout (s).
pub const T_REACQ: f64 = 60.0;
/// Minimum lock time for status rows and acquisition assistance (s).
pub const MIN_LOCK: f64 = 2.0;
/// IF buffer capacity in read cycles (8 s of samples).
pub const MAX_BUFF: usize = 8000;
/// Maximum number of tracking channels.
pub const MAX_NCH: usize = 999;
/// Correlator spacing (chip).
pub const SP_CORR: f64 = 0.5;

/// Errors surfaced by the receiver core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown signal identifier or PRN outside the signal's valid range.
    #[error("signal / prn error: {sig} / {prn}")]
    Signal { sig: String, prn: i32 },
    /// `start` called on a receiver that is already running.
    #[error("receiver already started")]
    AlreadyStarted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// No USB device matched the bus/port and id filters.
    #[cfg(feature = "usb")]
    #[error("USB device not found")]
    UsbOpen,
    /// Vendor request payload larger than the 64-byte device limit.
    #[cfg(feature = "usb")]
    #[error("vendor request payload exceeds 64 bytes")]
    UsbPayload,
    #[cfg(feature = "usb")]
    #[error(transparent)]
    Usb(#[from] rusb::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
