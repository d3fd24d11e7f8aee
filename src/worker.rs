//! Per-channel worker thread.
//!
//! Each worker polls the published write cursor, hands every available
//! integration interval to its channel's DSP kernel and advances its own
//! read cursor. The loop reserves one extra interval of headroom
//! (`ix + 2n <= ix_w + 1`) so the writer cannot lap a read in progress.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::ch::{ChState, Channel};
use crate::logger::Logger;
use crate::rcv::Shared;
use crate::{LOG_CYC, MAX_BUFF, TH_CYC, T_CYC};

/// Cycles of headroom left between a lapped reader's new cursor and the
/// oldest intact slot.
const LAP_MARGIN: i64 = 10;

/// One tracking channel plus its consumer-side bookkeeping.
pub struct ChWorker {
    pub ch: Arc<Channel>,
    /// Which IF buffer this channel consumes
    pub if_ch: usize,
    /// Read cursor: last cycle handed to the kernel
    pub ix_r: AtomicI64,
    /// Times the writer lapped this reader (live input only)
    pub overruns: AtomicU64,
    running: AtomicBool,
}

impl ChWorker {
    pub(crate) fn new(ch: Arc<Channel>, if_ch: usize) -> Self {
        Self {
            ch,
            if_ch,
            ix_r: AtomicI64::new(0),
            overruns: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    /// Process every published cycle currently available, starting at `ix`;
    /// returns the cursor to resume from.
    pub(crate) fn drain(&self, shared: &Shared, logger: &Logger, mut ix: i64) -> i64 {
        // integration intervals span n read cycles
        let n = (self.ch.n / shared.n).max(1) as i64;
        loop {
            let ix_w = shared.ix_w.load(Ordering::Acquire);
            if ix_w + 1 - ix >= MAX_BUFF as i64 {
                // the writer lapped us: the slots at our cursor now hold
                // newer cycles, so resume at the oldest intact one
                let oldest = ix_w + 1 - MAX_BUFF as i64 + LAP_MARGIN;
                ix = (oldest + n - 1) / n * n;
                self.overruns.fetch_add(1, Ordering::Relaxed);
            }
            debug_assert!(ix >= 0 && ix_w + 1 - ix < MAX_BUFF as i64);
            if ix + 2 * n > ix_w + 1 {
                return ix;
            }
            let off = shared.n * (ix as usize % MAX_BUFF);
            self.ch
                .update(ix as f64 * T_CYC, &shared.buff[self.if_ch], off);
            if self.ch.state() == ChState::Lock && ix % LOG_CYC == 0 {
                logger.ch_record(&self.ch);
            }
            self.ix_r.store(ix, Ordering::Relaxed);
            ix += n;
        }
    }

    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Launch the worker thread; it exits within one poll cycle of `stop`.
pub(crate) fn start(
    w: Arc<ChWorker>,
    shared: Arc<Shared>,
    logger: Arc<Logger>,
) -> io::Result<JoinHandle<()>> {
    w.running.store(true, Ordering::SeqCst);
    thread::Builder::new()
        .name(format!("ch{:02}-{}", w.ch.no, w.ch.sig))
        .spawn(move || {
            let mut ix: i64 = 0;
            while w.running.load(Ordering::SeqCst) {
                ix = w.drain(&shared, &logger, ix);
                thread::sleep(Duration::from_millis(TH_CYC));
            }
        })
}
