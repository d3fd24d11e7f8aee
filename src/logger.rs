//! Receiver log sink.
//!
//! Append-only text records: `$TIME` once per second of stream time from the
//! receiver thread, `$CH` per locked channel once per second from its
//! worker. Records below the sink's level mask are dropped; with no sink
//! configured everything is dropped.

use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::Utc;
use parking_lot::Mutex;

use crate::ch::Channel;
use crate::gtime;

/// Level of `$TIME` records.
pub const LVL_TIME: u8 = 3;
/// Level of `$CH` records.
pub const LVL_CH: u8 = 4;

/// Shared append-only record sink.
pub struct Logger {
    sink: Mutex<Option<Box<dyn Write + Send>>>,
    level: AtomicU8,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            level: AtomicU8::new(LVL_CH),
        }
    }

    pub fn set_sink(&self, w: Box<dyn Write + Send>) {
        *self.sink.lock() = Some(w);
    }

    /// Records with a level above the mask are dropped.
    pub fn set_level(&self, level: u8) {
        self.level.store(level, Ordering::Relaxed);
    }

    pub fn out(&self, level: u8, rec: &str) {
        if level > self.level.load(Ordering::Relaxed) {
            return;
        }
        let mut sink = self.sink.lock();
        if let Some(w) = sink.as_mut() {
            let _ = writeln!(w, "{}", rec);
            let _ = w.flush();
        }
    }

    /// Emit a `$TIME` record for stream time `t` (s).
    pub fn time_record(&self, t: f64) {
        let utc = gtime::utc_ymdhms(Utc::now());
        self.out(LVL_TIME, &fmt_time_record(t, utc));
    }

    /// Emit a `$CH` record for a locked channel.
    pub fn ch_record(&self, ch: &Channel) {
        self.out(LVL_CH, &fmt_ch_record(ch));
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

fn fmt_time_record(t: f64, utc: (i32, u32, u32, u32, u32, f64)) -> String {
    let (y, mo, d, h, mi, s) = utc;
    format!("$TIME,{:.3},{},{},{},{},{},{:.6},UTC", t, y, mo, d, h, mi, s)
}

fn fmt_ch_record(ch: &Channel) -> String {
    format!(
        "$CH,{:.3},{},{},{},{:.1},{:.9},{:.3},{:.3},{},{}",
        ch.time.load(),
        ch.sig,
        ch.prn,
        ch.lock.load(Ordering::Relaxed),
        ch.cn0.load(),
        ch.coff.load() * 1e3,
        ch.fd.load(),
        ch.adr.load(),
        ch.nav.count[0].load(Ordering::Relaxed),
        ch.nav.count[1].load(Ordering::Relaxed),
    )
}

/// In-memory sink for tests: clones share the captured bytes.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct Capture(pub std::sync::Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().clone()).unwrap()
    }

    pub fn lines_starting(&self, prefix: &str) -> usize {
        self.text().lines().filter(|l| l.starts_with(prefix)).count()
    }
}

#[cfg(test)]
impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
