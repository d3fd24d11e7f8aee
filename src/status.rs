//! Terminal status view.
//!
//! A fixed-width block redrawn in place with cursor-up escapes: a header
//! with stream time, buffer state and search/lock counts, then one
//! blue row per locked channel. Formatting is split into pure
//! string-returning helpers; only `print_status` touches the terminal.

use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;

use crate::ch::{ChState, Channel};
use crate::gtime;
use crate::rcv::{buff_full, Shared};
use crate::worker::ChWorker;
use crate::{MIN_LOCK, T_CYC};

/// Status block width (columns); verbose rows run 14 wider.
pub(crate) const NCOL: usize = 122;

pub(crate) const ESC_COL: &str = "\x1b[34m"; // blue foreground
pub(crate) const ESC_RES: &str = "\x1b[0m";
pub(crate) const ESC_UCUR: &str = "\x1b[A";
pub(crate) const ESC_VCUR: &str = "\x1b[?25h";
pub(crate) const ESC_HCUR: &str = "\x1b[?25l";

/// One pipe per 1.5 dB above 30 dB-Hz, capped at 13.
fn cn0_bar(cn0: f64) -> String {
    let n = ((cn0 - 30.0) / 1.5) as i32;
    "|".repeat(n.clamp(0, 13) as usize)
}

/// Four-character sync summary: secondary code, bit, frame, reversal.
fn sync_stat(ch: &Channel) -> String {
    format!(
        "{}{}{}{}",
        if ch.trk.sec_sync.load(Ordering::Relaxed) > 0 { "S" } else { "-" },
        if ch.nav.ssync.load(Ordering::Relaxed) > 0 { "B" } else { "-" },
        if ch.nav.fsync.load(Ordering::Relaxed) > 0 { "F" } else { "-" },
        if ch.nav.rev.load(Ordering::Relaxed) != 0 { "R" } else { "-" },
    )
}

fn head_line(time: f64, full: bool, ich: i32, nlock: usize, nch: usize, verbose: bool) -> String {
    let nc = NCOL - 77 + if verbose { 14 } else { 0 };
    let mut s = format!(
        " TIME(s):{:10.2} {:nc$}{:>10}  SRCH:{:4}  LOCK:{:3}/{:3}",
        time,
        "",
        if full { "BUFF-FULL" } else { "" },
        ich + 1,
        nlock,
        nch,
    );
    if verbose {
        let (_, tow) = gtime::gpst_week_tow(Utc::now());
        s.push_str(&format!("  {:10.3}", tow));
    }
    s
}

fn column_line(verbose: bool) -> String {
    let mut s = format!(
        "{:>3} {:>4} {:>5} {:>3} {:>8} {:>4} {:<12} {:>11} {:>7} {:>11} {:>4} {:>5} {:>4} {:>4} {:>3}",
        "CH", "SAT", "SIG", "PRN", "LOCK(s)", "C/N0", "(dB-Hz)", "COFF(ms)", "DOP(Hz)",
        "ADR(cyc)", "SYNC", "#NAV", "#ERR", "#LOL", "NER",
    );
    if verbose {
        s.push_str(&format!(" {:>3} {:>3} {:>3} {:>11}", "ERP", "ERC", "MT", "TOW(s)"));
    }
    s
}

fn ch_row(ch: &Channel, verbose: bool) -> String {
    let mut s = format!(
        "{:3} {:>4} {:>5} {:3} {:8.2} {:4.1} {:<13}{:11.7} {:7.1} {:11.1} {} {:5} {:4} {:4} {:3}",
        ch.no,
        ch.sat,
        ch.sig,
        ch.prn,
        ch.lock_time(),
        ch.cn0.load(),
        cn0_bar(ch.cn0.load()),
        ch.coff.load() * 1e3,
        ch.fd.load(),
        ch.adr.load(),
        sync_stat(ch),
        ch.nav.count[0].load(Ordering::Relaxed),
        ch.nav.count[1].load(Ordering::Relaxed),
        ch.lost.load(Ordering::Relaxed),
        ch.nav.nerr.load(Ordering::Relaxed),
    );
    if verbose {
        s.push_str(&format!(
            " {:3.0} {:3.0} {:3} {:11.3}",
            ch.trk.err_phas.load() * 100.0,
            ch.trk.err_code.load() * 1e8,
            ch.nav.mt.load(Ordering::Relaxed),
            ch.nav.tow.load(),
        ));
    }
    s
}

/// Redraw the status block over the previous one (`nrow` rows tall);
/// returns the new row count.
pub(crate) fn print_status<W: Write>(
    out: &mut W,
    shared: &Shared,
    workers: &[Arc<ChWorker>],
    ix: i64,
    verbose: bool,
    nrow: usize,
) -> usize {
    for _ in 0..nrow {
        let _ = write!(out, "{}", ESC_UCUR);
    }
    let nlock = workers
        .iter()
        .filter(|w| w.ch.state() == ChState::Lock)
        .count();
    let full = buff_full(shared, workers);
    let ich = shared.ich.load(Ordering::Relaxed);
    let mut n = 2;
    let _ = write!(
        out,
        "\r{}\n{}\n",
        head_line(ix as f64 * T_CYC, full, ich, nlock, workers.len(), verbose),
        column_line(verbose),
    );
    for w in workers {
        let ch = &w.ch;
        if ch.state() != ChState::Lock || ch.lock_time() < MIN_LOCK {
            continue;
        }
        let _ = writeln!(out, "{}{}{}", ESC_COL, ch_row(ch, verbose), ESC_RES);
        n += 1;
    }
    let blank = NCOL;
    while n < nrow {
        let _ = writeln!(out, "{:blank$}", "");
        n += 1;
    }
    let _ = out.flush();
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ch::NullKernel;

    fn test_ch() -> Channel {
        let ch = Channel::new(
            "L1CA",
            7,
            12e6,
            3e6,
            0.5,
            (0.0, 5000.0),
            Box::new(NullKernel),
        )
        .unwrap();
        ch.set_state(ChState::Lock);
        ch.lock.store(12_000, Ordering::Relaxed);
        ch.cn0.store(45.2);
        ch.coff.store(0.25e-3);
        ch.fd.store(-1234.5);
        ch.adr.store(56789.0);
        ch.nav.ssync.store(100, Ordering::Relaxed);
        ch.nav.fsync.store(300, Ordering::Relaxed);
        ch
    }

    #[test]
    fn test_cn0_bar() {
        assert_eq!(cn0_bar(25.0), "");
        assert_eq!(cn0_bar(30.0), "");
        assert_eq!(cn0_bar(45.2), "||||||||||");
        assert_eq!(cn0_bar(60.0), "|||||||||||||"); // capped at 13
    }

    #[test]
    fn test_sync_stat() {
        let ch = test_ch();
        assert_eq!(sync_stat(&ch), "-BF-");
        ch.trk.sec_sync.store(2, Ordering::Relaxed);
        ch.nav.rev.store(1, Ordering::Relaxed);
        assert_eq!(sync_stat(&ch), "SBFR");
    }

    #[test]
    fn test_fixed_widths() {
        let ch = test_ch();
        assert_eq!(column_line(false).len(), 102);
        assert_eq!(ch_row(&ch, false).len(), 102);
        assert_eq!(column_line(true).len(), 126);
        assert_eq!(ch_row(&ch, true).len(), 126);
        assert_eq!(head_line(12.5, false, 3, 2, 8, false).len(), 100);
    }

    #[test]
    fn test_head_line_reports_buffer_state() {
        let line = head_line(12.5, true, 3, 2, 8, false);
        assert!(line.contains("BUFF-FULL"));
        assert!(line.contains("SRCH:   4"));
        assert!(line.contains("LOCK:  2/  8"));
        assert!(!head_line(12.5, false, 3, 2, 8, false).contains("BUFF-FULL"));
    }

    #[test]
    fn test_print_status_pads_previous_rows() {
        let shared = Shared::new(1, 1);
        let ch = Arc::new(test_ch());
        let workers = vec![Arc::new(crate::worker::ChWorker::new(ch, 0))];
        let mut out = Vec::new();
        let n = print_status(&mut out, &shared, &workers, 1000, false, 5);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(n, 5); // 2 header rows + 1 channel row + 2 pad rows
        assert_eq!(text.matches(ESC_UCUR).count(), 5);
        assert_eq!(text.matches(ESC_COL).count(), 1);
        assert!(text.contains(" G07 "));
        assert_eq!(text.lines().filter(|l| l.trim().is_empty()).count(), 2);
    }
}
