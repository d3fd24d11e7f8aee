//! GNSS SDR tracking driver.
//!
//! Reads digitized IF data from a file or stdin and runs the receiver with
//! a bank of tracking channels, e.g.:
//!
//! ```text
//! rcv_trk -s L1CA:1-32 --fs 12.0 --ti 0.1 capture.bin
//! rcv_trk -s L1CA:1-32,193-202 -s L5I:1-32 --fmt raw --iq 1,2 - < stream
//! ```

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;

use gnss_rcv::{ChSpec, Fmt, IfInput, IqMode, RcvConfig, Receiver};

#[derive(Parser)]
#[command(name = "rcv_trk", about = "GNSS SDR receiver - IF sample tracking")]
struct Args {
    /// Signals to track as SIG:PRNS where PRNS is a comma list of numbers
    /// or ranges, e.g. L1CA:1-32,193-202 (repeatable)
    #[arg(short = 's', long = "sig", required = true)]
    sigs: Vec<String>,

    /// Sampling frequency (MHz)
    #[arg(short = 'f', long, default_value_t = 12.0)]
    fs: f64,

    /// IF frequency (MHz)
    #[arg(long, default_value_t = 0.0)]
    fi: f64,

    /// Doppler search center (Hz)
    #[arg(long, default_value_t = 0.0)]
    dop_center: f64,

    /// Doppler search half-span (Hz)
    #[arg(long, default_value_t = 5000.0)]
    dop_span: f64,

    /// IF data format (int8 | raw)
    #[arg(long, default_value = "int8")]
    fmt: String,

    /// Sampling type per RF channel (1: I, 2: I/Q)
    #[arg(long, value_delimiter = ',', default_values_t = [1u8, 1u8])]
    iq: Vec<u8>,

    /// Status update interval (s); 0 disables the status view
    #[arg(long, default_value_t = 0.1)]
    ti: f64,

    /// Receiver log file ($TIME / $CH records)
    #[arg(long)]
    log: Option<PathBuf>,

    /// IF data file, or "-" for stdin
    file: String,
}

/// Expand "SIG:1-4,7" into (signal, PRN) pairs.
fn parse_sig_arg(arg: &str) -> Result<Vec<(String, i32)>, String> {
    let (sig, prns) = arg
        .split_once(':')
        .ok_or_else(|| format!("missing PRN list in '{}'", arg))?;
    let mut out = Vec::new();
    for part in prns.split(',') {
        let (lo, hi) = match part.split_once('-') {
            Some((a, b)) => (
                a.parse().map_err(|_| format!("bad PRN '{}'", a))?,
                b.parse().map_err(|_| format!("bad PRN '{}'", b))?,
            ),
            None => {
                let p: i32 = part.parse().map_err(|_| format!("bad PRN '{}'", part))?;
                (p, p)
            }
        };
        if lo > hi {
            return Err(format!("empty PRN range '{}'", part));
        }
        for prn in lo..=hi {
            out.push((sig.to_string(), prn));
        }
    }
    Ok(out)
}

fn iq_mode(v: u8) -> Option<IqMode> {
    match v {
        1 => Some(IqMode::I),
        2 => Some(IqMode::Iq),
        _ => None,
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let fmt = match args.fmt.as_str() {
        "int8" => Fmt::Int8,
        "raw" => Fmt::Raw,
        other => {
            eprintln!("unknown IF data format: {}", other);
            return ExitCode::FAILURE;
        }
    };
    let mut iq = [IqMode::I; 2];
    for (i, &v) in args.iq.iter().take(2).enumerate() {
        match iq_mode(v) {
            Some(m) => iq[i] = m,
            None => {
                eprintln!("IQ modes must be 1 or 2");
                return ExitCode::FAILURE;
            }
        }
    }

    let mut specs = Vec::new();
    for arg in &args.sigs {
        match parse_sig_arg(arg) {
            Ok(pairs) => {
                specs.extend(
                    pairs
                        .into_iter()
                        .map(|(sig, prn)| ChSpec::new(&sig, prn, args.fi * 1e6)),
                );
            }
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let cfg = RcvConfig {
        fs: args.fs * 1e6,
        dop: (args.dop_center, args.dop_span),
        fmt,
        iq,
    };
    let mut rcv = Receiver::new(&specs, &cfg);
    if rcv.nch() == 0 {
        eprintln!("no valid tracking channels");
        return ExitCode::FAILURE;
    }
    if let Some(path) = &args.log {
        match File::create(path) {
            Ok(f) => rcv.logger().set_sink(Box::new(f)),
            Err(e) => {
                eprintln!("log file error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let input = if args.file == "-" {
        IfInput::stdin()
    } else {
        match IfInput::file(&args.file) {
            Ok(input) => input,
            Err(e) => {
                eprintln!("IF data file error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    };

    if let Err(e) = rcv.start(input, [args.ti, 0.0, 0.0]) {
        eprintln!("receiver start error: {}", e);
        return ExitCode::FAILURE;
    }
    while !rcv.finished() {
        thread::sleep(Duration::from_millis(100));
    }
    rcv.stop();
    ExitCode::SUCCESS
}
