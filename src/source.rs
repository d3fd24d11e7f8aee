//! IF data input sources.
//!
//! The receiver consumes a plain byte stream, `N` or `2N` bytes per 1-ms
//! tick. A file is a seekable, backpressure-friendly source; stdin and
//! front-end devices are live sources that must never be stalled.
//! [`ThreadedReader`] decouples a blocking device from the tick loop with a
//! dedicated reader thread and a lock-free byte ring.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};

/// One IF sample stream plus the live/seekable distinction that drives
/// backpressure and channel start-up states.
pub struct IfInput {
    pub(crate) rdr: Box<dyn Read + Send>,
    live: bool,
}

impl IfInput {
    /// Open an IF data file (not live: the receiver throttles to the
    /// slowest worker).
    pub fn file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let f = File::open(path)?;
        Ok(Self {
            rdr: Box::new(BufReader::new(f)),
            live: false,
        })
    }

    /// Standard input (live: no backpressure, overruns are reported).
    pub fn stdin() -> Self {
        Self {
            rdr: Box::new(io::stdin()),
            live: true,
        }
    }

    /// Any byte stream; `live` selects the flow-control discipline.
    pub fn from_reader(rdr: Box<dyn Read + Send>, live: bool) -> Self {
        Self { rdr, live }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// Drains a blocking byte device on its own thread into a bounded SPSC
/// ring; the consuming side implements [`Read`].
///
/// The reader thread never drops bytes: when the ring is full it waits for
/// the consumer, so any real-time loss happens in the device (and is then
/// visible upstream as a buffer overrun), not silently here where it would
/// break sample framing.
pub struct ThreadedReader {
    cons: ringbuf::HeapCons<u8>,
    running: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
    th: Option<JoinHandle<()>>,
}

impl ThreadedReader {
    /// Spawn the drain thread with a ring of `capacity` bytes.
    pub fn spawn<R: Read + Send + 'static>(mut dev: R, capacity: usize) -> io::Result<Self> {
        let rb = HeapRb::<u8>::new(capacity);
        let (mut prod, cons) = rb.split();
        let running = Arc::new(AtomicBool::new(true));
        let ended = Arc::new(AtomicBool::new(false));

        let run = running.clone();
        let end = ended.clone();
        let th = thread::Builder::new()
            .name("if-reader".into())
            .spawn(move || {
                let mut buf = [0u8; 4096];
                while run.load(Ordering::SeqCst) {
                    let len = match dev.read(&mut buf) {
                        Ok(0) => break, // end of stream
                        Ok(len) => len,
                        Err(ref e)
                            if e.kind() == io::ErrorKind::WouldBlock
                                || e.kind() == io::ErrorKind::TimedOut
                                || e.kind() == io::ErrorKind::Interrupted =>
                        {
                            continue;
                        }
                        Err(_) => break,
                    };
                    let mut done = 0;
                    while done < len && run.load(Ordering::SeqCst) {
                        done += prod.push_slice(&buf[done..len]);
                        if done < len {
                            thread::sleep(Duration::from_millis(1));
                        }
                    }
                }
                end.store(true, Ordering::SeqCst);
            })?;

        Ok(Self {
            cons,
            running,
            ended,
            th: Some(th),
        })
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(th) = self.th.take() {
            let _ = th.join();
        }
    }
}

impl Read for ThreadedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.cons.pop_slice(buf);
            if n > 0 {
                return Ok(n);
            }
            if self.ended.load(Ordering::SeqCst) {
                return Ok(0);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for ThreadedReader {
    fn drop(&mut self) {
        self.stop();
    }
}
