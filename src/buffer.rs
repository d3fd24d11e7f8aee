//! Bounded shared IF sample buffer.
//!
//! A fixed array of complex samples addressed by a monotonically increasing
//! cycle index modulo the buffer capacity. There is no per-slot locking:
//! the receiver thread is the only writer, and it publishes a fully decoded
//! 1-ms block by storing the cycle index into the shared write cursor with
//! release ordering. Workers acquire-load the cursor and only touch slots of
//! cycles at or below it, so every observed slot is fully written.
//!
//! The backing storage is interior-mutable; the synchronization contract
//! lives in the write-cursor publication, the same shape as the shared audio
//! buffers this design is modeled on.

use std::cell::UnsafeCell;

use crate::cpx::Cpx;

/// Shared IF sample ring, one per RF front-end channel.
pub struct IfBuffer {
    data: UnsafeCell<Box<[Cpx]>>,
}

// Single writer (receiver thread) + read-only access from workers that have
// observed the published write cursor.
unsafe impl Sync for IfBuffer {}
unsafe impl Send for IfBuffer {}

impl IfBuffer {
    /// Allocate a buffer of `len` complex samples, zero-filled.
    pub fn new(len: usize) -> Self {
        Self {
            data: UnsafeCell::new(vec![Cpx::ZERO; len].into_boxed_slice()),
        }
    }

    /// Number of complex samples in the buffer.
    pub fn len(&self) -> usize {
        unsafe { (&*self.data.get()).len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The full backing slice.
    ///
    /// Readers must restrict themselves to slots of published cycles (see
    /// module docs); unpublished slots may be concurrently rewritten.
    pub fn samples(&self) -> &[Cpx] {
        unsafe { &*self.data.get() }
    }

    /// Mutable access for the writer.
    ///
    /// # Safety
    /// Only the receiver thread may call this, and only for slots of the
    /// cycle it has not yet published.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn samples_mut(&self) -> &mut [Cpx] {
        &mut *self.data.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_write_then_read() {
        let buff = IfBuffer::new(16);
        unsafe {
            buff.samples_mut()[3] = Cpx::new(1.0, -3.0);
        }
        assert_eq!(buff.samples()[3], Cpx::new(1.0, -3.0));
        assert_eq!(buff.samples()[4], Cpx::ZERO);
    }

    #[test]
    fn test_publication_ordering() {
        // writer publishes each cycle after fully writing its slots; a
        // reader that acquires the cursor must always see complete cycles
        const N: usize = 4;
        const CYCLES: i64 = 2000;
        const CAP: usize = 64;

        let buff = Arc::new(IfBuffer::new(N * CAP));
        let ix_w = Arc::new(AtomicI64::new(-1));

        let wb = buff.clone();
        let wix = ix_w.clone();
        let writer = std::thread::spawn(move || {
            for ix in 0..CYCLES {
                let off = N * (ix as usize % CAP);
                for j in 0..N {
                    unsafe {
                        wb.samples_mut()[off + j] = Cpx::new(ix as f32, j as f32);
                    }
                }
                wix.store(ix, Ordering::Release);
            }
        });

        let mut checked = 0;
        while checked < 200 {
            let ix = ix_w.load(Ordering::Acquire);
            if ix < 0 {
                continue;
            }
            // any cycle within the live window must read back intact
            let lo = (ix + 1 - CAP as i64 + 1).max(0);
            let probe = lo + (checked % (ix - lo + 1).max(1));
            let off = N * (probe as usize % CAP);
            let s = buff.samples();
            for j in 0..N {
                // the writer may have advanced past `ix` since the load, so
                // accept any published cycle that maps to this slot
                let got = s[off + j].i as i64;
                assert!(got >= probe && (got - probe) % CAP as i64 == 0);
                assert_eq!(s[off + j].q, j as f32);
            }
            checked += 1;
        }
        writer.join().unwrap();
    }
}
