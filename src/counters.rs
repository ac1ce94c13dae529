use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;

/// Running totals since the scheduler was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Events appended to a window, absent readings included.
    pub accepted: u64,
    /// Events dropped because the gateway is not allow-listed.
    pub discarded: u64,
    /// Accepted events whose reading was absent.
    pub missing: u64,
    /// Windows retired.
    pub rotations: u64,
}

#[derive(Debug, Default)]
pub(crate) struct IngestCounters {
    accepted: AtomicU64,
    discarded: AtomicU64,
    missing: AtomicU64,
    rotations: AtomicU64,
}

impl IngestCounters {
    #[inline(always)]
    pub(crate) fn accepted(&self, has_reading: bool) {
        self.accepted.fetch_add(1, Relaxed);
        if !has_reading {
            self.missing.fetch_add(1, Relaxed);
        }
    }

    #[inline(always)]
    pub(crate) fn discarded(&self) {
        self.discarded.fetch_add(1, Relaxed);
    }

    pub(crate) fn rotated(&self) {
        self.rotations.fetch_add(1, Relaxed);
    }

    pub(crate) fn snapshot(&self) -> IngestStats {
        IngestStats {
            accepted: self.accepted.load(Relaxed),
            discarded: self.discarded.load(Relaxed),
            missing: self.missing.load(Relaxed),
            rotations: self.rotations.load(Relaxed),
        }
    }
}
