use crate::data::RejectReason;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Failure injection for [`super::LocalStore`].
#[derive(Default)]
pub struct FaultPlan {
    failing_writes: AtomicU32,
    lost_acks: AtomicU32,
    interrupted_scans: AtomicU32,
    rejections: Mutex<HashMap<Vec<u8>, Rejection>>,
    write_attempts: AtomicU64,
    scan_pages: AtomicU64,
}

struct Rejection {
    reason: RejectReason,
    remaining: Option<u32>,
}

pub(crate) enum WriteFault {
    None,
    FailBeforeApply,
    DropAck,
}

impl FaultPlan {
    /// The next `n` batch writes fail with a transport error before anything
    /// is applied.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// The next `n` batch writes are applied but the acknowledgement is lost.
    pub fn lose_next_acks(&self, n: u32) {
        self.lost_acks.store(n, Ordering::SeqCst);
    }

    /// The next `n` scan pages fail with an interruption.
    pub fn interrupt_next_scans(&self, n: u32) {
        self.interrupted_scans.store(n, Ordering::SeqCst);
    }

    /// Refuse mutations for `row`. With `times == None` every attempt is
    /// refused, otherwise only the first `times`.
    pub fn reject_row(&self, row: impl Into<Vec<u8>>, reason: RejectReason, times: Option<u32>) {
        self.rejections.lock().insert(
            row.into(),
            Rejection {
                reason,
                remaining: times,
            },
        );
    }

    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn scan_pages(&self) -> u64 {
        self.scan_pages.load(Ordering::SeqCst)
    }

    pub(crate) fn on_write(&self) -> WriteFault {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_writes) {
            WriteFault::FailBeforeApply
        } else if take_one(&self.lost_acks) {
            WriteFault::DropAck
        } else {
            WriteFault::None
        }
    }

    pub(crate) fn on_scan_page(&self) -> bool {
        self.scan_pages.fetch_add(1, Ordering::SeqCst);
        take_one(&self.interrupted_scans)
    }

    pub(crate) fn rejection_for(&self, row: &[u8]) -> Option<RejectReason> {
        let mut rejections = self.rejections.lock();
        let rejection = rejections.get_mut(row)?;
        match rejection.remaining {
            None => Some(rejection.reason.clone()),
            Some(0) => None,
            Some(ref mut n) => {
                *n -= 1;
                Some(rejection.reason.clone())
            }
        }
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counted_faults_run_out() {
        let plan = FaultPlan::default();
        plan.fail_next_writes(2);
        assert!(matches!(plan.on_write(), WriteFault::FailBeforeApply));
        assert!(matches!(plan.on_write(), WriteFault::FailBeforeApply));
        assert!(matches!(plan.on_write(), WriteFault::None));
        assert_eq!(plan.write_attempts(), 3);
    }

    #[test]
    fn test_limited_rejection() {
        let plan = FaultPlan::default();
        plan.reject_row("row_1", RejectReason::Transient("busy".into()), Some(1));
        assert!(plan.rejection_for(b"row_1").is_some());
        assert!(plan.rejection_for(b"row_1").is_none());
        assert!(plan.rejection_for(b"row_2").is_none());
    }
}
