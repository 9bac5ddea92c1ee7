// ==========================================
// 调度任务防重入
// ==========================================

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// 调度执行结果; 上一轮尚未结束时返回 Skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SweepOutcome<T> {
    Completed(T),
    Skipped,
}

impl<T> SweepOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            SweepOutcome::Completed(report) => Some(report),
            SweepOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SweepOutcome::Skipped)
    }
}

/// 运行标志的占用凭证, 释放时复位
pub(crate) struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
