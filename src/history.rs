//! history.rs — in-memory log of finished runs, so webhook-triggered runs can be
//! inspected later via `/runs`.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::pipeline::RunReport;

#[derive(Debug)]
pub struct RunHistory {
    inner: Mutex<VecDeque<RunReport>>,
    cap: usize,
}

impl RunHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RunReport>> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, report: RunReport) {
        let mut v = self.lock();
        v.push_back(report);
        while v.len() > self.cap {
            v.pop_front();
        }
    }

    pub fn last(&self) -> Option<RunReport> {
        self.lock().back().cloned()
    }

    /// Most recent first.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<RunReport> {
        self.lock().iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
