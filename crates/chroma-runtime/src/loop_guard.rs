//! [`LoopGuard`] – repeated-pick detector.
//!
//! A healthy sort loop picks the same color several times in a row only
//! while objects of that color remain. A streak that never ends usually
//! means the robot keeps "picking" a phantom: a reflection, a sticker on the
//! table, or an object the gripper fails to lift.
//!
//! # Algorithm
//!
//! The guard maintains a rolling window of the last `threshold` labels.
//! After each [`LoopGuard::record`] call it checks whether the window is
//! full and every entry is identical. If so, [`record`][LoopGuard::record]
//! returns `true` and the caller should stop.
//!
//! # Example
//!
//! ```rust
//! use chroma_runtime::loop_guard::LoopGuard;
//!
//! let mut guard = LoopGuard::new(3);
//!
//! assert!(!guard.record("red"));
//! assert!(!guard.record("red"));
//! assert!(guard.record("red")); // third pick in a row
//!
//! guard.reset();
//! assert!(!guard.record("red"));
//! ```

use std::collections::VecDeque;

// ─────────────────────────────────────────────────────────────────────────────
// LoopGuard
// ─────────────────────────────────────────────────────────────────────────────

/// Flags `threshold` consecutive identical labels.
pub struct LoopGuard {
    threshold: usize,
    history: VecDeque<String>,
}

impl LoopGuard {
    /// `threshold` is the streak length that counts as stuck. A threshold of
    /// 1 triggers on every record.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            history: VecDeque::with_capacity(threshold),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Record one label. Returns `true` when the last `threshold` labels are
    /// all equal.
    pub fn record(&mut self, label: &str) -> bool {
        self.history.push_back(label.to_string());
        while self.history.len() > self.threshold {
            self.history.pop_front();
        }
        self.is_stuck()
    }

    /// `true` when the window is full and uniform.
    pub fn is_stuck(&self) -> bool {
        if self.threshold == 0 || self.history.len() < self.threshold {
            return false;
        }
        let first = &self.history[0];
        self.history.iter().all(|a| a == first)
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
