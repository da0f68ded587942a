//! Render Scheduler
//!
//! Coalesces paint requests: however many fragments arrive between two paint
//! opportunities, at most one render runs, and it always sees the latest
//! accumulated text. Paint opportunities come from a [`FrameClock`] ticking
//! at roughly display rate.
//!
//! ```text
//!   fragment ─▶ schedule() ─┐        (pending = true, repeats coalesce)
//!   fragment ─▶ schedule() ─┤
//!                           ▼
//!   tick ────────────────▶ fire(render) ──▶ render(current text)
//!   stream end ──────────▶ flush(render) ─▶ render(final text)
//!   cancel ──────────────▶ cancel()        (pending dropped, nothing fires)
//! ```

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

use crate::config::FRAME_INTERVAL;

/// Counters for how much coalescing happened
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Calls to `schedule`
    pub requested: u32,
    /// Requests folded into an already pending paint
    pub coalesced: u32,
    /// Renders actually run
    pub rendered: u32,
}

/// Single-flight paint scheduler
#[derive(Debug, Default)]
pub struct RenderScheduler {
    pending: bool,
    stats: SchedulerStats,
}

impl RenderScheduler {
    /// Create a scheduler with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a paint. Returns false if one was already pending.
    pub fn schedule(&mut self) -> bool {
        self.stats.requested += 1;
        if self.pending {
            self.stats.coalesced += 1;
            false
        } else {
            self.pending = true;
            true
        }
    }

    /// Whether a paint is outstanding
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Paint opportunity: run `render` once if a paint is pending
    pub fn fire<T>(&mut self, render: impl FnOnce() -> T) -> Option<T> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        self.stats.rendered += 1;
        Some(render())
    }

    /// Paint unconditionally, dropping anything pending
    pub fn flush<T>(&mut self, render: impl FnOnce() -> T) -> T {
        self.pending = false;
        self.stats.rendered += 1;
        render()
    }

    /// Drop a pending paint without rendering
    pub fn cancel(&mut self) {
        self.pending = false;
    }

    /// Counters so far
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

/// Source of paint opportunities
#[derive(Debug)]
pub struct FrameClock {
    interval: Interval,
}

impl FrameClock {
    /// Clock ticking every `period`; the first tick is one period away
    pub fn new(period: Duration) -> Self {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Wait for the next paint opportunity. Cancel-safe.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(FRAME_INTERVAL)
    }
}
