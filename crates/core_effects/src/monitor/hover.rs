//! Hover Monitor: window is shown while the cursor is over it, hidden otherwise.

use super::{Monitor, MonitorConfig, MonitorKind, StopReason, Tick};
use crate::{
    BudgetState, EffectDriver, FailureBudget, SharedState, WindowHandle, WindowSystem, INVISIBLE,
};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Drives transparency from the cursor position.
///
/// Only hover transitions cause a write: entering applies the resting level
/// from the shared state, leaving applies full transparency. A failed write
/// is retried on the next tick at the slower error cadence.
#[derive(Debug, Clone)]
pub struct HoverMonitor {
    handle: WindowHandle,
    interval: Duration,
    error_interval: Duration,
    errors: FailureBudget,
    last_hovered: Option<bool>,
}

impl HoverMonitor {
    pub fn new(handle: WindowHandle, config: &MonitorConfig) -> Self {
        Self {
            handle,
            interval: config.hover_interval,
            error_interval: config.hover_error_interval,
            errors: FailureBudget::new(config.hover_error_budget),
            last_hovered: None,
        }
    }

    /// Last hover state that was successfully applied.
    pub fn last_hovered(&self) -> Option<bool> {
        self.last_hovered
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.errors.consecutive()
    }
}

impl Monitor for HoverMonitor {
    const KIND: MonitorKind = MonitorKind::Hover;

    fn handle(&self) -> WindowHandle {
        self.handle
    }

    fn tick<W: WindowSystem>(
        &mut self,
        driver: &EffectDriver<W>,
        state: &SharedState,
        _now: Instant,
    ) -> Tick {
        let snapshot = state.snapshot();
        if !snapshot.wants_hover(self.handle) {
            return Tick::Stop(StopReason::Released);
        }
        if !driver.is_alive(self.handle) {
            return Tick::Stop(StopReason::WindowGone);
        }

        let hovered = driver.is_cursor_over(self.handle);
        if self.last_hovered == Some(hovered) {
            return Tick::Continue(self.interval);
        }

        let level = if hovered {
            snapshot.resting_level
        } else {
            INVISIBLE
        };

        if driver.set_transparency(self.handle, level) {
            trace!(
                "Hover {} on {}: transparency {}",
                if hovered { "enter" } else { "leave" },
                self.handle,
                level
            );
            self.last_hovered = Some(hovered);
            self.errors.record_success();
            return Tick::Continue(self.interval);
        }

        if !driver.is_alive(self.handle) {
            return Tick::Stop(StopReason::WindowGone);
        }

        match self.errors.record_failure() {
            BudgetState::Within { consecutive } => {
                debug!(
                    "Hover update on {} failed ({}/{})",
                    self.handle,
                    consecutive,
                    self.errors.limit()
                );
                Tick::Continue(self.error_interval)
            }
            BudgetState::Exhausted => {
                warn!(
                    "Giving up on hover effect for {} after {} consecutive errors",
                    self.handle,
                    self.errors.limit()
                );
                Tick::Stop(StopReason::BudgetExhausted)
            }
        }
    }
}
