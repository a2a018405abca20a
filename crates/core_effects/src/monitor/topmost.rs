//! Topmost Monitor: re-asserts always-on-top when something strips it.

use super::{Monitor, MonitorConfig, MonitorKind, StopReason, Tick};
use crate::{BudgetState, EffectDriver, FailureBudget, SharedState, WindowHandle, WindowSystem};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Keeps one window topmost while the user asks for it.
///
/// Every tick compares the observed topmost bit with the request and
/// repairs drift. Independently of what it observes, it re-applies topmost
/// once per force interval. After the failure budget of consecutive failed
/// repairs it gives up.
#[derive(Debug, Clone)]
pub struct TopmostMonitor {
    handle: WindowHandle,
    interval: Duration,
    force_interval: Duration,
    failures: FailureBudget,
    last_forced: Option<Instant>,
}

impl TopmostMonitor {
    pub fn new(handle: WindowHandle, config: &MonitorConfig) -> Self {
        Self {
            handle,
            interval: config.topmost_interval,
            force_interval: config.topmost_force_interval,
            failures: FailureBudget::new(config.topmost_failure_budget),
            last_forced: None,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.consecutive()
    }

    fn force_due(&mut self, now: Instant) -> bool {
        match self.last_forced {
            None => {
                self.last_forced = Some(now);
                false
            }
            Some(at) => now.saturating_duration_since(at) >= self.force_interval,
        }
    }
}

impl Monitor for TopmostMonitor {
    const KIND: MonitorKind = MonitorKind::Topmost;

    fn handle(&self) -> WindowHandle {
        self.handle
    }

    fn tick<W: WindowSystem>(
        &mut self,
        driver: &EffectDriver<W>,
        state: &SharedState,
        now: Instant,
    ) -> Tick {
        if !state.snapshot().wants_topmost(self.handle) {
            return Tick::Stop(StopReason::Released);
        }
        if !driver.is_alive(self.handle) {
            return Tick::Stop(StopReason::WindowGone);
        }

        let force = self.force_due(now);
        let observed = driver.is_topmost(self.handle);
        if observed && !force {
            self.failures.record_success();
            return Tick::Continue(self.interval);
        }

        if force {
            debug!("Periodic topmost re-apply on {}", self.handle);
            self.last_forced = Some(now);
        }

        if driver.set_topmost(self.handle, true) {
            if !observed {
                info!("Topmost restored on window {}", self.handle);
            }
            self.failures.record_success();
            return Tick::Continue(self.interval);
        }

        if !driver.is_alive(self.handle) {
            return Tick::Stop(StopReason::WindowGone);
        }

        match self.failures.record_failure() {
            BudgetState::Within { consecutive } => {
                debug!(
                    "Topmost repair on {} failed ({}/{})",
                    self.handle,
                    consecutive,
                    self.failures.limit()
                );
                Tick::Continue(self.interval)
            }
            BudgetState::Exhausted => {
                warn!(
                    "Giving up on topmost for {} after {} consecutive failures",
                    self.handle,
                    self.failures.limit()
                );
                Tick::Stop(StopReason::BudgetExhausted)
            }
        }
    }
}
