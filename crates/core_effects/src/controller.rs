//! Selection Controller: owns the active window and its effect monitors.
//!
//! The controller is the single writer of [`SharedState`]. Every change of
//! selection stops both monitors and reverts the previous window to normal
//! (not topmost, fully opaque) before the next window becomes active.

use crate::monitor::{HoverMonitor, MonitorHandle, TopmostMonitor};
use crate::{
    EffectDriver, EffectState, MonitorConfig, MonitorKind, MonitorNotice, PlatformError,
    SharedState, StopReason, WindowEntry, WindowHandle, WindowRegistry, WindowSystem,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors reported for operations the user explicitly requested.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No window is selected")]
    NoSelection,

    #[error("Window {0} no longer exists")]
    WindowGone(WindowHandle),

    #[error("{0}")]
    EffectFailed(String),

    #[error("Failed to start {0} monitor: {1}")]
    MonitorSpawn(MonitorKind, String),

    #[error("Hover has been shut down")]
    ShutDown,
}

/// Mediates selection changes and effect toggles for one active window.
pub struct SelectionController<W: WindowSystem> {
    registry: WindowRegistry<W>,
    driver: Arc<EffectDriver<W>>,
    state: SharedState,
    config: MonitorConfig,
    topmost: Option<MonitorHandle>,
    hover: Option<MonitorHandle>,
    notices: Option<mpsc::Sender<MonitorNotice>>,
    pollers: Arc<AtomicUsize>,
    shut_down: bool,
}

impl<W: WindowSystem> SelectionController<W> {
    pub fn new(system: Arc<W>, config: MonitorConfig) -> Self {
        let driver = EffectDriver::with_retry_policy(Arc::clone(&system), config.topmost_retry);
        Self {
            registry: WindowRegistry::new(system),
            driver: Arc::new(driver),
            state: SharedState::default(),
            config,
            topmost: None,
            hover: None,
            notices: None,
            pollers: Arc::new(AtomicUsize::new(0)),
            shut_down: false,
        }
    }

    /// Route monitor notices (window closed, budget exhausted) to `sender`.
    ///
    /// The receiving side should hand each notice back to
    /// [`handle_notice`](Self::handle_notice) on the controller's thread.
    pub fn with_notices(mut self, sender: mpsc::Sender<MonitorNotice>) -> Self {
        self.notices = Some(sender);
        self
    }

    pub fn state(&self) -> EffectState {
        self.state.snapshot()
    }

    /// Cloneable view of the session state, e.g. for a panic hook.
    pub fn shared_state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn selected(&self) -> Option<WindowHandle> {
        self.state.selected()
    }

    pub fn driver(&self) -> &Arc<EffectDriver<W>> {
        &self.driver
    }

    pub fn registry(&self) -> &WindowRegistry<W> {
        &self.registry
    }

    /// Fresh list of selectable windows, sorted by title.
    pub fn refresh(&self) -> Result<Vec<WindowEntry>, PlatformError> {
        self.registry.enumerate()
    }

    pub fn is_monitor_running(&self, kind: MonitorKind) -> bool {
        self.slot(kind)
            .as_ref()
            .is_some_and(|monitor| !monitor.is_finished())
    }

    /// Number of poller threads currently alive.
    pub fn active_pollers(&self) -> usize {
        self.pollers.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Make `handle` the active window.
    ///
    /// The previous window (if any) is reverted first. The new window starts
    /// with every effect off and fully opaque. An invalid handle leaves the
    /// current selection untouched.
    pub fn select(&mut self, handle: WindowHandle) -> Result<(), SelectionError> {
        self.ensure_running()?;

        if !self.driver.is_alive(handle) {
            warn!("Cannot select window {}: it no longer exists", handle);
            return Err(SelectionError::WindowGone(handle));
        }
        if self.selected() == Some(handle) {
            debug!("Window {} is already selected", handle);
            return Ok(());
        }

        self.release_current();
        self.state.update(|s| *s = EffectState::for_window(handle));
        info!("Selected window {}", handle);
        Ok(())
    }

    /// Revert the active window and leave nothing selected.
    pub fn deselect(&mut self) -> Result<(), SelectionError> {
        self.ensure_running()?;
        if self.selected().is_some() {
            self.release_current();
            info!("Selection cleared");
        }
        Ok(())
    }

    pub fn toggle_topmost(&mut self, enabled: bool) -> Result<(), SelectionError> {
        self.ensure_running()?;
        let handle = self.require_selection()?;

        if enabled {
            self.state.update(|s| s.always_on_top = true);
            if !self.driver.set_topmost(handle, true) {
                self.state.update(|s| s.always_on_top = false);
                return Err(self.effect_failure(handle, "make the window always on top"));
            }
            self.start_monitor(MonitorKind::Topmost)?;
            info!("Always on top enabled for {}", handle);
        } else {
            self.state.update(|s| s.always_on_top = false);
            self.stop_monitor(MonitorKind::Topmost);
            if !self.driver.set_topmost(handle, false) {
                return Err(self.effect_failure(handle, "remove always on top"));
            }
            info!("Always on top disabled for {}", handle);
        }
        Ok(())
    }

    pub fn toggle_hover(&mut self, enabled: bool) -> Result<(), SelectionError> {
        self.ensure_running()?;
        let handle = self.require_selection()?;

        if enabled {
            self.state.update(|s| s.hover_enabled = true);
            self.start_monitor(MonitorKind::Hover)?;
            info!("Hover effect enabled for {}", handle);
        } else {
            let was_enabled = self
                .state
                .update(|s| std::mem::replace(&mut s.hover_enabled, false));
            if !was_enabled {
                debug!("Hover effect already off for {}", handle);
                return Ok(());
            }
            if !self.stop_hover(handle) {
                return Err(self.effect_failure(handle, "restore the resting transparency"));
            }
            info!("Hover effect disabled for {}", handle);
        }
        Ok(())
    }

    /// Set the resting transparency (slider value).
    ///
    /// Applied immediately unless hover is on, in which case the hover
    /// monitor uses it on the next cursor entry.
    pub fn set_transparency_level(&mut self, level: u8) -> Result<(), SelectionError> {
        self.ensure_running()?;
        let handle = self.require_selection()?;

        let hover_enabled = self.state.update(|s| {
            s.resting_level = level;
            s.hover_enabled
        });
        if hover_enabled {
            debug!("Resting level {} stored; hover is overriding", level);
            return Ok(());
        }

        if !self.driver.set_transparency(handle, level) {
            return Err(self.effect_failure(handle, "change the transparency"));
        }
        debug!("Transparency of {} set to {}", handle, level);
        Ok(())
    }

    /// React to a monitor that stopped on its own. Call on the controller's thread.
    pub fn handle_notice(&mut self, notice: &MonitorNotice) {
        if self.selected() != Some(notice.handle) {
            debug!("Ignoring stale notice for {}: {:?}", notice.handle, notice.reason);
            return;
        }

        match notice.reason {
            StopReason::Released => {}
            StopReason::WindowGone => {
                warn!("Selected window {} was closed; clearing selection", notice.handle);
                self.forget_selection();
            }
            StopReason::BudgetExhausted => match notice.kind {
                MonitorKind::Topmost => {
                    self.state.update(|s| s.always_on_top = false);
                    self.stop_monitor(MonitorKind::Topmost);
                }
                MonitorKind::Hover => {
                    self.state.update(|s| s.hover_enabled = false);
                    self.stop_hover(notice.handle);
                }
            },
        }
    }

    /// Stop every monitor and revert the active window. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.release_current();
        info!("Effects released; controller shut down");
    }

    fn ensure_running(&self) -> Result<(), SelectionError> {
        if self.shut_down {
            Err(SelectionError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Active handle, verified alive. A dead selection is cleared.
    fn require_selection(&mut self) -> Result<WindowHandle, SelectionError> {
        let handle = self.selected().ok_or(SelectionError::NoSelection)?;
        if !self.driver.is_alive(handle) {
            warn!("Selected window {} no longer exists", handle);
            self.forget_selection();
            return Err(SelectionError::WindowGone(handle));
        }
        Ok(handle)
    }

    fn effect_failure(&mut self, handle: WindowHandle, action: &str) -> SelectionError {
        if !self.driver.is_alive(handle) {
            self.forget_selection();
            SelectionError::WindowGone(handle)
        } else {
            SelectionError::EffectFailed(format!("Could not {} for window {}", action, handle))
        }
    }

    /// Stop monitors and revert the active window, then clear the state.
    fn release_current(&mut self) {
        let previous = self.state.snapshot();
        self.stop_monitor(MonitorKind::Topmost);

        if let Some(handle) = previous.selected {
            if self.driver.is_alive(handle) {
                if previous.hover_enabled {
                    self.stop_hover(handle);
                }
                if !self.driver.restore_to_normal(handle) {
                    warn!("Window {} could not be fully restored", handle);
                }
            } else {
                debug!("Previous window {} is gone; nothing to revert", handle);
            }
        }

        self.stop_monitor(MonitorKind::Hover);
        self.state.update(|s| *s = EffectState::default());
    }

    /// Drop the selection without touching the window.
    fn forget_selection(&mut self) {
        self.stop_monitor(MonitorKind::Topmost);
        self.stop_monitor(MonitorKind::Hover);
        self.state.update(|s| *s = EffectState::default());
    }

    /// Stop the hover monitor and put the resting level back.
    fn stop_hover(&mut self, handle: WindowHandle) -> bool {
        self.stop_monitor(MonitorKind::Hover);
        let level = self.state.resting_level();
        self.driver.set_transparency(handle, level)
    }

    fn slot(&self, kind: MonitorKind) -> &Option<MonitorHandle> {
        match kind {
            MonitorKind::Topmost => &self.topmost,
            MonitorKind::Hover => &self.hover,
        }
    }

    fn slot_mut(&mut self, kind: MonitorKind) -> &mut Option<MonitorHandle> {
        match kind {
            MonitorKind::Topmost => &mut self.topmost,
            MonitorKind::Hover => &mut self.hover,
        }
    }

    fn stop_monitor(&mut self, kind: MonitorKind) {
        if let Some(monitor) = self.slot_mut(kind).take() {
            debug!("Stopping {} monitor for {}", kind, monitor.handle());
            monitor.stop();
        }
    }

    /// Start the monitor of `kind` for the active window, replacing any
    /// existing one of the same kind.
    fn start_monitor(&mut self, kind: MonitorKind) -> Result<(), SelectionError> {
        let handle = self.selected().ok_or(SelectionError::NoSelection)?;
        self.stop_monitor(kind);

        let driver = Arc::clone(&self.driver);
        let state = self.state.clone();
        let notices = self.notices.clone();
        let spawned = match kind {
            MonitorKind::Topmost => MonitorHandle::spawn(
                TopmostMonitor::new(handle, &self.config),
                driver,
                state,
                notices,
                &self.pollers,
            ),
            MonitorKind::Hover => MonitorHandle::spawn(
                HoverMonitor::new(handle, &self.config),
                driver,
                state,
                notices,
                &self.pollers,
            ),
        };

        match spawned {
            Ok(monitor) => {
                *self.slot_mut(kind) = Some(monitor);
                Ok(())
            }
            Err(e) => {
                self.state.update(|s| match kind {
                    MonitorKind::Topmost => s.always_on_top = false,
                    MonitorKind::Hover => s.hover_enabled = false,
                });
                Err(SelectionError::MonitorSpawn(kind, e.to_string()))
            }
        }
    }
}

impl<W: WindowSystem> Drop for SelectionController<W> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
