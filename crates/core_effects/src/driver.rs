//! Effect Driver: applies and removes effects on a single window.
//!
//! A stale handle is an expected condition here, not an error. Every
//! operation checks liveness first and reports failure as `false`; no
//! platform error propagates past this type.

use crate::{RetryPolicy, WindowHandle, WindowSystem, ZOrder, OPAQUE};
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace, warn};

/// Applies topmost and transparency effects through a [`WindowSystem`].
pub struct EffectDriver<W: WindowSystem> {
    system: Arc<W>,
    topmost_retry: RetryPolicy,
}

impl<W: WindowSystem> EffectDriver<W> {
    pub fn new(system: Arc<W>) -> Self {
        Self::with_retry_policy(system, RetryPolicy::default())
    }

    pub fn with_retry_policy(system: Arc<W>, topmost_retry: RetryPolicy) -> Self {
        Self {
            system,
            topmost_retry,
        }
    }

    pub fn system(&self) -> &Arc<W> {
        &self.system
    }

    pub fn is_alive(&self, handle: WindowHandle) -> bool {
        self.system.is_window(handle)
    }

    /// Place the window above (or back among) ordinary windows and verify it.
    ///
    /// Retries per the topmost policy. When enabling, the second attempt
    /// demotes the window first and then promotes it again. Returns `false`
    /// when every attempt failed or the window disappeared.
    pub fn set_topmost(&self, handle: WindowHandle, enabled: bool) -> bool {
        let target = if enabled {
            ZOrder::Topmost
        } else {
            ZOrder::NotTopmost
        };

        for attempt in self.topmost_retry.attempts() {
            if !self.is_alive(handle) {
                debug!("set_topmost: window {} is gone", handle);
                return false;
            }

            let placed = if enabled && attempt == 2 {
                self.system
                    .set_z_order(handle, ZOrder::NotTopmost)
                    .and_then(|()| self.system.set_z_order(handle, ZOrder::Topmost))
            } else {
                self.system.set_z_order(handle, target)
            };

            match placed {
                Ok(()) => {
                    if self.is_topmost(handle) == enabled {
                        trace!(
                            "set_topmost({}, {}) verified on attempt {}",
                            handle,
                            enabled,
                            attempt
                        );
                        return true;
                    }
                    debug!(
                        "set_topmost({}, {}) attempt {} not reflected in window state",
                        handle, enabled, attempt
                    );
                }
                Err(e) => {
                    if !self.is_alive(handle) {
                        debug!("set_topmost: window {} closed mid-operation", handle);
                        return false;
                    }
                    debug!(
                        "set_topmost({}, {}) attempt {} failed: {}",
                        handle, enabled, attempt, e
                    );
                }
            }

            if !self.topmost_retry.is_last(attempt) {
                let delay = self.topmost_retry.delay_after(attempt);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
        }

        warn!(
            "Failed to set topmost={} on window {} after {} attempts",
            enabled, handle, self.topmost_retry.max_attempts
        );
        false
    }

    /// Apply an alpha value (0 = invisible, 255 = opaque).
    ///
    /// Enables the layered style first if it is not already set. A fully
    /// transparent window still receives input.
    pub fn set_transparency(&self, handle: WindowHandle, level: u8) -> bool {
        if !self.is_alive(handle) {
            debug!("set_transparency: window {} is gone", handle);
            return false;
        }

        let layered = match self.system.is_layered(handle) {
            Ok(layered) => layered,
            Err(e) => {
                warn!("Failed to read extended style of {}: {}", handle, e);
                return false;
            }
        };
        if !layered {
            if let Err(e) = self.system.set_layered(handle, true) {
                warn!("Failed to enable layered style on {}: {}", handle, e);
                return false;
            }
        }

        match self.system.set_alpha(handle, level) {
            Ok(()) => {
                trace!("Window {} transparency set to {}", handle, level);
                true
            }
            Err(e) => {
                warn!("Failed to set transparency {} on {}: {}", level, handle, e);
                false
            }
        }
    }

    /// Best-effort reset: not topmost, fully opaque, layered style removed.
    ///
    /// Every step is attempted even if an earlier one fails. Returns `true`
    /// only when the window was alive and every step succeeded.
    pub fn restore_to_normal(&self, handle: WindowHandle) -> bool {
        if !self.is_alive(handle) {
            debug!("restore_to_normal: window {} is already gone", handle);
            return false;
        }

        let mut ok = true;

        if let Err(e) = self.system.set_z_order(handle, ZOrder::NotTopmost) {
            warn!("Failed to demote window {}: {}", handle, e);
            ok = false;
        }

        match self.system.is_layered(handle) {
            Ok(true) => {
                if let Err(e) = self.system.set_alpha(handle, OPAQUE) {
                    debug!("Failed to set window {} opaque: {}", handle, e);
                }
                if let Err(e) = self.system.set_layered(handle, false) {
                    warn!("Failed to clear layered style on {}: {}", handle, e);
                    ok = false;
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Failed to read extended style of {}: {}", handle, e);
                ok = false;
            }
        }

        debug!("Window {} restored to normal (clean = {})", handle, ok);
        ok
    }

    /// Current topmost bit; `false` when it cannot be read.
    pub fn is_topmost(&self, handle: WindowHandle) -> bool {
        self.system.is_topmost(handle).unwrap_or(false)
    }

    /// Whether the cursor is inside the window bounds; `false` when the
    /// window is gone or its bounds cannot be read.
    pub fn is_cursor_over(&self, handle: WindowHandle) -> bool {
        if !self.is_alive(handle) {
            return false;
        }
        let rect = match self.system.window_rect(handle) {
            Ok(rect) => rect,
            Err(e) => {
                trace!("Cannot read bounds of {}: {}", handle, e);
                return false;
            }
        };
        match self.system.cursor_position() {
            Ok(point) => rect.contains(point),
            Err(e) => {
                trace!("Cannot read cursor position: {}", e);
                false
            }
        }
    }
}
