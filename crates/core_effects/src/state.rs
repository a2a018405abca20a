//! Effect session state shared between the controller and the monitors.

use crate::{WindowHandle, OPAQUE};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// What the user asked for on the currently selected window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectState {
    /// The single active window, if any.
    pub selected: Option<WindowHandle>,
    pub always_on_top: bool,
    pub hover_enabled: bool,
    /// Slider value; applied directly when hover is off, and on hover-enter
    /// when hover is on.
    pub resting_level: u8,
}

impl Default for EffectState {
    fn default() -> Self {
        Self {
            selected: None,
            always_on_top: false,
            hover_enabled: false,
            resting_level: OPAQUE,
        }
    }
}

impl EffectState {
    /// State for a freshly adopted window: all toggles off, fully opaque.
    pub fn for_window(handle: WindowHandle) -> Self {
        Self {
            selected: Some(handle),
            ..Self::default()
        }
    }

    /// Whether a topmost monitor bound to `handle` should keep running.
    pub fn wants_topmost(&self, handle: WindowHandle) -> bool {
        self.selected == Some(handle) && self.always_on_top
    }

    /// Whether a hover monitor bound to `handle` should keep running.
    pub fn wants_hover(&self, handle: WindowHandle) -> bool {
        self.selected == Some(handle) && self.hover_enabled
    }
}

/// Cloneable handle to the session state.
///
/// The controller is the only writer; monitors take short read snapshots
/// each tick.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<EffectState>>,
}

impl SharedState {
    pub fn new(state: EffectState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EffectState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> EffectState {
        *self.lock()
    }

    pub fn selected(&self) -> Option<WindowHandle> {
        self.lock().selected
    }

    pub fn resting_level(&self) -> u8 {
        self.lock().resting_level
    }

    /// Mutate under the lock and return the closure's result.
    pub fn update<R>(&self, f: impl FnOnce(&mut EffectState) -> R) -> R {
        f(&mut self.lock())
    }
}
