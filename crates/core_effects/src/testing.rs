//! In-memory [`WindowSystem`] for tests and headless runs.
//!
//! [`FakeWindowSystem`] models just enough of a desktop to exercise the
//! effect core: windows with a title, visibility, bounds, topmost and
//! layered bits and an alpha value, plus a cursor. It can simulate a rival
//! stripping topmost, calls that "succeed" without effect, hard call
//! failures and windows closing mid-operation. Every trait call is counted.

use crate::{PlatformError, Point, Rect, WindowEntry, WindowHandle, WindowSystem, ZOrder, OPAQUE};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Number of times each [`WindowSystem`] call was made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub enumerate_windows: u32,
    pub is_window: u32,
    pub set_z_order: u32,
    pub is_topmost: u32,
    pub is_layered: u32,
    pub set_layered: u32,
    pub set_alpha: u32,
    pub cursor_position: u32,
    pub window_rect: u32,
}

#[derive(Debug, Clone)]
struct FakeWindow {
    title: String,
    visible: bool,
    rect: Rect,
    topmost: bool,
    layered: bool,
    alpha: u8,
    /// Next N z-order calls report success but change nothing.
    ignore_z_order: u32,
    /// Next N z-order calls return an error.
    fail_z_order: u32,
    /// Next N alpha calls return an error.
    fail_alpha: u32,
    /// Window is destroyed by the next z-order call.
    close_on_z_order: bool,
    rect_unreadable: bool,
}

#[derive(Debug, Default)]
struct Desktop {
    windows: BTreeMap<WindowHandle, FakeWindow>,
    cursor: Point,
    calls: CallCounts,
}

impl Desktop {
    fn window(&self, handle: WindowHandle) -> Result<&FakeWindow, PlatformError> {
        self.windows
            .get(&handle)
            .ok_or(PlatformError::InvalidHandle(handle))
    }

    fn window_mut(&mut self, handle: WindowHandle) -> Result<&mut FakeWindow, PlatformError> {
        self.windows
            .get_mut(&handle)
            .ok_or(PlatformError::InvalidHandle(handle))
    }
}

/// Simulated desktop implementing [`WindowSystem`].
#[derive(Debug, Default)]
pub struct FakeWindowSystem {
    desktop: Mutex<Desktop>,
}

impl FakeWindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn desktop(&self) -> MutexGuard<'_, Desktop> {
        self.desktop.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a visible, opaque, non-topmost window.
    pub fn add_window(&self, handle: WindowHandle, title: &str, rect: Rect) {
        self.desktop().windows.insert(
            handle,
            FakeWindow {
                title: title.to_string(),
                visible: true,
                rect,
                topmost: false,
                layered: false,
                alpha: OPAQUE,
                ignore_z_order: 0,
                fail_z_order: 0,
                fail_alpha: 0,
                close_on_z_order: false,
                rect_unreadable: false,
            },
        );
    }

    /// Destroy a window, as its owning process would.
    pub fn close_window(&self, handle: WindowHandle) {
        self.desktop().windows.remove(&handle);
    }

    pub fn set_visible(&self, handle: WindowHandle, visible: bool) {
        if let Some(window) = self.desktop().windows.get_mut(&handle) {
            window.visible = visible;
        }
    }

    pub fn move_cursor(&self, point: Point) {
        self.desktop().cursor = point;
    }

    /// A rival window or the shell clears the topmost bit behind our back.
    pub fn strip_topmost(&self, handle: WindowHandle) {
        if let Some(window) = self.desktop().windows.get_mut(&handle) {
            window.topmost = false;
        }
    }

    /// The next `count` z-order calls report success without taking effect.
    pub fn ignore_z_order(&self, handle: WindowHandle, count: u32) {
        if let Some(window) = self.desktop().windows.get_mut(&handle) {
            window.ignore_z_order = count;
        }
    }

    /// The next `count` z-order calls fail outright.
    pub fn fail_z_order(&self, handle: WindowHandle, count: u32) {
        if let Some(window) = self.desktop().windows.get_mut(&handle) {
            window.fail_z_order = count;
        }
    }

    /// The next `count` alpha calls fail outright.
    pub fn fail_alpha(&self, handle: WindowHandle, count: u32) {
        if let Some(window) = self.desktop().windows.get_mut(&handle) {
            window.fail_alpha = count;
        }
    }

    /// The window is destroyed as soon as the next z-order call arrives.
    pub fn close_on_next_z_order(&self, handle: WindowHandle) {
        if let Some(window) = self.desktop().windows.get_mut(&handle) {
            window.close_on_z_order = true;
        }
    }

    pub fn make_rect_unreadable(&self, handle: WindowHandle) {
        if let Some(window) = self.desktop().windows.get_mut(&handle) {
            window.rect_unreadable = true;
        }
    }

    /// Observed topmost bit; `false` for unknown windows.
    pub fn topmost_of(&self, handle: WindowHandle) -> bool {
        self.desktop()
            .windows
            .get(&handle)
            .is_some_and(|w| w.topmost)
    }

    pub fn layered_of(&self, handle: WindowHandle) -> bool {
        self.desktop()
            .windows
            .get(&handle)
            .is_some_and(|w| w.layered)
    }

    /// Observed opacity: the alpha when layered, fully opaque otherwise.
    pub fn alpha_of(&self, handle: WindowHandle) -> Option<u8> {
        self.desktop()
            .windows
            .get(&handle)
            .map(|w| if w.layered { w.alpha } else { OPAQUE })
    }

    pub fn calls(&self) -> CallCounts {
        self.desktop().calls
    }

    pub fn reset_calls(&self) {
        self.desktop().calls = CallCounts::default();
    }
}

impl WindowSystem for FakeWindowSystem {
    fn enumerate_windows(&self) -> Result<Vec<WindowEntry>, PlatformError> {
        let mut desktop = self.desktop();
        desktop.calls.enumerate_windows += 1;
        Ok(desktop
            .windows
            .iter()
            .filter(|(_, w)| w.visible && !w.title.is_empty())
            .map(|(handle, w)| WindowEntry::new(*handle, w.title.clone()))
            .collect())
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        let mut desktop = self.desktop();
        desktop.calls.is_window += 1;
        desktop.windows.contains_key(&handle)
    }

    fn set_z_order(&self, handle: WindowHandle, order: ZOrder) -> Result<(), PlatformError> {
        let mut desktop = self.desktop();
        desktop.calls.set_z_order += 1;

        let window = desktop.window_mut(handle)?;
        if window.close_on_z_order {
            desktop.windows.remove(&handle);
            return Err(PlatformError::InvalidHandle(handle));
        }
        if window.fail_z_order > 0 {
            window.fail_z_order -= 1;
            return Err(PlatformError::call_failed("SetWindowPos", "access denied"));
        }
        if window.ignore_z_order > 0 {
            window.ignore_z_order -= 1;
            return Ok(());
        }
        window.topmost = order == ZOrder::Topmost;
        Ok(())
    }

    fn is_topmost(&self, handle: WindowHandle) -> Result<bool, PlatformError> {
        let mut desktop = self.desktop();
        desktop.calls.is_topmost += 1;
        Ok(desktop.window(handle)?.topmost)
    }

    fn is_layered(&self, handle: WindowHandle) -> Result<bool, PlatformError> {
        let mut desktop = self.desktop();
        desktop.calls.is_layered += 1;
        Ok(desktop.window(handle)?.layered)
    }

    fn set_layered(&self, handle: WindowHandle, layered: bool) -> Result<(), PlatformError> {
        let mut desktop = self.desktop();
        desktop.calls.set_layered += 1;
        let window = desktop.window_mut(handle)?;
        window.layered = layered;
        if !layered {
            window.alpha = OPAQUE;
        }
        Ok(())
    }

    fn set_alpha(&self, handle: WindowHandle, alpha: u8) -> Result<(), PlatformError> {
        let mut desktop = self.desktop();
        desktop.calls.set_alpha += 1;
        let window = desktop.window_mut(handle)?;
        if window.fail_alpha > 0 {
            window.fail_alpha -= 1;
            return Err(PlatformError::call_failed(
                "SetLayeredWindowAttributes",
                "window not responding",
            ));
        }
        if !window.layered {
            return Err(PlatformError::call_failed(
                "SetLayeredWindowAttributes",
                "window is not layered",
            ));
        }
        window.alpha = alpha;
        Ok(())
    }

    fn cursor_position(&self) -> Result<Point, PlatformError> {
        let mut desktop = self.desktop();
        desktop.calls.cursor_position += 1;
        Ok(desktop.cursor)
    }

    fn window_rect(&self, handle: WindowHandle) -> Result<Rect, PlatformError> {
        let mut desktop = self.desktop();
        desktop.calls.window_rect += 1;
        let window = desktop.window(handle)?;
        if window.rect_unreadable {
            return Err(PlatformError::call_failed("GetWindowRect", "access denied"));
        }
        Ok(window.rect)
    }
}
