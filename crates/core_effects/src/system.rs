//! The native window system seam.
//!
//! [`WindowSystem`] is the narrow set of window-manager calls the effect core
//! consumes. The Win32 implementation lives in `hover-platform-win32`;
//! [`crate::testing::FakeWindowSystem`] is the in-memory implementation.

use crate::{Point, Rect, WindowEntry, WindowHandle};
use thiserror::Error;

/// Errors reported by a [`WindowSystem`] call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Window {0} no longer exists")]
    InvalidHandle(WindowHandle),

    #[error("{call} failed: {message}")]
    CallFailed { call: &'static str, message: String },
}

impl PlatformError {
    pub fn call_failed(call: &'static str, message: impl Into<String>) -> Self {
        Self::CallFailed {
            call,
            message: message.into(),
        }
    }
}

/// Z-order placement requested for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZOrder {
    /// Above all non-topmost windows.
    Topmost,
    /// Back among ordinary windows.
    NotTopmost,
}

/// Primitive window-system calls used by the effect core.
///
/// Implementations must be callable from any thread: monitors run on
/// background threads and share one instance with the controller.
pub trait WindowSystem: Send + Sync + 'static {
    /// Visible top-level windows with a non-empty title, in any order.
    fn enumerate_windows(&self) -> Result<Vec<WindowEntry>, PlatformError>;

    /// Whether the handle still refers to a live window.
    fn is_window(&self, handle: WindowHandle) -> bool;

    /// Change z-order placement without moving, resizing or activating.
    fn set_z_order(&self, handle: WindowHandle, order: ZOrder) -> Result<(), PlatformError>;

    /// Read back the topmost extended style bit.
    fn is_topmost(&self, handle: WindowHandle) -> Result<bool, PlatformError>;

    /// Whether the layered extended style bit is set.
    fn is_layered(&self, handle: WindowHandle) -> Result<bool, PlatformError>;

    /// Set or clear the layered extended style bit.
    fn set_layered(&self, handle: WindowHandle, layered: bool) -> Result<(), PlatformError>;

    /// Apply a per-window alpha. Requires the layered style.
    fn set_alpha(&self, handle: WindowHandle, alpha: u8) -> Result<(), PlatformError>;

    /// Current cursor position in screen coordinates.
    fn cursor_position(&self) -> Result<Point, PlatformError>;

    /// Window bounding rectangle in screen coordinates.
    fn window_rect(&self, handle: WindowHandle) -> Result<Rect, PlatformError>;
}
