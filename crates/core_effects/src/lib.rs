//! Hover Core Effects
//!
//! Platform-agnostic core of the Hover window effect utility.
//!
//! This crate implements three cosmetic effects applied to a foreign
//! top-level window:
//! - Always on top (re-asserted by a background monitor)
//! - Static transparency (layered-window alpha)
//! - Hover reveal (opaque while the cursor is over the window, invisible otherwise)
//!
//! All native calls go through the [`WindowSystem`] trait so the state
//! machines can be driven by [`testing::FakeWindowSystem`] in tests.

pub mod controller;
pub mod driver;
pub mod monitor;
pub mod registry;
pub mod retry;
pub mod state;
pub mod system;
pub mod testing;

pub use controller::{SelectionController, SelectionError};
pub use driver::EffectDriver;
pub use monitor::{
    HoverMonitor, MonitorConfig, MonitorHandle, MonitorKind, MonitorNotice, StopReason, Tick,
    TopmostMonitor,
};
pub use registry::WindowRegistry;
pub use retry::{Backoff, BudgetState, FailureBudget, RetryPolicy};
pub use state::{EffectState, SharedState};
pub use system::{PlatformError, WindowSystem, ZOrder};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alpha value for a fully opaque window.
pub const OPAQUE: u8 = 255;

/// Alpha value for a fully invisible window.
pub const INVISIBLE: u8 = 0;

/// Opaque identifier for a top-level window.
///
/// On Windows this is the HWND value. The window is owned by another
/// process and may be destroyed at any time, so a handle must be
/// re-validated before every use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(u64);

impl WindowHandle {
    /// Wrap a raw OS handle value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw OS handle value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// A window offered for selection: handle plus title at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub handle: WindowHandle,
    pub title: String,
}

impl WindowEntry {
    pub fn new(handle: WindowHandle, title: impl Into<String>) -> Self {
        Self {
            handle,
            title: title.into(),
        }
    }

    /// Title shortened to `max_chars` characters, with `...` appended when cut.
    pub fn display_title(&self, max_chars: usize) -> String {
        if self.title.chars().count() > max_chars {
            let mut short: String = self.title.chars().take(max_chars).collect();
            short.push_str("...");
            short
        } else {
            self.title.clone()
        }
    }
}

/// Picker line format: `<decimal handle> - <title>`.
impl fmt::Display for WindowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.handle.raw(), self.title)
    }
}

/// A point in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A window bounding rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Whether the point lies inside the rectangle. All four edges count as inside.
    pub fn contains(&self, point: Point) -> bool {
        self.left <= point.x && point.x <= self.right && self.top <= point.y && point.y <= self.bottom
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display_is_hex() {
        assert_eq!(WindowHandle::from_raw(255).to_string(), "0xFF");
        assert_eq!(WindowHandle::from_raw(0x1A2B).raw(), 0x1A2B);
    }

    #[test]
    fn test_handle_serializes_as_number() {
        let json = serde_json::to_string(&WindowHandle::from_raw(200)).unwrap();
        assert_eq!(json, "200");
    }

    #[test]
    fn test_display_title_truncates_long_titles() {
        let long = "a".repeat(60);
        let entry = WindowEntry::new(WindowHandle::from_raw(1), long);
        let shown = entry.display_title(50);
        assert_eq!(shown.chars().count(), 53);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn test_display_title_keeps_short_titles() {
        let entry = WindowEntry::new(WindowHandle::from_raw(1), "Notepad");
        assert_eq!(entry.display_title(50), "Notepad");
    }

    #[test]
    fn test_display_title_respects_char_boundaries() {
        let entry = WindowEntry::new(WindowHandle::from_raw(1), "ääääää");
        assert_eq!(entry.display_title(3), "äää...");
    }

    #[test]
    fn test_entry_picker_line() {
        let entry = WindowEntry::new(WindowHandle::from_raw(200), "Calculator");
        assert_eq!(entry.to_string(), "200 - Calculator");
    }

    #[test]
    fn test_rect_contains_is_edge_inclusive() {
        let rect = Rect::new(0, 0, 100, 50);
        assert!(rect.contains(Point::new(0, 0)));
        assert!(rect.contains(Point::new(100, 50)));
        assert!(rect.contains(Point::new(50, 25)));
        assert!(!rect.contains(Point::new(101, 25)));
        assert!(!rect.contains(Point::new(50, -1)));
        assert_eq!(rect.width(), 100);
        assert_eq!(rect.height(), 50);
    }
}
