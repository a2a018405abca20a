//! Hover Platform Win32
//!
//! Windows implementation of the effect core's [`WindowSystem`] seam.
//!
//! This crate handles:
//! - Enumerating visible, titled top-level windows (skipping DWM-cloaked ones)
//! - Z-order placement via SetWindowPos
//! - Layered-window transparency via SetLayeredWindowAttributes
//! - Cursor position and window bounds for hover detection
//! - Per-monitor DPI awareness so both are in the same coordinate space
//!
//! The Win32 code only builds on Windows. The extended-style helpers below
//! are plain bit arithmetic and are available everywhere.
//!
//! [`WindowSystem`]: hover_core_effects::WindowSystem

#[cfg(windows)]
mod window_system;

#[cfg(windows)]
pub use window_system::Win32WindowSystem;

/// `WS_EX_TOPMOST` extended window style bit.
pub const EX_STYLE_TOPMOST: u32 = 0x0000_0008;

/// `WS_EX_LAYERED` extended window style bit.
pub const EX_STYLE_LAYERED: u32 = 0x0008_0000;

/// Whether `bit` is set in an extended style value.
pub fn has_ex_style(ex_style: u32, bit: u32) -> bool {
    ex_style & bit == bit
}

/// Extended style value with `bit` set or cleared, other bits untouched.
pub fn with_ex_style(ex_style: u32, bit: u32, enabled: bool) -> u32 {
    if enabled {
        ex_style | bit
    } else {
        ex_style & !bit
    }
}

/// Opt into Per-Monitor DPI Awareness V2.
///
/// Must run before any window or cursor coordinates are read, otherwise
/// GetCursorPos and GetWindowRect can disagree on scaled monitors.
/// Returns `false` if the call failed (for example when awareness was
/// already set by a manifest).
#[cfg(windows)]
pub fn set_dpi_awareness() -> bool {
    use windows::Win32::UI::HiDpi::{
        SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
    };

    // SAFETY: process-wide setting with no pointer arguments.
    unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2).is_ok() }
}

/// Put a window back to normal (not topmost, opaque) without any shared state.
///
/// Used from the daemon's panic hook, where the controller may be poisoned
/// or mid-operation.
#[cfg(windows)]
pub fn emergency_restore(handle: hover_core_effects::WindowHandle) -> bool {
    use hover_core_effects::EffectDriver;
    use std::sync::Arc;

    EffectDriver::new(Arc::new(Win32WindowSystem::new())).restore_to_normal(handle)
}
