//! [`WindowSystem`] backed by user32 and DWM.

use crate::{has_ex_style, with_ex_style, EX_STYLE_LAYERED, EX_STYLE_TOPMOST};
use hover_core_effects::{
    PlatformError, Point, Rect, WindowEntry, WindowHandle, WindowSystem, ZOrder,
};
use std::ffi::c_void;
use tracing::{debug, trace};
use windows::Win32::Foundation::{BOOL, COLORREF, HWND, LPARAM, POINT, RECT};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_CLOAKED};
use windows::Win32::System::Threading::GetCurrentProcessId;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetCursorPos, GetWindowLongW, GetWindowRect, GetWindowTextLengthW,
    GetWindowTextW, GetWindowThreadProcessId, IsWindow, IsWindowVisible,
    SetLayeredWindowAttributes, SetWindowLongW, SetWindowPos, GWL_EXSTYLE, HWND_NOTOPMOST,
    HWND_TOPMOST, LWA_ALPHA, SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE,
    SWP_NOZORDER,
};

fn to_hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.raw() as usize as *mut c_void)
}

fn from_hwnd(hwnd: HWND) -> WindowHandle {
    WindowHandle::from_raw(hwnd.0 as usize as u64)
}

fn call_failed(call: &'static str, error: windows::core::Error) -> PlatformError {
    PlatformError::call_failed(call, error.message())
}

/// The live Windows desktop.
///
/// Holds no HWNDs itself, so it is `Send + Sync` and can be shared with the
/// monitor threads. Windows belonging to this process are never listed.
#[derive(Debug, Clone)]
pub struct Win32WindowSystem {
    own_process_id: u32,
}

impl Win32WindowSystem {
    pub fn new() -> Self {
        // SAFETY: no arguments, cannot fail.
        let own_process_id = unsafe { GetCurrentProcessId() };
        Self { own_process_id }
    }

    fn live(&self, handle: WindowHandle) -> Result<HWND, PlatformError> {
        if self.is_window(handle) {
            Ok(to_hwnd(handle))
        } else {
            Err(PlatformError::InvalidHandle(handle))
        }
    }

    fn ex_style(&self, handle: WindowHandle) -> Result<u32, PlatformError> {
        let hwnd = self.live(handle)?;
        // SAFETY: hwnd was validated above; reading a style has no side effects.
        Ok(unsafe { GetWindowLongW(hwnd, GWL_EXSTYLE) } as u32)
    }
}

impl Default for Win32WindowSystem {
    fn default() -> Self {
        Self::new()
    }
}

struct EnumContext {
    own_process_id: u32,
    entries: Vec<WindowEntry>,
}

/// `EnumWindows` callback collecting selectable windows into an [`EnumContext`].
unsafe extern "system" fn enum_window_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam points at the EnumContext owned by enumerate_windows,
    // which outlives the synchronous EnumWindows call.
    let context = unsafe { &mut *(lparam.0 as *mut EnumContext) };

    if let Some(title) = selectable_title(hwnd, context.own_process_id) {
        context.entries.push(WindowEntry::new(from_hwnd(hwnd), title));
    }

    BOOL(1)
}

/// Title of a window worth offering in the picker, or `None`.
fn selectable_title(hwnd: HWND, own_process_id: u32) -> Option<String> {
    // SAFETY: read-only queries on a handle handed to us by EnumWindows.
    unsafe {
        if !IsWindowVisible(hwnd).as_bool() {
            return None;
        }
        let mut process_id = 0u32;
        GetWindowThreadProcessId(hwnd, Some(&mut process_id as *mut u32));
        if process_id == own_process_id {
            return None;
        }
    }

    // Suspended UWP apps and windows on other virtual desktops report as
    // visible but are cloaked.
    if is_cloaked(hwnd) {
        return None;
    }

    let title = window_title(hwnd);
    if title.trim().is_empty() {
        None
    } else {
        Some(title)
    }
}

fn is_cloaked(hwnd: HWND) -> bool {
    let mut cloaked: u32 = 0;
    // SAFETY: the out pointer refers to a u32 of the size we pass.
    let result = unsafe {
        DwmGetWindowAttribute(
            hwnd,
            DWMWA_CLOAKED,
            &mut cloaked as *mut u32 as *mut c_void,
            std::mem::size_of::<u32>() as u32,
        )
    };
    result.is_ok() && cloaked != 0
}

fn window_title(hwnd: HWND) -> String {
    // SAFETY: the buffer is sized from GetWindowTextLengthW plus the terminator.
    unsafe {
        let length = GetWindowTextLengthW(hwnd);
        if length <= 0 {
            return String::new();
        }
        let mut buffer = vec![0u16; length as usize + 1];
        let copied = GetWindowTextW(hwnd, &mut buffer);
        String::from_utf16_lossy(&buffer[..copied.max(0) as usize])
    }
}

impl WindowSystem for Win32WindowSystem {
    fn enumerate_windows(&self) -> Result<Vec<WindowEntry>, PlatformError> {
        let mut context = EnumContext {
            own_process_id: self.own_process_id,
            entries: Vec::new(),
        };

        // SAFETY: the callback only touches the context, which lives on this
        // stack frame for the duration of the synchronous call.
        unsafe {
            EnumWindows(
                Some(enum_window_callback),
                LPARAM(&mut context as *mut EnumContext as isize),
            )
        }
        .map_err(|e| call_failed("EnumWindows", e))?;

        trace!("EnumWindows returned {} selectable windows", context.entries.len());
        Ok(context.entries)
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        if handle.raw() == 0 {
            return false;
        }
        // SAFETY: IsWindow accepts any value and only reports validity.
        unsafe { IsWindow(Some(to_hwnd(handle))).as_bool() }
    }

    fn set_z_order(&self, handle: WindowHandle, order: ZOrder) -> Result<(), PlatformError> {
        let hwnd = self.live(handle)?;
        let insert_after = match order {
            ZOrder::Topmost => HWND_TOPMOST,
            ZOrder::NotTopmost => HWND_NOTOPMOST,
        };

        // SAFETY: z-order only; no move, no resize, no activation.
        unsafe {
            SetWindowPos(
                hwnd,
                Some(insert_after),
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )
        }
        .map_err(|e| call_failed("SetWindowPos", e))
    }

    fn is_topmost(&self, handle: WindowHandle) -> Result<bool, PlatformError> {
        Ok(has_ex_style(self.ex_style(handle)?, EX_STYLE_TOPMOST))
    }

    fn is_layered(&self, handle: WindowHandle) -> Result<bool, PlatformError> {
        Ok(has_ex_style(self.ex_style(handle)?, EX_STYLE_LAYERED))
    }

    fn set_layered(&self, handle: WindowHandle, layered: bool) -> Result<(), PlatformError> {
        let current = self.ex_style(handle)?;
        let wanted = with_ex_style(current, EX_STYLE_LAYERED, layered);
        if wanted == current {
            return Ok(());
        }

        let hwnd = to_hwnd(handle);
        // SAFETY: only the extended style of a validated window is changed.
        unsafe {
            SetWindowLongW(hwnd, GWL_EXSTYLE, wanted as i32);
        }

        // SetWindowLongW returns the previous value, which can legitimately
        // be zero, so confirm by reading back instead.
        if has_ex_style(self.ex_style(handle)?, EX_STYLE_LAYERED) != layered {
            debug!("Window {} rejected layered={}", handle, layered);
            return Err(PlatformError::call_failed(
                "SetWindowLongW",
                "extended style did not change",
            ));
        }

        if !layered {
            // SAFETY: redraw request; geometry and z-order are left alone.
            let _ = unsafe {
                SetWindowPos(
                    hwnd,
                    None,
                    0,
                    0,
                    0,
                    0,
                    SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE | SWP_FRAMECHANGED,
                )
            };
        }
        Ok(())
    }

    fn set_alpha(&self, handle: WindowHandle, alpha: u8) -> Result<(), PlatformError> {
        let hwnd = self.live(handle)?;
        // SAFETY: window was validated; alpha-only blending.
        unsafe { SetLayeredWindowAttributes(hwnd, COLORREF(0), alpha, LWA_ALPHA) }
            .map_err(|e| call_failed("SetLayeredWindowAttributes", e))
    }

    fn cursor_position(&self) -> Result<Point, PlatformError> {
        let mut point = POINT::default();
        // SAFETY: writes into a local POINT.
        unsafe { GetCursorPos(&mut point) }.map_err(|e| call_failed("GetCursorPos", e))?;
        Ok(Point::new(point.x, point.y))
    }

    fn window_rect(&self, handle: WindowHandle) -> Result<Rect, PlatformError> {
        let hwnd = self.live(handle)?;
        let mut rect = RECT::default();
        // SAFETY: writes into a local RECT.
        unsafe { GetWindowRect(hwnd, &mut rect) }.map_err(|e| call_failed("GetWindowRect", e))?;
        Ok(Rect::new(rect.left, rect.top, rect.right, rect.bottom))
    }
}
