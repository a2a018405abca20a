//! System tray icon for the Hover daemon.
//!
//! The icon lives on its own thread, which runs a Win32 message loop.
//! The context menu offers:
//! - Release the active window
//! - Quit

use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, info, warn};
use tray_icon::{
    menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem},
    TrayIcon, TrayIconBuilder,
};
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, TranslateMessage, MSG,
    PM_NOREMOVE, WM_APP, WM_QUIT,
};

/// Thread message asking the tray thread to re-read the tooltip.
const WM_TRAY_TOOLTIP: u32 = WM_APP + 1;

/// Menu item IDs for tray context menu.
mod menu_ids {
    pub const RELEASE: &str = "release";
    pub const QUIT: &str = "quit";
}

/// Events emitted by the tray icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayEvent {
    /// User clicked "Release Window".
    Release,
    /// User clicked "Quit".
    Quit,
}

fn event_for_menu_id(id: &str) -> Option<TrayEvent> {
    match id {
        menu_ids::RELEASE => Some(TrayEvent::Release),
        menu_ids::QUIT => Some(TrayEvent::Quit),
        _ => None,
    }
}

/// Owns the tray thread. Dropping it removes the icon.
pub struct TrayManager {
    thread_id: u32,
    tooltip: Arc<Mutex<String>>,
    thread: Option<JoinHandle<()>>,
}

impl TrayManager {
    /// Create the tray icon and its context menu.
    ///
    /// Menu clicks are delivered to `event_sender` as [`TrayEvent`]s.
    pub fn new(event_sender: mpsc::Sender<TrayEvent>, tooltip: &str) -> Result<Self, TrayError> {
        let tooltip = Arc::new(Mutex::new(tooltip.to_string()));
        let thread_tooltip = Arc::clone(&tooltip);
        let (init_tx, init_rx) = mpsc::channel::<Result<u32, TrayError>>();

        let thread = std::thread::Builder::new()
            .name("tray".to_string())
            .spawn(move || run_tray_thread(thread_tooltip, init_tx))
            .map_err(|e| TrayError::Thread(e.to_string()))?;

        let thread_id = init_rx
            .recv()
            .map_err(|_| TrayError::Thread("Tray thread init failed".to_string()))??;

        // The handler owns the sender; it is dropped again in Drop so the
        // forwarding thread on the other end can exit.
        MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
            match event_for_menu_id(event.id.0.as_str()) {
                Some(tray_event) => {
                    let _ = event_sender.send(tray_event);
                }
                None => debug!("Unknown menu item clicked: {}", event.id.0),
            }
        }));

        info!("System tray icon created");

        Ok(Self {
            thread_id,
            tooltip,
            thread: Some(thread),
        })
    }

    /// Replace the tooltip text.
    pub fn set_tooltip(&self, text: &str) {
        if let Ok(mut tooltip) = self.tooltip.lock() {
            if *tooltip == text {
                return;
            }
            *tooltip = text.to_string();
        }
        // SAFETY: posting to a thread whose queue was created before init returned.
        if let Err(e) =
            unsafe { PostThreadMessageW(self.thread_id, WM_TRAY_TOOLTIP, WPARAM(0), LPARAM(0)) }
        {
            debug!("Failed to post tooltip update: {}", e);
        }
    }
}

impl Drop for TrayManager {
    fn drop(&mut self) {
        MenuEvent::set_event_handler(None::<fn(MenuEvent)>);
        // SAFETY: see set_tooltip.
        let _ = unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        debug!("System tray icon removed");
    }
}

fn run_tray_thread(tooltip: Arc<Mutex<String>>, init_tx: mpsc::Sender<Result<u32, TrayError>>) {
    let mut msg = MSG::default();
    // SAFETY: forces creation of this thread's message queue so
    // PostThreadMessageW cannot race the first GetMessageW.
    unsafe {
        let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
    }

    let initial = tooltip.lock().map(|t| t.clone()).unwrap_or_default();
    let tray = match build_tray(&initial) {
        Ok(tray) => tray,
        Err(e) => {
            let _ = init_tx.send(Err(e));
            return;
        }
    };

    // SAFETY: no arguments.
    let thread_id = unsafe { GetCurrentThreadId() };
    let _ = init_tx.send(Ok(thread_id));

    loop {
        // SAFETY: msg is a valid MSG owned by this frame.
        let result = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        if result.0 <= 0 {
            break;
        }
        if msg.hwnd.is_invalid() && msg.message == WM_TRAY_TOOLTIP {
            if let Ok(text) = tooltip.lock() {
                if let Err(e) = tray.set_tooltip(Some(text.as_str())) {
                    warn!("Failed to update tray tooltip: {}", e);
                }
            }
            continue;
        }
        // SAFETY: standard dispatch of a message retrieved above.
        unsafe {
            let _ = TranslateMessage(&msg);
            let _ = DispatchMessageW(&msg);
        }
    }

    drop(tray);
}

fn build_tray(tooltip: &str) -> Result<TrayIcon, TrayError> {
    let menu = Menu::new();

    // Title item (disabled)
    let title = MenuItem::new("Hover", false, None);
    menu.append(&title).map_err(|e| TrayError::Menu(e.to_string()))?;

    menu.append(&PredefinedMenuItem::separator())
        .map_err(|e| TrayError::Menu(e.to_string()))?;

    let release = MenuItem::with_id(menu_ids::RELEASE, "Release Window", true, None);
    menu.append(&release).map_err(|e| TrayError::Menu(e.to_string()))?;

    menu.append(&PredefinedMenuItem::separator())
        .map_err(|e| TrayError::Menu(e.to_string()))?;

    let quit = MenuItem::with_id(menu_ids::QUIT, "Quit", true, None);
    menu.append(&quit).map_err(|e| TrayError::Menu(e.to_string()))?;

    let icon = create_default_icon()?;

    TrayIconBuilder::new()
        .with_menu(Box::new(menu))
        .with_tooltip(tooltip)
        .with_icon(icon)
        .build()
        .map_err(|e| TrayError::Build(e.to_string()))
}

/// Create the tray icon image: a translucent disc with an opaque core.
fn create_default_icon() -> Result<tray_icon::Icon, TrayError> {
    const SIZE: usize = 32;
    let mut rgba = vec![0u8; SIZE * SIZE * 4];

    let (r, g, b) = (94u8, 129u8, 172u8);

    let center = SIZE as f32 / 2.0;
    let outer = center - 2.0;
    let inner = outer / 2.0;

    for y in 0..SIZE {
        for x in 0..SIZE {
            let idx = (y * SIZE + x) * 4;
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            let dist = (dx * dx + dy * dy).sqrt();

            let alpha = if dist < inner {
                255
            } else if dist < outer {
                128
            } else if dist < outer + 1.5 {
                // Anti-aliased edge
                ((outer + 1.5 - dist) / 1.5 * 128.0) as u8
            } else {
                0
            };

            if alpha > 0 {
                rgba[idx] = r;
                rgba[idx + 1] = g;
                rgba[idx + 2] = b;
                rgba[idx + 3] = alpha;
            }
        }
    }

    tray_icon::Icon::from_rgba(rgba, SIZE as u32, SIZE as u32)
        .map_err(|e| TrayError::Icon(e.to_string()))
}

/// Errors that can occur during tray operations.
#[derive(Debug, Error)]
pub enum TrayError {
    #[error("Failed to create menu: {0}")]
    Menu(String),

    #[error("Failed to build tray icon: {0}")]
    Build(String),

    #[error("Failed to create icon: {0}")]
    Icon(String),

    #[error("Tray thread failed: {0}")]
    Thread(String),
}
