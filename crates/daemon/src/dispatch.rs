//! Translation between IPC commands and the selection controller.
//!
//! [`App`] is owned by the daemon event loop. It is generic over the window
//! system so the whole command surface can be exercised against the
//! in-memory desktop.

use hover_core_effects::{
    MonitorNotice, SelectionController, SelectionError, StopReason, WindowEntry, WindowHandle,
    WindowSystem,
};
use hover_ipc::{IpcCommand, IpcResponse, WindowSummary};
use regex::RegexBuilder;
use tracing::{debug, info, warn};

/// Daemon-side application state.
pub struct App<W: WindowSystem> {
    controller: SelectionController<W>,
    /// Window list as last shown to the user.
    windows: Vec<WindowEntry>,
    /// Latest monitor notice, until the user has seen it via `status`.
    last_notice: Option<String>,
    title_max_chars: usize,
}

impl<W: WindowSystem> App<W> {
    pub fn new(controller: SelectionController<W>, title_max_chars: usize) -> Self {
        Self {
            controller,
            windows: Vec::new(),
            last_notice: None,
            title_max_chars,
        }
    }

    pub fn controller(&self) -> &SelectionController<W> {
        &self.controller
    }

    /// Cached window list from the last refresh.
    pub fn windows(&self) -> &[WindowEntry] {
        &self.windows
    }

    /// Re-enumerate windows into the cache.
    pub fn refresh_windows(&mut self) -> Result<&[WindowEntry], String> {
        match self.controller.refresh() {
            Ok(windows) => {
                debug!("Window list refreshed: {} entries", windows.len());
                self.windows = windows;
                Ok(&self.windows)
            }
            Err(e) => {
                warn!("Failed to enumerate windows: {}", e);
                Err(format!("Failed to enumerate windows: {}", e))
            }
        }
    }

    /// Execute a command and build the response sent back to the client.
    pub fn handle_command(&mut self, cmd: IpcCommand) -> IpcResponse {
        debug!("Handling command: {:?}", cmd);
        let max_chars = self.title_max_chars;
        match cmd {
            IpcCommand::ListWindows => match self.refresh_windows() {
                Ok(windows) => IpcResponse::WindowList {
                    windows: windows
                        .iter()
                        .map(|entry| WindowSummary {
                            handle: entry.handle.raw(),
                            title: entry.display_title(max_chars),
                        })
                        .collect(),
                },
                Err(message) => IpcResponse::error(message),
            },

            IpcCommand::Select { handle } => self.select(WindowHandle::from_raw(handle)),

            IpcCommand::SelectByTitle { pattern } => self.select_by_title(&pattern),

            IpcCommand::Deselect => {
                let result = self.controller.deselect();
                self.respond(result, || "Selection cleared".to_string())
            }

            IpcCommand::SetTopmost { enabled } => {
                let result = self.controller.toggle_topmost(enabled);
                self.respond(result, || format!("Always on top {}", on_off(enabled)))
            }

            IpcCommand::SetHover { enabled } => {
                let result = self.controller.toggle_hover(enabled);
                self.respond(result, || format!("Hover effect {}", on_off(enabled)))
            }

            IpcCommand::SetTransparency { level } => {
                let result = self.controller.set_transparency_level(level);
                self.respond(result, || format!("Transparency set to {}", level))
            }

            IpcCommand::QueryState => self.query_state(),

            // The event loop shuts down after the response is written.
            IpcCommand::Stop => IpcResponse::Ok,
        }
    }

    /// Apply a monitor notice and return the message to show the user.
    ///
    /// The message stays pending (tray tooltip, next `QueryState`) until
    /// it has been reported once.
    pub fn handle_notice(&mut self, notice: &MonitorNotice) -> String {
        let message = notice.to_string();
        warn!("{}", message);
        let current = self.controller.selected() == Some(notice.handle);
        self.controller.handle_notice(notice);
        if current && notice.reason != StopReason::Released {
            self.last_notice = Some(message.clone());
        }
        if notice.reason == StopReason::WindowGone {
            let _ = self.refresh_windows();
        }
        message
    }

    /// Notice waiting to be reported, if any.
    pub fn pending_notice(&self) -> Option<&str> {
        self.last_notice.as_deref()
    }

    /// Tray tooltip describing the active window and any pending notice.
    pub fn tooltip(&self) -> String {
        let status = self.selection_tooltip();
        match &self.last_notice {
            Some(notice) => format!("{}\n{}", status, notice),
            None => status,
        }
    }

    fn selection_tooltip(&self) -> String {
        match self.controller.selected() {
            Some(handle) => {
                let title = self
                    .controller
                    .registry()
                    .title_of(handle)
                    .map(|title| shorten(&title, self.title_max_chars))
                    .unwrap_or_else(|| handle.to_string());
                format!("Hover - {}", title)
            }
            None => "Hover - no window selected".to_string(),
        }
    }

    pub fn shutdown(&mut self) {
        self.controller.shutdown();
    }

    fn select(&mut self, handle: WindowHandle) -> IpcResponse {
        match self.controller.select(handle) {
            Ok(()) => {
                info!("Window {} selected via IPC", handle);
                self.last_notice = None;
                IpcResponse::Ok
            }
            Err(SelectionError::WindowGone(gone)) => {
                // The user picked from a stale list.
                let _ = self.refresh_windows();
                IpcResponse::error(format!(
                    "Window {} no longer exists; the window list has been refreshed",
                    gone
                ))
            }
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    fn select_by_title(&mut self, pattern: &str) -> IpcResponse {
        let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(regex) => regex,
            Err(e) => return IpcResponse::error(format!("Invalid title pattern: {}", e)),
        };

        if let Err(message) = self.refresh_windows() {
            return IpcResponse::error(message);
        }

        let found = self
            .windows
            .iter()
            .find(|entry| regex.is_match(&entry.title))
            .map(|entry| entry.handle);

        match found {
            Some(handle) => self.select(handle),
            None => IpcResponse::error(format!("No window title matches {:?}", pattern)),
        }
    }

    fn query_state(&mut self) -> IpcResponse {
        let state = self.controller.state();
        IpcResponse::State {
            selected: state.selected.map(WindowHandle::raw),
            title: state
                .selected
                .and_then(|handle| self.controller.registry().title_of(handle)),
            always_on_top: state.always_on_top,
            hover_enabled: state.hover_enabled,
            transparency: state.resting_level,
            active_monitors: self.controller.active_pollers(),
            last_notice: self.last_notice.take(),
        }
    }

    /// Map a controller result onto the wire.
    ///
    /// Platform failures on a live window are warnings: the command was
    /// accepted but did not take effect.
    fn respond(
        &mut self,
        result: Result<(), SelectionError>,
        success: impl FnOnce() -> String,
    ) -> IpcResponse {
        match result {
            Ok(()) => {
                info!("{}", success());
                IpcResponse::Ok
            }
            Err(SelectionError::EffectFailed(message)) => {
                warn!("{}", message);
                IpcResponse::warning(message)
            }
            Err(e @ SelectionError::WindowGone(_)) => {
                let _ = self.refresh_windows();
                IpcResponse::error(e.to_string())
            }
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

fn shorten(title: &str, max_chars: usize) -> String {
    WindowEntry::new(WindowHandle::from_raw(0), title).display_title(max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hover_core_effects::testing::FakeWindowSystem;
    use hover_core_effects::{MonitorConfig, MonitorKind, Point, Rect, RetryPolicy};
    use std::sync::Arc;
    use std::time::Duration;

    const NOTEPAD: u64 = 100;
    const CALC: u64 = 200;

    fn test_app() -> (Arc<FakeWindowSystem>, App<FakeWindowSystem>) {
        let system = Arc::new(FakeWindowSystem::new());
        system.add_window(
            WindowHandle::from_raw(NOTEPAD),
            "Untitled - Notepad",
            Rect::new(0, 0, 400, 300),
        );
        system.add_window(
            WindowHandle::from_raw(CALC),
            "Calculator",
            Rect::new(500, 0, 800, 300),
        );
        let config = MonitorConfig {
            topmost_interval: Duration::from_millis(5),
            topmost_retry: RetryPolicy::immediate(3),
            hover_interval: Duration::from_millis(5),
            hover_error_interval: Duration::from_millis(5),
            ..MonitorConfig::default()
        };
        let controller = SelectionController::new(Arc::clone(&system), config);
        (system, App::new(controller, 12))
    }

    #[test]
    fn test_cmd_list_windows_sorted_and_shortened() {
        let (_system, mut app) = test_app();
        match app.handle_command(IpcCommand::ListWindows) {
            IpcResponse::WindowList { windows } => {
                assert_eq!(windows.len(), 2);
                assert_eq!(windows[0].handle, CALC);
                assert_eq!(windows[0].title, "Calculator");
                assert_eq!(windows[1].title, "Untitled - N...");
            }
            other => panic!("Expected WindowList, got {:?}", other),
        }
        assert_eq!(app.windows().len(), 2);
    }

    #[test]
    fn test_cmd_select_and_query_state() {
        let (_system, mut app) = test_app();
        assert_eq!(app.handle_command(IpcCommand::Select { handle: CALC }), IpcResponse::Ok);

        match app.handle_command(IpcCommand::QueryState) {
            IpcResponse::State {
                selected,
                title,
                always_on_top,
                hover_enabled,
                transparency,
                active_monitors,
                last_notice,
            } => {
                assert_eq!(selected, Some(CALC));
                assert_eq!(title.as_deref(), Some("Calculator"));
                assert!(!always_on_top);
                assert!(!hover_enabled);
                assert_eq!(transparency, 255);
                assert_eq!(active_monitors, 0);
                assert_eq!(last_notice, None);
            }
            other => panic!("Expected State, got {:?}", other),
        }
    }

    #[test]
    fn test_cmd_select_gone_window_refreshes_list() {
        let (system, mut app) = test_app();
        app.handle_command(IpcCommand::ListWindows);
        system.close_window(WindowHandle::from_raw(NOTEPAD));

        let resp = app.handle_command(IpcCommand::Select { handle: NOTEPAD });
        assert!(matches!(resp, IpcResponse::Error { .. }));
        assert_eq!(app.windows().len(), 1);
        assert_eq!(app.controller().selected(), None);
    }

    #[test]
    fn test_cmd_select_by_title() {
        let (_system, mut app) = test_app();
        let resp = app.handle_command(IpcCommand::SelectByTitle {
            pattern: "notepad$".to_string(),
        });
        assert_eq!(resp, IpcResponse::Ok);
        assert_eq!(
            app.controller().selected(),
            Some(WindowHandle::from_raw(NOTEPAD))
        );
    }

    #[test]
    fn test_cmd_select_by_title_errors() {
        let (_system, mut app) = test_app();
        let no_match = app.handle_command(IpcCommand::SelectByTitle {
            pattern: "Paint".to_string(),
        });
        assert!(matches!(no_match, IpcResponse::Error { .. }));

        let bad_regex = app.handle_command(IpcCommand::SelectByTitle {
            pattern: "(".to_string(),
        });
        match bad_regex {
            IpcResponse::Error { message } => assert!(message.contains("Invalid title pattern")),
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_cmd_toggles_without_selection() {
        let (_system, mut app) = test_app();
        for cmd in [
            IpcCommand::SetTopmost { enabled: true },
            IpcCommand::SetHover { enabled: true },
            IpcCommand::SetTransparency { level: 100 },
        ] {
            assert_eq!(
                app.handle_command(cmd),
                IpcResponse::error("No window is selected")
            );
        }
    }

    #[test]
    fn test_cmd_topmost_and_hover() {
        let (system, mut app) = test_app();
        system.move_cursor(Point::new(1000, 1000));
        app.handle_command(IpcCommand::Select { handle: CALC });

        assert_eq!(
            app.handle_command(IpcCommand::SetTopmost { enabled: true }),
            IpcResponse::Ok
        );
        assert!(system.topmost_of(WindowHandle::from_raw(CALC)));
        assert_eq!(
            app.handle_command(IpcCommand::SetHover { enabled: true }),
            IpcResponse::Ok
        );
        assert!(app.controller().is_monitor_running(MonitorKind::Hover));

        app.handle_command(IpcCommand::Deselect);
        assert!(!system.topmost_of(WindowHandle::from_raw(CALC)));
        assert_eq!(app.controller().active_pollers(), 0);
    }

    #[test]
    fn test_cmd_effect_failure_is_warning() {
        let (system, mut app) = test_app();
        app.handle_command(IpcCommand::Select { handle: CALC });
        system.fail_z_order(WindowHandle::from_raw(CALC), 100);

        let resp = app.handle_command(IpcCommand::SetTopmost { enabled: true });
        assert!(matches!(resp, IpcResponse::Warning { .. }));
        assert_eq!(app.controller().selected(), Some(WindowHandle::from_raw(CALC)));
    }

    #[test]
    fn test_cmd_transparency() {
        let (system, mut app) = test_app();
        app.handle_command(IpcCommand::Select { handle: NOTEPAD });
        assert_eq!(
            app.handle_command(IpcCommand::SetTransparency { level: 128 }),
            IpcResponse::Ok
        );
        assert_eq!(system.alpha_of(WindowHandle::from_raw(NOTEPAD)), Some(128));
    }

    #[test]
    fn test_cmd_stop() {
        let (_system, mut app) = test_app();
        assert_eq!(app.handle_command(IpcCommand::Stop), IpcResponse::Ok);
    }

    #[test]
    fn test_window_gone_notice_clears_selection() {
        let (system, mut app) = test_app();
        app.handle_command(IpcCommand::Select { handle: CALC });
        system.close_window(WindowHandle::from_raw(CALC));

        let message = app.handle_notice(&MonitorNotice {
            kind: MonitorKind::Topmost,
            handle: WindowHandle::from_raw(CALC),
            reason: StopReason::WindowGone,
        });
        assert_eq!(message, "Window 0xC8 was closed");
        assert_eq!(app.controller().selected(), None);
        assert_eq!(app.windows().len(), 1);
    }

    #[test]
    fn test_budget_notice_reaches_tooltip_and_status_once() {
        let (system, mut app) = test_app();
        system.move_cursor(Point::new(1000, 1000));
        app.handle_command(IpcCommand::Select { handle: CALC });
        app.handle_command(IpcCommand::SetTopmost { enabled: true });

        let message = app.handle_notice(&MonitorNotice {
            kind: MonitorKind::Topmost,
            handle: WindowHandle::from_raw(CALC),
            reason: StopReason::BudgetExhausted,
        });
        assert!(message.contains("is not responding"));
        assert!(!app.controller().state().always_on_top);
        assert_eq!(app.pending_notice(), Some(message.as_str()));
        assert_eq!(app.tooltip(), format!("Hover - Calculator\n{}", message));

        match app.handle_command(IpcCommand::QueryState) {
            IpcResponse::State { last_notice, .. } => {
                assert_eq!(last_notice.as_deref(), Some(message.as_str()));
            }
            other => panic!("Expected State, got {:?}", other),
        }
        assert_eq!(app.pending_notice(), None);
        assert_eq!(app.tooltip(), "Hover - Calculator");

        match app.handle_command(IpcCommand::QueryState) {
            IpcResponse::State { last_notice, .. } => assert_eq!(last_notice, None),
            other => panic!("Expected State, got {:?}", other),
        }
    }

    #[test]
    fn test_notice_for_other_window_is_not_reported() {
        let (_system, mut app) = test_app();
        app.handle_command(IpcCommand::Select { handle: CALC });

        app.handle_notice(&MonitorNotice {
            kind: MonitorKind::Hover,
            handle: WindowHandle::from_raw(NOTEPAD),
            reason: StopReason::BudgetExhausted,
        });
        assert_eq!(app.pending_notice(), None);
        assert_eq!(app.controller().selected(), Some(WindowHandle::from_raw(CALC)));
    }

    #[test]
    fn test_selecting_clears_pending_notice() {
        let (system, mut app) = test_app();
        app.handle_command(IpcCommand::Select { handle: CALC });
        system.close_window(WindowHandle::from_raw(CALC));
        app.handle_notice(&MonitorNotice {
            kind: MonitorKind::Topmost,
            handle: WindowHandle::from_raw(CALC),
            reason: StopReason::WindowGone,
        });
        assert_eq!(app.tooltip(), "Hover - no window selected\nWindow 0xC8 was closed");

        app.handle_command(IpcCommand::Select { handle: NOTEPAD });
        assert_eq!(app.pending_notice(), None);
    }

    #[test]
    fn test_tooltip() {
        let (_system, mut app) = test_app();
        assert_eq!(app.tooltip(), "Hover - no window selected");

        app.handle_command(IpcCommand::Select { handle: NOTEPAD });
        assert_eq!(app.tooltip(), "Hover - Untitled - N...");
    }

    #[test]
    fn test_shutdown_then_commands_fail() {
        let (_system, mut app) = test_app();
        app.handle_command(IpcCommand::Select { handle: CALC });
        app.shutdown();

        let resp = app.handle_command(IpcCommand::Select { handle: NOTEPAD });
        assert!(matches!(resp, IpcResponse::Error { .. }));
    }
}
