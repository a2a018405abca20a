//! Hover IPC Protocol
//!
//! Shared types for daemon-CLI communication over a Windows named pipe.
//! Each connection carries one command line of JSON and one response line.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named pipe path for IPC communication.
pub const PIPE_NAME: &str = r"\\.\pipe\hover";

/// Upper bound for a single command or response line, in bytes.
pub const MAX_IPC_MESSAGE_SIZE: usize = 64 * 1024;

/// Commands that can be sent from the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    /// Re-enumerate and list selectable windows.
    ListWindows,

    /// Make a window the active selection.
    Select {
        /// Raw window handle.
        handle: u64,
    },

    /// Select the first window (in list order) whose title matches a regex.
    SelectByTitle { pattern: String },

    /// Revert the active window and clear the selection.
    Deselect,

    /// Turn always-on-top on or off for the active window.
    SetTopmost { enabled: bool },

    /// Turn the hover effect on or off for the active window.
    SetHover { enabled: bool },

    /// Set the resting transparency (0 = invisible, 255 = opaque).
    SetTransparency { level: u8 },

    /// Query the current selection and effect state.
    QueryState,

    /// Stop the daemon.
    Stop,
}

/// A window as listed to the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub handle: u64,
    pub title: String,
}

/// Responses from the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Command executed successfully.
    Ok,
    /// Command executed, but something the user should know about happened.
    Warning { message: String },
    /// Command failed with an error.
    Error {
        /// Error message describing what went wrong.
        message: String,
    },
    /// Selectable windows, sorted by title.
    WindowList { windows: Vec<WindowSummary> },
    /// Selection and effect state.
    State {
        /// Active window handle, if any.
        selected: Option<u64>,
        /// Title of the active window at query time.
        title: Option<String>,
        always_on_top: bool,
        hover_enabled: bool,
        /// Resting transparency level.
        transparency: u8,
        /// Number of live monitor threads.
        active_monitors: usize,
        /// Monitor notice not yet reported to the user.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_notice: Option<String>,
    },
}

impl IpcResponse {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Create a warning response.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }
}

/// Serialize a message as one protocol line (JSON plus `\n`).
pub fn encode_line<T: Serialize>(message: &T) -> serde_json::Result<String> {
    serde_json::to_string(message).map(|json| json + "\n")
}

/// Errors from [`parse_selection`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionParseError {
    #[error("No window selected")]
    Empty,

    #[error("Invalid window handle: {0:?}")]
    Invalid(String),
}

/// Parse a user-supplied window selection into a raw handle.
///
/// Accepts a decimal handle (`"200"`), a hex handle (`"0xC8"`), or a picker
/// line as printed by `list` (`"200 - Calculator"`).
pub fn parse_selection(input: &str) -> Result<u64, SelectionParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SelectionParseError::Empty);
    }

    let handle_part = match input.split_once(" - ") {
        Some((handle, _title)) => handle.trim(),
        None => input,
    };

    let parsed = match handle_part
        .strip_prefix("0x")
        .or_else(|| handle_part.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => handle_part.parse::<u64>(),
    };

    match parsed {
        Ok(0) | Err(_) => Err(SelectionParseError::Invalid(handle_part.to_string())),
        Ok(handle) => Ok(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialization() {
        let cmd = IpcCommand::ListWindows;
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"list_windows"}"#);

        let cmd2: IpcCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, cmd2);
    }

    #[test]
    fn test_select_command_wire_format() {
        let cmd: IpcCommand = serde_json::from_str(r#"{"type":"select","handle":200}"#).unwrap();
        assert_eq!(cmd, IpcCommand::Select { handle: 200 });

        let json = serde_json::to_string(&IpcCommand::SetTransparency { level: 128 }).unwrap();
        assert_eq!(json, r#"{"type":"set_transparency","level":128}"#);
    }

    #[test]
    fn test_transparency_out_of_range_is_rejected() {
        let result: Result<IpcCommand, _> =
            serde_json::from_str(r#"{"type":"set_transparency","level":256}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_state_response_serialization() {
        let resp = IpcResponse::State {
            selected: Some(200),
            title: Some("Calculator".to_string()),
            always_on_top: true,
            hover_enabled: false,
            transparency: 255,
            active_monitors: 1,
            last_notice: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""status":"state""#));
        assert!(json.contains(r#""selected":200"#));
        assert!(!json.contains("last_notice"));

        let resp2: IpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, resp2);
    }

    #[test]
    fn test_window_list_serialization() {
        let resp = IpcResponse::WindowList {
            windows: vec![WindowSummary {
                handle: 100,
                title: "Notepad".to_string(),
            }],
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("window_list"));
        assert!(json.contains(r#""title":"Notepad""#));
    }

    #[test]
    fn test_error_and_warning_helpers() {
        assert_eq!(
            IpcResponse::error("boom"),
            IpcResponse::Error {
                message: "boom".to_string()
            }
        );
        assert_eq!(
            IpcResponse::warning("careful"),
            IpcResponse::Warning {
                message: "careful".to_string()
            }
        );
    }

    #[test]
    fn test_encode_line_is_single_line() {
        let line = encode_line(&IpcCommand::SelectByTitle {
            pattern: "Note.*".to_string(),
        })
        .unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let parsed: IpcCommand = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(
            parsed,
            IpcCommand::SelectByTitle {
                pattern: "Note.*".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_json_handling() {
        let result: Result<IpcCommand, _> = serde_json::from_str("not valid json");
        assert!(result.is_err());

        let result: Result<IpcCommand, _> = serde_json::from_str(r#"{"type": "unknown_command"}"#);
        assert!(result.is_err());

        let result: Result<IpcResponse, _> = serde_json::from_str(r#"{"status": "invalid"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_pipe_name_format() {
        assert!(PIPE_NAME.starts_with(r"\\.\pipe\"));
        assert_eq!(PIPE_NAME, r"\\.\pipe\hover");
    }

    // ========================================================================
    // parse_selection
    // ========================================================================

    #[test]
    fn test_parse_selection_decimal() {
        assert_eq!(parse_selection("200"), Ok(200));
        assert_eq!(parse_selection("  200 "), Ok(200));
    }

    #[test]
    fn test_parse_selection_hex() {
        assert_eq!(parse_selection("0xC8"), Ok(200));
        assert_eq!(parse_selection("0Xc8"), Ok(200));
    }

    #[test]
    fn test_parse_selection_picker_line() {
        assert_eq!(parse_selection("200 - Calculator"), Ok(200));
        assert_eq!(parse_selection("100 - Notes - Notepad"), Ok(100));
    }

    #[test]
    fn test_parse_selection_rejects_garbage() {
        assert_eq!(parse_selection(""), Err(SelectionParseError::Empty));
        assert_eq!(parse_selection("   "), Err(SelectionParseError::Empty));
        assert_eq!(
            parse_selection("Calculator"),
            Err(SelectionParseError::Invalid("Calculator".to_string()))
        );
        assert!(parse_selection("0xZZ").is_err());
        assert!(parse_selection("-5").is_err());
        assert!(parse_selection("0").is_err());
    }
}
