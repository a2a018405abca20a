//! Hover CLI
//!
//! Command-line window picker and effect controls for the Hover daemon.
//!
//! Commands are sent to the daemon via IPC (named pipe).

#![cfg_attr(not(windows), allow(dead_code))]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hover_ipc::{parse_selection, IpcCommand, IpcResponse};

#[derive(Parser, Debug)]
#[command(name = "hover-cli")]
#[command(author, version, about = "Pin, fade and hover-reveal any window")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// List selectable windows as "<handle> - <title>"
    List,
    /// Make a window the active selection
    Select {
        /// Handle (decimal or 0x hex) or a line printed by `list`
        #[arg(required_unless_present = "title", conflicts_with = "title")]
        selection: Option<String>,
        /// Select the first listed window whose title matches this regex
        #[arg(short, long)]
        title: Option<String>,
    },
    /// Revert the active window and clear the selection
    Release,
    /// Keep the active window above all others
    Topmost { state: Toggle },
    /// Fade the active window out unless the cursor is over it
    Hover { state: Toggle },
    /// Set resting transparency (0 = invisible, 255 = opaque)
    Transparency { level: u8 },
    /// Show the selection and effect state
    Status,
    /// Stop the daemon
    Stop,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        self == Toggle::On
    }
}

/// Map a parsed subcommand onto the wire command.
fn to_ipc_command(command: Commands) -> Result<IpcCommand> {
    Ok(match command {
        Commands::List => IpcCommand::ListWindows,
        Commands::Select {
            title: Some(pattern),
            ..
        } => IpcCommand::SelectByTitle { pattern },
        Commands::Select {
            selection: Some(selection),
            ..
        } => IpcCommand::Select {
            handle: parse_selection(&selection)?,
        },
        Commands::Select { .. } => bail!("Either a window or --title is required"),
        Commands::Release => IpcCommand::Deselect,
        Commands::Topmost { state } => IpcCommand::SetTopmost {
            enabled: state.enabled(),
        },
        Commands::Hover { state } => IpcCommand::SetHover {
            enabled: state.enabled(),
        },
        Commands::Transparency { level } => IpcCommand::SetTransparency { level },
        Commands::Status => IpcCommand::QueryState,
        Commands::Stop => IpcCommand::Stop,
    })
}

/// Render a response for the terminal. Errors are returned as `Err`.
fn render_response(response: IpcResponse) -> Result<String> {
    match response {
        IpcResponse::Ok => Ok("OK".to_string()),
        IpcResponse::Warning { message } => Ok(format!("Warning: {}", message)),
        IpcResponse::Error { message } => bail!("{}", message),
        IpcResponse::WindowList { windows } => {
            if windows.is_empty() {
                return Ok("No selectable windows".to_string());
            }
            Ok(windows
                .iter()
                .map(|w| format!("{} - {}", w.handle, w.title))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        IpcResponse::State {
            selected,
            title,
            always_on_top,
            hover_enabled,
            transparency,
            active_monitors,
            last_notice,
        } => {
            let notice = last_notice
                .map(|n| format!("\nNotice:        {}", n))
                .unwrap_or_default();
            let Some(handle) = selected else {
                return Ok(format!("No window selected{}", notice));
            };
            let title = title.unwrap_or_else(|| "<closed>".to_string());
            Ok(format!(
                "Window:        {} - {}\n\
                 Always on top: {}\n\
                 Hover:         {}\n\
                 Transparency:  {}\n\
                 Monitors:      {}{}",
                handle,
                title,
                on_off(always_on_top),
                on_off(hover_enabled),
                transparency,
                active_monitors,
                notice
            ))
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Send one command to the daemon and wait for its response line.
#[cfg(windows)]
async fn send_command(cmd: &IpcCommand) -> Result<IpcResponse> {
    use hover_ipc::{encode_line, MAX_IPC_MESSAGE_SIZE, PIPE_NAME};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::windows::named_pipe::ClientOptions;

    /// `ERROR_PIPE_BUSY`: every server instance is taken, retry shortly.
    const ERROR_PIPE_BUSY: i32 = 231;
    const CONNECT_ATTEMPTS: u32 = 10;

    let mut attempt = 0;
    let client = loop {
        match ClientOptions::new().open(PIPE_NAME) {
            Ok(client) => break client,
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) && attempt < CONNECT_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Could not connect to the hover daemon at {}. Is it running?", PIPE_NAME)
                })
            }
        }
    };

    let (reader, mut writer) = tokio::io::split(client);
    let line = encode_line(cmd).context("Failed to encode command")?;
    writer
        .write_all(line.as_bytes())
        .await
        .context("Failed to send command")?;

    let mut reader = BufReader::new(reader.take(MAX_IPC_MESSAGE_SIZE as u64));
    let mut response = String::new();
    let read = tokio::time::timeout(Duration::from_secs(10), reader.read_line(&mut response))
        .await
        .context("Timed out waiting for the daemon")?
        .context("Failed to read response")?;
    if read == 0 {
        bail!("Daemon closed the connection without responding");
    }

    serde_json::from_str(response.trim()).context("Daemon sent an invalid response")
}

#[cfg(windows)]
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = to_ipc_command(cli.command)?;
    let response = send_command(&cmd).await?;
    println!("{}", render_response(response)?);
    Ok(())
}

#[cfg(not(windows))]
fn main() -> Result<()> {
    let cli = Cli::parse();
    to_ipc_command(cli.command)?;
    bail!("hover-cli only runs on Windows")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hover_ipc::WindowSummary;

    fn parse(args: &[&str]) -> Commands {
        let mut argv = vec!["hover-cli"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse(&["list"]), Commands::List);
        assert_eq!(parse(&["release"]), Commands::Release);
        assert_eq!(parse(&["status"]), Commands::Status);
        assert_eq!(parse(&["stop"]), Commands::Stop);
    }

    #[test]
    fn test_parse_toggles() {
        assert_eq!(
            to_ipc_command(parse(&["topmost", "on"])).unwrap(),
            IpcCommand::SetTopmost { enabled: true }
        );
        assert_eq!(
            to_ipc_command(parse(&["hover", "off"])).unwrap(),
            IpcCommand::SetHover { enabled: false }
        );
        assert!(Cli::try_parse_from(["hover-cli", "hover", "maybe"]).is_err());
    }

    #[test]
    fn test_parse_transparency_range() {
        assert_eq!(
            to_ipc_command(parse(&["transparency", "128"])).unwrap(),
            IpcCommand::SetTransparency { level: 128 }
        );
        assert!(Cli::try_parse_from(["hover-cli", "transparency", "256"]).is_err());
        assert!(Cli::try_parse_from(["hover-cli", "transparency", "-1"]).is_err());
    }

    #[test]
    fn test_select_by_handle_and_picker_line() {
        assert_eq!(
            to_ipc_command(parse(&["select", "0xC8"])).unwrap(),
            IpcCommand::Select { handle: 200 }
        );
        assert_eq!(
            to_ipc_command(parse(&["select", "200 - Calculator"])).unwrap(),
            IpcCommand::Select { handle: 200 }
        );
    }

    #[test]
    fn test_select_by_title() {
        assert_eq!(
            to_ipc_command(parse(&["select", "--title", "Notepad$"])).unwrap(),
            IpcCommand::SelectByTitle {
                pattern: "Notepad$".to_string()
            }
        );
    }

    #[test]
    fn test_select_requires_exactly_one_target() {
        assert!(Cli::try_parse_from(["hover-cli", "select"]).is_err());
        assert!(Cli::try_parse_from(["hover-cli", "select", "200", "--title", "x"]).is_err());
    }

    #[test]
    fn test_select_garbage_is_rejected_before_sending() {
        let err = to_ipc_command(parse(&["select", "Calculator"])).unwrap_err();
        assert!(err.to_string().contains("Invalid window handle"));
    }

    #[test]
    fn test_render_window_list_as_picker_lines() {
        let out = render_response(IpcResponse::WindowList {
            windows: vec![
                WindowSummary {
                    handle: 200,
                    title: "Calculator".to_string(),
                },
                WindowSummary {
                    handle: 100,
                    title: "Notes - Notepad".to_string(),
                },
            ],
        })
        .unwrap();
        assert_eq!(out, "200 - Calculator\n100 - Notes - Notepad");

        // Every rendered line selects the same window again
        for line in out.lines() {
            assert!(parse_selection(line).is_ok());
        }
    }

    #[test]
    fn test_render_state() {
        let out = render_response(IpcResponse::State {
            selected: Some(200),
            title: Some("Calculator".to_string()),
            always_on_top: true,
            hover_enabled: false,
            transparency: 128,
            active_monitors: 1,
            last_notice: None,
        })
        .unwrap();
        assert!(out.contains("200 - Calculator"));
        assert!(out.contains("Always on top: on"));
        assert!(out.contains("Hover:         off"));
        assert!(out.contains("Transparency:  128"));

        let empty = render_response(IpcResponse::State {
            selected: None,
            title: None,
            always_on_top: false,
            hover_enabled: false,
            transparency: 255,
            active_monitors: 0,
            last_notice: None,
        })
        .unwrap();
        assert_eq!(empty, "No window selected");
    }

    #[test]
    fn test_render_state_with_notice() {
        let closed = render_response(IpcResponse::State {
            selected: None,
            title: None,
            always_on_top: false,
            hover_enabled: false,
            transparency: 255,
            active_monitors: 0,
            last_notice: Some("Window 0xC8 was closed".to_string()),
        })
        .unwrap();
        assert_eq!(closed, "No window selected\nNotice:        Window 0xC8 was closed");

        let stalled = render_response(IpcResponse::State {
            selected: Some(200),
            title: Some("Calculator".to_string()),
            always_on_top: false,
            hover_enabled: false,
            transparency: 255,
            active_monitors: 0,
            last_notice: Some("Window 0xC8 is not responding; topmost effect stopped".to_string()),
        })
        .unwrap();
        assert!(stalled.contains("Window:        200 - Calculator"));
        assert!(stalled
            .ends_with("Notice:        Window 0xC8 is not responding; topmost effect stopped"));
    }

    #[test]
    fn test_render_error_and_warning() {
        assert!(render_response(IpcResponse::error("No window is selected")).is_err());
        assert_eq!(
            render_response(IpcResponse::warning("flaky")).unwrap(),
            "Warning: flaky"
        );
        assert_eq!(render_response(IpcResponse::Ok).unwrap(), "OK");
    }
}
