//! Hover Daemon
//!
//! Main daemon process for the Hover window effect utility.
//!
//! Responsibilities:
//! - Own the selection controller and its effect monitors
//! - Handle IPC commands from the CLI
//! - Surface monitor notices (window closed, effect given up)
//! - System tray icon and menu
//! - Restore the active window on exit, signal or panic

#![cfg_attr(not(windows), allow(dead_code))]

mod config;
mod dispatch;
#[cfg(windows)]
mod tray;

use anyhow::Result;
use hover_core_effects::MonitorNotice;
use hover_ipc::{IpcCommand, IpcResponse};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[cfg(windows)]
use {
    config::Config,
    dispatch::App,
    hover_core_effects::SelectionController,
    hover_ipc::{MAX_IPC_MESSAGE_SIZE, PIPE_NAME},
    hover_platform_win32::{emergency_restore, set_dpi_awareness, Win32WindowSystem},
    std::sync::atomic::{AtomicU64, Ordering},
    std::sync::Arc,
    tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    tokio::net::windows::named_pipe::{PipeMode, ServerOptions},
    tracing::{debug, error, info, warn, Level},
    tracing_subscriber::FmtSubscriber,
};

/// Events that the daemon event loop processes.
enum DaemonEvent {
    /// An IPC command from a CLI client.
    IpcCommand {
        cmd: IpcCommand,
        responder: oneshot::Sender<IpcResponse>,
    },
    /// A monitor stopped on its own.
    Notice(MonitorNotice),
    /// A tray menu event.
    #[cfg(windows)]
    Tray(tray::TrayEvent),
    /// Shutdown signal.
    Shutdown,
}

/// IPC read timeout - clients must send within this period.
const IPC_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Written when a response cannot be serialized.
const SERIALIZATION_ERROR_LINE: &str =
    "{\"status\":\"error\",\"message\":\"Internal serialization error\"}\n";

/// Serialize a response line, falling back to a fixed error line.
fn response_line(response: &IpcResponse) -> String {
    match hover_ipc::encode_line(response) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!("Failed to serialize IPC response: {}", e);
            SERIALIZATION_ERROR_LINE.to_string()
        }
    }
}

/// Run the IPC server, accepting connections and dispatching commands.
#[cfg(windows)]
async fn run_ipc_server(event_tx: mpsc::Sender<DaemonEvent>) {
    let mut is_first_instance = true;

    loop {
        let server = match ServerOptions::new()
            .first_pipe_instance(is_first_instance)
            .pipe_mode(PipeMode::Byte)
            .create(PIPE_NAME)
        {
            Ok(s) => {
                is_first_instance = false;
                s
            }
            Err(e) => {
                error!("Failed to create named pipe server: {}", e);
                if is_first_instance {
                    error!("Is another hover daemon already running?");
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        debug!("Waiting for client connection on {}", PIPE_NAME);

        if let Err(e) = server.connect().await {
            error!("Failed to accept client connection: {}", e);
            continue;
        }

        debug!("Client connected");

        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(server, event_tx).await {
                warn!("Client handler error: {}", e);
            }
        });
    }
}

/// Handle a single client connection: one command line in, one response line out.
#[cfg(windows)]
async fn handle_client(
    pipe: tokio::net::windows::named_pipe::NamedPipeServer,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> Result<()> {
    let (reader, mut writer) = tokio::io::split(pipe);
    let limited_reader = reader.take(MAX_IPC_MESSAGE_SIZE as u64);
    let mut reader = BufReader::new(limited_reader);
    let mut line = String::new();

    let read_result = tokio::time::timeout(IPC_READ_TIMEOUT, reader.read_line(&mut line)).await;
    let bytes_read = match read_result {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            debug!("Client did not send a command within {:?}", IPC_READ_TIMEOUT);
            return Ok(());
        }
    };
    if bytes_read == 0 {
        return Ok(());
    }

    let line = line.trim();
    debug!("Received command: {}", line);

    let cmd: IpcCommand = match serde_json::from_str(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            let response = IpcResponse::error(format!("Invalid command: {}", e));
            writer.write_all(response_line(&response).as_bytes()).await?;
            return Ok(());
        }
    };

    let is_stop = matches!(cmd, IpcCommand::Stop);
    let (resp_tx, resp_rx) = oneshot::channel();

    if event_tx
        .send(DaemonEvent::IpcCommand {
            cmd,
            responder: resp_tx,
        })
        .await
        .is_err()
    {
        let response = IpcResponse::error("Daemon is shutting down");
        writer.write_all(response_line(&response).as_bytes()).await?;
        return Ok(());
    }

    let response = match resp_rx.await {
        Ok(resp) => resp,
        Err(_) => IpcResponse::error("Failed to get response from daemon"),
    };

    writer.write_all(response_line(&response).as_bytes()).await?;

    if is_stop {
        let _ = event_tx.send(DaemonEvent::Shutdown).await;
    }

    Ok(())
}

/// Spawn a named forwarding thread that receives events from a std::sync::mpsc channel
/// and forwards them to a tokio mpsc sender. Returns the JoinHandle for graceful shutdown.
fn spawn_forwarding_thread<T: Send + 'static>(
    name: &str,
    receiver: std::sync::mpsc::Receiver<T>,
    sender: mpsc::Sender<DaemonEvent>,
    map_fn: impl Fn(T) -> DaemonEvent + Send + 'static,
) -> Result<std::thread::JoinHandle<()>> {
    let thread_name = name.to_string();
    std::thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            while let Ok(event) = receiver.recv() {
                if sender.blocking_send(map_fn(event)).is_err() {
                    break; // Channel closed, daemon shutting down
                }
            }
        })
        .map_err(|e| anyhow::anyhow!("Failed to spawn {} thread: {}", thread_name, e))
}

/// Check if another daemon instance is already running by probing the named pipe.
#[cfg(windows)]
async fn check_already_running() -> bool {
    tokio::net::windows::named_pipe::ClientOptions::new()
        .open(PIPE_NAME)
        .is_ok()
}

/// Forward Ctrl+C, console close and system shutdown to the event loop.
#[cfg(windows)]
fn spawn_signal_watchers(event_tx: &mpsc::Sender<DaemonEvent>) {
    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Ctrl+C received, initiating shutdown...");
            let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
        }
    });

    match tokio::signal::windows::ctrl_close() {
        Ok(mut close) => {
            let shutdown_tx = event_tx.clone();
            tokio::spawn(async move {
                if close.recv().await.is_some() {
                    info!("Console close received, initiating shutdown...");
                    let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
                }
            });
        }
        Err(e) => warn!("Failed to watch console close: {}", e),
    }

    match tokio::signal::windows::ctrl_shutdown() {
        Ok(mut shutdown) => {
            let shutdown_tx = event_tx.clone();
            tokio::spawn(async move {
                if shutdown.recv().await.is_some() {
                    info!("System shutdown received, initiating shutdown...");
                    let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
                }
            });
        }
        Err(e) => warn!("Failed to watch system shutdown: {}", e),
    }
}

#[cfg(windows)]
#[tokio::main]
async fn main() -> Result<()> {
    // Cursor and window rectangles must share one coordinate space
    if set_dpi_awareness() {
        eprintln!("[hover] DPI awareness set to Per-Monitor Aware V2");
    } else {
        eprintln!("[hover] Warning: Failed to set DPI awareness (may already be set)");
    }

    // Load configuration first (needed for log level)
    let mut config = Config::load().unwrap_or_else(|e| {
        // Can't use tracing yet, fall back to eprintln
        eprintln!("Failed to load configuration: {:#}. Using defaults.", e);
        Config::default()
    });

    let config_warnings = config.validate();

    let log_level = match config.behavior.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    for w in &config_warnings {
        warn!("Config: {} - {}", w.field, w.message);
    }

    // The panic hook must not touch the controller, so the active window is
    // mirrored here after every event.
    let active_window = Arc::new(AtomicU64::new(0));
    {
        let active_window = Arc::clone(&active_window);
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let raw = active_window.load(Ordering::SeqCst);
            if raw != 0 {
                eprintln!("[hover] PANIC detected, restoring window 0x{:X}", raw);
                emergency_restore(hover_core_effects::WindowHandle::from_raw(raw));
            }
            default_hook(info);
        }));
    }

    info!("Hover daemon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if check_already_running().await {
        error!("Another hover daemon is already running (pipe {} is active)", PIPE_NAME);
        return Ok(());
    }

    info!(
        "Configuration loaded: topmost_poll={}ms, hover_poll={}ms, log_level={}",
        config.topmost.poll_interval_ms, config.hover.poll_interval_ms, config.behavior.log_level
    );

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(100);

    // Collect forwarding thread handles for graceful shutdown
    let mut thread_handles: Vec<std::thread::JoinHandle<()>> = Vec::new();

    // Monitor notices arrive on a std channel from the poller threads
    let (notice_tx, notice_rx) = std::sync::mpsc::channel::<MonitorNotice>();
    match spawn_forwarding_thread("notice-fwd", notice_rx, event_tx.clone(), DaemonEvent::Notice) {
        Ok(handle) => thread_handles.push(handle),
        Err(e) => warn!("{}", e),
    }

    let controller =
        SelectionController::new(Arc::new(Win32WindowSystem::new()), config.monitor_config())
            .with_notices(notice_tx);
    let mut app = App::new(controller, config.behavior.title_max_chars);

    match app.refresh_windows() {
        Ok(windows) => info!("Found {} selectable windows", windows.len()),
        Err(message) => error!("{}", message),
    }

    let tray_manager = if config.tray.enabled {
        let (tray_sync_tx, tray_sync_rx) = std::sync::mpsc::channel();

        match spawn_forwarding_thread("tray-fwd", tray_sync_rx, event_tx.clone(), DaemonEvent::Tray)
        {
            Ok(handle) => thread_handles.push(handle),
            Err(e) => warn!("{}", e),
        }

        match tray::TrayManager::new(tray_sync_tx, &app.tooltip()) {
            Ok(manager) => {
                info!("System tray icon initialized");
                Some(manager)
            }
            Err(e) => {
                warn!("Failed to create system tray icon: {}. Tray disabled.", e);
                None
            }
        }
    } else {
        info!("System tray disabled by config (tray.enabled = false)");
        None
    };

    let ipc_tx = event_tx.clone();
    tokio::spawn(async move {
        run_ipc_server(ipc_tx).await;
    });

    info!("IPC server listening on {}", PIPE_NAME);

    spawn_signal_watchers(&event_tx);

    info!("Ready. Use hover-cli to send commands.");

    while let Some(event) = event_rx.recv().await {
        match event {
            DaemonEvent::IpcCommand { cmd, responder } => {
                let response = app.handle_command(cmd);
                let _ = responder.send(response);
            }
            DaemonEvent::Notice(notice) => {
                // Held by the app until `status` reports it; the tooltip
                // update below shows it in the tray meanwhile.
                let message = app.handle_notice(&notice);
                debug!("Notice queued for the user: {}", message);
            }
            DaemonEvent::Tray(tray_event) => match tray_event {
                tray::TrayEvent::Release => {
                    info!("Tray: Release requested");
                    if let IpcResponse::Error { message } = app.handle_command(IpcCommand::Deselect)
                    {
                        warn!("Tray release failed: {}", message);
                    }
                }
                tray::TrayEvent::Quit => {
                    info!("Tray: Quit requested");
                    let _ = event_tx.send(DaemonEvent::Shutdown).await;
                }
            },
            DaemonEvent::Shutdown => {
                info!("Shutdown signal received");
                app.shutdown();
                active_window.store(0, Ordering::SeqCst);
                break;
            }
        }

        let selected = app.controller().selected();
        active_window.store(selected.map_or(0, |h| h.raw()), Ordering::SeqCst);
        if let Some(ref tray) = tray_manager {
            tray.set_tooltip(&app.tooltip());
        }
    }

    // Dropping the controller and tray releases the senders the forwarding
    // threads are waiting on.
    drop(app);
    drop(tray_manager);

    info!("Waiting for forwarding threads to exit...");
    for handle in thread_handles {
        let _ = handle.join();
    }

    info!("Hover daemon shutting down.");
    Ok(())
}

#[cfg(not(windows))]
fn main() -> Result<()> {
    anyhow::bail!("hover only runs on Windows")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hover_core_effects::{MonitorKind, StopReason, WindowHandle};

    fn notice() -> MonitorNotice {
        MonitorNotice {
            kind: MonitorKind::Hover,
            handle: WindowHandle::from_raw(200),
            reason: StopReason::WindowGone,
        }
    }

    #[test]
    fn test_spawn_forwarding_thread_forwards_events() {
        let (tx, rx) = std::sync::mpsc::channel::<MonitorNotice>();
        let (async_tx, mut async_rx) = mpsc::channel::<DaemonEvent>(10);

        let _handle = spawn_forwarding_thread("test", rx, async_tx, DaemonEvent::Notice).unwrap();

        tx.send(notice()).unwrap();
        drop(tx); // Close channel so thread exits

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let event = rt.block_on(async { async_rx.recv().await });
        match event {
            Some(DaemonEvent::Notice(n)) => assert_eq!(n, notice()),
            _ => panic!("Expected forwarded notice"),
        }
    }

    #[test]
    fn test_spawn_forwarding_thread_stops_on_channel_close() {
        let (tx, rx) = std::sync::mpsc::channel::<u32>();
        let (async_tx, _async_rx) = mpsc::channel::<DaemonEvent>(10);

        let handle =
            spawn_forwarding_thread("test-close", rx, async_tx, |_| DaemonEvent::Shutdown).unwrap();

        drop(tx);
        handle.join().expect("Thread should exit cleanly");
    }

    #[test]
    fn test_spawn_forwarding_thread_stops_when_loop_is_gone() {
        let (tx, rx) = std::sync::mpsc::channel::<u32>();
        let (async_tx, async_rx) = mpsc::channel::<DaemonEvent>(10);
        drop(async_rx);

        let handle =
            spawn_forwarding_thread("test-gone", rx, async_tx, |_| DaemonEvent::Shutdown).unwrap();

        tx.send(1).unwrap();
        handle.join().expect("Thread should exit once the loop is gone");
    }

    #[test]
    fn test_response_line_is_terminated() {
        let line = response_line(&IpcResponse::Ok);
        assert_eq!(line, "{\"status\":\"ok\"}\n");
    }

    #[test]
    fn test_serialization_fallback_is_valid_response() {
        let parsed: IpcResponse = serde_json::from_str(SERIALIZATION_ERROR_LINE.trim()).unwrap();
        assert_eq!(parsed, IpcResponse::error("Internal serialization error"));
    }

    #[cfg(windows)]
    #[ignore] // Depends on no daemon running; fails when daemon is active
    #[test]
    fn test_check_already_running_returns_false_when_no_daemon() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
            .unwrap();
        let result = rt.block_on(check_already_running());
        assert!(!result);
    }

    #[test]
    fn test_ipc_read_timeout_is_reasonable() {
        assert!(IPC_READ_TIMEOUT.as_secs() >= 1);
        assert!(IPC_READ_TIMEOUT.as_secs() <= 30);
    }

    #[test]
    fn test_max_ipc_message_size_is_reasonable() {
        const { assert!(hover_ipc::MAX_IPC_MESSAGE_SIZE >= 1024) };
        const { assert!(hover_ipc::MAX_IPC_MESSAGE_SIZE <= 1024 * 1024) };
    }
}
