//! Background pollers that keep an effect applied to the selected window.
//!
//! Each monitor is a small state machine whose [`Monitor::tick`] takes the
//! current time as a parameter, so its behavior can be driven in simulated
//! time. [`MonitorHandle::spawn`] runs a monitor on its own thread.
//!
//! # Lifecycle
//!
//! A poller stops itself when its binding is no longer wanted (selection
//! changed or toggle turned off), when the window disappears, or when its
//! failure budget runs out. The owner can also stop it explicitly:
//! [`MonitorHandle::stop`] signals the thread and joins it. The stop signal
//! interrupts the sleep between ticks, so joining takes at most one tick.

mod hover;
mod topmost;

pub use hover::HoverMonitor;
pub use topmost::TopmostMonitor;

use crate::{EffectDriver, RetryPolicy, SharedState, WindowHandle, WindowSystem};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which effect a monitor maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorKind {
    Topmost,
    Hover,
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorKind::Topmost => write!(f, "topmost"),
            MonitorKind::Hover => write!(f, "hover"),
        }
    }
}

/// Why a monitor stopped on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The toggle was turned off or another window was selected.
    Released,
    /// The bound window no longer exists.
    WindowGone,
    /// Too many consecutive failures.
    BudgetExhausted,
}

/// Sent to the owner when a monitor stops for a reason the user should
/// hear about. Never sent for [`StopReason::Released`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorNotice {
    pub kind: MonitorKind,
    pub handle: WindowHandle,
    pub reason: StopReason,
}

impl fmt::Display for MonitorNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            StopReason::Released => write!(f, "{} effect released on {}", self.kind, self.handle),
            StopReason::WindowGone => write!(f, "Window {} was closed", self.handle),
            StopReason::BudgetExhausted => write!(
                f,
                "Window {} is not responding; {} effect stopped",
                self.handle, self.kind
            ),
        }
    }
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Poll again after this delay.
    Continue(Duration),
    Stop(StopReason),
}

/// Poll cadences and failure budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub topmost_interval: Duration,
    /// Re-apply topmost at this cadence even when it looks intact.
    pub topmost_force_interval: Duration,
    pub topmost_failure_budget: u32,
    /// Retry policy for each individual topmost placement.
    pub topmost_retry: RetryPolicy,
    pub hover_interval: Duration,
    /// Poll delay while the hover monitor is seeing errors.
    pub hover_error_interval: Duration,
    pub hover_error_budget: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            topmost_interval: Duration::from_millis(500),
            topmost_force_interval: Duration::from_secs(30),
            topmost_failure_budget: 3,
            topmost_retry: RetryPolicy::default(),
            hover_interval: Duration::from_millis(50),
            hover_error_interval: Duration::from_millis(200),
            hover_error_budget: 5,
        }
    }
}

/// A pollable effect state machine bound to one window.
pub trait Monitor: Send + 'static {
    const KIND: MonitorKind;

    fn handle(&self) -> WindowHandle;

    fn tick<W: WindowSystem>(
        &mut self,
        driver: &EffectDriver<W>,
        state: &SharedState,
        now: Instant,
    ) -> Tick;
}

/// Decrements the live-poller count when the poller thread ends.
struct PollerGuard(Arc<AtomicUsize>);

impl PollerGuard {
    fn register(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for PollerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A running poller thread. Dropping the handle stops and joins it.
pub struct MonitorHandle {
    kind: MonitorKind,
    handle: WindowHandle,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Start `monitor` on a dedicated thread.
    ///
    /// `pollers` counts live poller threads; `notices` receives a
    /// [`MonitorNotice`] when the monitor stops because the window went
    /// away or its budget ran out.
    pub fn spawn<M: Monitor, W: WindowSystem>(
        mut monitor: M,
        driver: Arc<EffectDriver<W>>,
        state: SharedState,
        notices: Option<mpsc::Sender<MonitorNotice>>,
        pollers: &Arc<AtomicUsize>,
    ) -> std::io::Result<Self> {
        let kind = M::KIND;
        let handle = monitor.handle();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let guard = PollerGuard::register(pollers);

        let thread = thread::Builder::new()
            .name(format!("{}-monitor", kind))
            .spawn(move || {
                let _guard = guard;
                debug!("{} monitor started for window {}", kind, handle);

                loop {
                    match stop_rx.try_recv() {
                        Ok(()) | Err(TryRecvError::Disconnected) => break,
                        Err(TryRecvError::Empty) => {}
                    }

                    match monitor.tick(&driver, &state, Instant::now()) {
                        Tick::Continue(delay) => match stop_rx.recv_timeout(delay) {
                            Err(RecvTimeoutError::Timeout) => {}
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        },
                        Tick::Stop(reason) => {
                            info!("{} monitor for {} stopped: {:?}", kind, handle, reason);
                            if reason != StopReason::Released {
                                if let Some(ref tx) = notices {
                                    let _ = tx.send(MonitorNotice {
                                        kind,
                                        handle,
                                        reason,
                                    });
                                }
                            }
                            break;
                        }
                    }
                }

                debug!("{} monitor for window {} exited", kind, handle);
            })?;

        Ok(Self {
            kind,
            handle,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn kind(&self) -> MonitorKind {
        self.kind
    }

    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    /// Whether the poller thread has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Signal the poller and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("{} monitor thread for {} panicked", self.kind, self.handle);
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("finished", &self.is_finished())
            .finish()
    }
}
