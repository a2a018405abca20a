//! Configuration management for the Hover daemon.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. `%APPDATA%/hover/config/config.toml` (Windows standard)
//! 2. `~/.config/hover/config.toml` (Unix-style, for WSL compatibility)
//! 3. `./config.toml` (current directory, for development)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use hover_core_effects::{MonitorConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for Hover.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub behavior: BehaviorConfig,
    /// Always-on-top monitor tuning.
    pub topmost: TopmostConfig,
    /// Hover monitor tuning.
    pub hover: HoverConfig,
    pub tray: TrayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Window titles longer than this are shortened in listings.
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            title_max_chars: default_title_max_chars(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopmostConfig {
    #[serde(default = "default_topmost_poll")]
    pub poll_interval_ms: u64,
    /// Re-apply topmost at this cadence even when it looks intact.
    #[serde(default = "default_force_reapply")]
    pub force_reapply_secs: u64,
    /// Consecutive failed repairs before the monitor gives up.
    #[serde(default = "default_topmost_budget")]
    pub failure_budget: u32,
    /// Attempts per topmost placement.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for TopmostConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_topmost_poll(),
            force_reapply_secs: default_force_reapply(),
            failure_budget: default_topmost_budget(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoverConfig {
    #[serde(default = "default_hover_poll")]
    pub poll_interval_ms: u64,
    /// Poll delay after a failed transparency update.
    #[serde(default = "default_hover_error_interval")]
    pub error_interval_ms: u64,
    /// Consecutive errors before the hover effect is switched off.
    #[serde(default = "default_hover_budget")]
    pub error_budget: u32,
}

impl Default for HoverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_hover_poll(),
            error_interval_ms: default_hover_error_interval(),
            error_budget: default_hover_budget(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrayConfig {
    /// Show the system tray icon.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_title_max_chars() -> usize {
    50
}

fn default_topmost_poll() -> u64 {
    500
}

fn default_force_reapply() -> u64 {
    30
}

fn default_topmost_budget() -> u32 {
    3
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    50
}

fn default_hover_poll() -> u64 {
    50
}

fn default_hover_error_interval() -> u64 {
    200
}

fn default_hover_budget() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A config value that was out of range and has been replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

fn clamp_field<T>(value: &mut T, min: T, max: T, field: &str, warnings: &mut Vec<ConfigWarning>)
where
    T: PartialOrd + Copy + Display,
{
    let clamped = if *value < min {
        min
    } else if *value > max {
        max
    } else {
        return;
    };
    warnings.push(ConfigWarning {
        field: field.to_string(),
        message: format!("{} is outside {}..={}, using {}", value, min, max, clamped),
    });
    *value = clamped;
}

impl Config {
    /// Load configuration from standard locations.
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self> {
        let paths = config_paths();

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Clamp out-of-range values in place and report what changed.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let level = self.behavior.log_level.to_lowercase();
        if LOG_LEVELS.contains(&level.as_str()) {
            self.behavior.log_level = level;
        } else {
            warnings.push(ConfigWarning {
                field: "behavior.log_level".to_string(),
                message: format!(
                    "unknown level {:?}, using \"info\"",
                    self.behavior.log_level
                ),
            });
            self.behavior.log_level = default_log_level();
        }

        clamp_field(
            &mut self.behavior.title_max_chars,
            10,
            500,
            "behavior.title_max_chars",
            &mut warnings,
        );

        let t = &mut self.topmost;
        clamp_field(&mut t.poll_interval_ms, 50, 10_000, "topmost.poll_interval_ms", &mut warnings);
        clamp_field(&mut t.force_reapply_secs, 1, 3_600, "topmost.force_reapply_secs", &mut warnings);
        clamp_field(&mut t.failure_budget, 1, 100, "topmost.failure_budget", &mut warnings);
        clamp_field(&mut t.retry_attempts, 1, 10, "topmost.retry_attempts", &mut warnings);
        clamp_field(&mut t.retry_delay_ms, 0, 1_000, "topmost.retry_delay_ms", &mut warnings);

        let h = &mut self.hover;
        clamp_field(&mut h.poll_interval_ms, 10, 1_000, "hover.poll_interval_ms", &mut warnings);
        clamp_field(&mut h.error_interval_ms, 10, 5_000, "hover.error_interval_ms", &mut warnings);
        clamp_field(&mut h.error_budget, 1, 100, "hover.error_budget", &mut warnings);

        warnings
    }

    /// Poll cadences and budgets for the effect monitors.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            topmost_interval: Duration::from_millis(self.topmost.poll_interval_ms),
            topmost_force_interval: Duration::from_secs(self.topmost.force_reapply_secs),
            topmost_failure_budget: self.topmost.failure_budget,
            topmost_retry: RetryPolicy::fixed(
                self.topmost.retry_attempts,
                Duration::from_millis(self.topmost.retry_delay_ms),
            ),
            hover_interval: Duration::from_millis(self.hover.poll_interval_ms),
            hover_error_interval: Duration::from_millis(self.hover.error_interval_ms),
            hover_error_budget: self.hover.error_budget,
        }
    }
}

/// Get all possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(proj_dirs) = ProjectDirs::from("com", "hover", "hover") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    if let Some(home) = dirs_home() {
        paths.push(home.join(".config").join("hover").join("config.toml"));
    }

    paths.push(PathBuf::from("config.toml"));

    paths
}

/// Get the user's home directory.
fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
