//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use crate::hardware::LedPaths;
use crate::mapping::DEFAULT_MAPPING_KEY;
use crate::trigger::{clamp_pulse_gap, DEFAULT_PULSE_GAP};

/// Default identity matched against the enabled-listener list
pub const DEFAULT_PACKAGE: &str = "led-sync";
/// Default command that opens the notification access screen
pub const DEFAULT_SETTINGS_COMMAND: &str =
    "am start -a android.settings.ACTION_NOTIFICATION_LISTENER_SETTINGS";
const DEFAULT_WORKERS: usize = 4;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// JSON key-value file holding the mapping document
    pub prefs_path: PathBuf,

    /// Key of the mapping document inside `prefs_path`
    pub mapping_key: String,

    /// JSON key-value file holding the enabled-listener list
    pub secure_settings_path: PathBuf,

    /// Identity looked up in the enabled-listener list
    pub package: String,

    /// Program used for privileged writes
    pub su_program: PathBuf,

    /// LED driver control files
    pub led: LedPaths,

    /// Delay between the two pulses
    pub pulse_gap: Duration,

    /// Maximum concurrent privileged commands
    pub workers: usize,

    /// Command line that opens the notification access settings
    pub settings_command: Vec<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match var("LEDSYNC_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = var("HOME").context("HOME is not set")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("led-sync")
            }
        };

        let path_or = |key: &str, default: PathBuf| var(key).map(PathBuf::from).unwrap_or(default);

        let defaults = LedPaths::default();
        let led = LedPaths {
            hwen: path_or("LEDSYNC_LED_HWEN", defaults.hwen),
            brightness: path_or("LEDSYNC_LED_BRIGHTNESS", defaults.brightness),
            command: path_or("LEDSYNC_LED_CMD", defaults.command),
        };

        let pulse_gap = match var("LEDSYNC_PULSE_GAP_MS") {
            Some(ms) => {
                let ms: u64 = ms
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid LEDSYNC_PULSE_GAP_MS: {ms:?}"))?;
                let requested = Duration::from_millis(ms);
                let gap = clamp_pulse_gap(requested);
                if gap != requested {
                    warn!(requested_ms = ms, using_ms = gap.as_millis() as u64, "pulse gap clamped");
                }
                gap
            }
            None => DEFAULT_PULSE_GAP,
        };

        let workers = match var("LEDSYNC_WORKERS") {
            Some(n) => n
                .trim()
                .parse::<usize>()
                .with_context(|| format!("invalid LEDSYNC_WORKERS: {n:?}"))?
                .max(1),
            None => DEFAULT_WORKERS,
        };

        let settings_command = var("LEDSYNC_SETTINGS_CMD")
            .unwrap_or_else(|| DEFAULT_SETTINGS_COMMAND.to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(Self {
            socket_path: path_or("LEDSYNC_SOCKET", data_dir.join("daemon.sock")),
            prefs_path: path_or("LEDSYNC_PREFS", data_dir.join("preferences.json")),
            mapping_key: var("LEDSYNC_MAPPING_KEY").unwrap_or_else(|| DEFAULT_MAPPING_KEY.to_string()),
            secure_settings_path: path_or(
                "LEDSYNC_SECURE_SETTINGS",
                data_dir.join("secure_settings.json"),
            ),
            package: var("LEDSYNC_PACKAGE").unwrap_or_else(|| DEFAULT_PACKAGE.to_string()),
            su_program: path_or("LEDSYNC_SU", PathBuf::from("su")),
            led,
            pulse_gap,
            workers,
            settings_command,
            data_dir,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}
