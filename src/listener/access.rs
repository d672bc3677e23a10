//! Notification-access queries
//!
//! Neither query touches the trigger pipeline.

use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info};

use crate::mapping::KeyValueSource;

/// Setting that lists the components allowed to receive notifications
pub const ENABLED_LISTENERS_KEY: &str = "enabled_notification_listeners";

/// Failures while opening the access settings screen
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("no settings command configured")]
    NoCommand,

    #[error("failed to launch settings command {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Checks and requests notification-access authorization
pub struct ListenerAccess {
    settings: Arc<dyn KeyValueSource>,
    package: String,
    settings_command: Vec<String>,
}

impl ListenerAccess {
    pub fn new(
        settings: Arc<dyn KeyValueSource>,
        package: impl Into<String>,
        settings_command: Vec<String>,
    ) -> Self {
        Self {
            settings,
            package: package.into(),
            settings_command,
        }
    }

    /// Whether this package is in the enabled-listener list
    ///
    /// Entries are colon separated and look like `package/component`.
    pub fn is_enabled(&self) -> bool {
        let Some(flat) = self.settings.get_string(ENABLED_LISTENERS_KEY) else {
            debug!("no enabled listeners configured");
            return false;
        };

        flat.split(':')
            .filter(|entry| !entry.is_empty())
            .any(|entry| entry.starts_with(&self.package))
    }

    /// Launch the access settings screen without waiting for it
    pub fn open_settings(&self) -> Result<(), AccessError> {
        let (program, args) = self
            .settings_command
            .split_first()
            .ok_or(AccessError::NoCommand)?;

        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| AccessError::Spawn {
                program: program.clone(),
                source,
            })?;

        info!(program = %program, "opened notification access settings");
        Ok(())
    }
}
