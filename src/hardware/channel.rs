//! Enable and color writes for the LED driver

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::exec::PrivilegedExecutor;

/// Default enable register
pub const DEFAULT_HWEN_PATH: &str = "/sys/class/leds/aw22xxx_led/hwen";
/// Default brightness register
pub const DEFAULT_BRIGHTNESS_PATH: &str = "/sys/class/leds/aw22xxx_led/brightness";
/// Default color-command interface
pub const DEFAULT_COMMAND_PATH: &str = "/sys/led/led/tran_led_cmd";

/// Locations of the driver's control files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedPaths {
    pub hwen: PathBuf,
    pub brightness: PathBuf,
    pub command: PathBuf,
}

impl Default for LedPaths {
    fn default() -> Self {
        Self {
            hwen: PathBuf::from(DEFAULT_HWEN_PATH),
            brightness: PathBuf::from(DEFAULT_BRIGHTNESS_PATH),
            command: PathBuf::from(DEFAULT_COMMAND_PATH),
        }
    }
}

impl LedPaths {
    /// Command that powers the driver on
    pub fn enable_command(&self) -> String {
        format!("echo 1 > {}", self.hwen.display())
    }

    /// Command that sets the driver to full brightness
    pub fn brightness_command(&self) -> String {
        format!("echo 255 > {}", self.brightness.display())
    }

    /// Command that writes `hex_code` to the color interface
    ///
    /// `-n` and the single quotes are part of the driver contract: the code
    /// is written byte for byte with no trailing newline.
    pub fn color_command(&self, hex_code: &str) -> String {
        format!("echo -n '{hex_code}' > {}", self.command.display())
    }
}

/// Sequences privileged writes to one LED driver
///
/// The driver exposes no readable status, so every color write is preceded
/// by a fresh enable + brightness pair rather than tracked state.
pub struct HardwareChannel {
    executor: Arc<dyn PrivilegedExecutor>,
    paths: LedPaths,
}

impl HardwareChannel {
    pub fn new(executor: Arc<dyn PrivilegedExecutor>, paths: LedPaths) -> Self {
        Self { executor, paths }
    }

    /// Power the driver on and set it to full brightness
    ///
    /// Both writes are always attempted; returns true only if both succeed.
    pub fn ensure_engine_on(&self) -> bool {
        let hwen = self.executor.execute(&self.paths.enable_command());
        let bright = self.executor.execute(&self.paths.brightness_command());
        debug!(hwen, bright, "ensure engine on");
        hwen && bright
    }

    /// Write one color command, tagging the log line with `label`
    pub fn fire(&self, hex_code: &str, label: &str) -> bool {
        let ok = self.executor.execute(&self.paths.color_command(hex_code));
        info!(label, cmd = ok, hex = hex_code, "pulse fired");
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::RecordingExecutor;

    fn channel(executor: RecordingExecutor) -> (HardwareChannel, Arc<RecordingExecutor>) {
        let executor = Arc::new(executor);
        let channel = HardwareChannel::new(executor.clone(), LedPaths::default());
        (channel, executor)
    }

    #[test]
    fn test_command_text_is_exact() {
        let paths = LedPaths::default();
        assert_eq!(
            paths.enable_command(),
            "echo 1 > /sys/class/leds/aw22xxx_led/hwen"
        );
        assert_eq!(
            paths.brightness_command(),
            "echo 255 > /sys/class/leds/aw22xxx_led/brightness"
        );
        assert_eq!(
            paths.color_command("FF0000"),
            "echo -n 'FF0000' > /sys/led/led/tran_led_cmd"
        );
    }

    #[test]
    fn test_color_command_keeps_whitespace() {
        let paths = LedPaths::default();
        assert_eq!(
            paths.color_command(" 0 1 2 "),
            "echo -n ' 0 1 2 ' > /sys/led/led/tran_led_cmd"
        );
    }

    #[test]
    fn test_ensure_engine_on_issues_both_writes() {
        let (channel, executor) = channel(RecordingExecutor::new());
        assert!(channel.ensure_engine_on());
        assert_eq!(
            executor.commands(),
            vec![
                LedPaths::default().enable_command(),
                LedPaths::default().brightness_command(),
            ]
        );
    }

    #[test]
    fn test_failed_enable_still_attempts_brightness() {
        let (channel, executor) = channel(RecordingExecutor::new().failing());
        assert!(!channel.ensure_engine_on());
        assert_eq!(executor.calls().len(), 2);
    }

    #[test]
    fn test_fire_is_single_call() {
        let (channel, executor) = channel(RecordingExecutor::new());
        assert!(channel.fire("00FF00", "FIRE #1"));
        assert_eq!(
            executor.commands(),
            vec!["echo -n '00FF00' > /sys/led/led/tran_led_cmd".to_string()]
        );
    }

    #[test]
    fn test_fire_reports_failure() {
        let (channel, _) = channel(RecordingExecutor::new().failing());
        assert!(!channel.fire("00FF00", "FIRE #2"));
    }
}
