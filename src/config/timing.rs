//! Central timing configuration.
//!
//! Every fixed delay and duration used by the device driver and the action
//! interpreter lives here so it can be tuned without touching call sites.

use once_cell::sync::Lazy;
use std::time::Duration;

/// Delays inserted between the sub-steps of a Type action.
#[derive(Debug, Clone)]
pub struct ActionTimingConfig {
    /// Wait after switching to the ADB keyboard.
    pub keyboard_switch_delay: Duration,
    /// Wait after clearing the focused input field.
    pub text_clear_delay: Duration,
    /// Wait after sending the text.
    pub text_input_delay: Duration,
    /// Wait after restoring the original keyboard.
    pub keyboard_restore_delay: Duration,
}

impl Default for ActionTimingConfig {
    fn default() -> Self {
        Self {
            keyboard_switch_delay: Duration::from_millis(1000),
            text_clear_delay: Duration::from_millis(1000),
            text_input_delay: Duration::from_millis(1000),
            keyboard_restore_delay: Duration::from_millis(1000),
        }
    }
}

/// Durations of device-side gestures and the post-action settle time.
#[derive(Debug, Clone)]
pub struct DeviceTimingConfig {
    /// Press duration for Long Press.
    pub long_press_duration_ms: u64,
    /// Gesture duration for Swipe.
    pub swipe_duration_ms: u64,
    /// Gap between the two taps of a Double Tap.
    pub double_tap_interval: Duration,
    /// Settle time after any input event, so the UI can react before the
    /// next screenshot.
    pub settle_delay: Duration,
}

impl Default for DeviceTimingConfig {
    fn default() -> Self {
        Self {
            long_press_duration_ms: 600,
            swipe_duration_ms: 300,
            double_tap_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(1000),
        }
    }
}

/// Timeouts for host-side blocking calls.
#[derive(Debug, Clone)]
pub struct ConnectionTimingConfig {
    /// Upper bound for a single adb/hdc invocation.
    pub subprocess_timeout: Duration,
    /// Upper bound for a model HTTP request.
    pub model_timeout: Duration,
}

impl Default for ConnectionTimingConfig {
    fn default() -> Self {
        Self {
            subprocess_timeout: Duration::from_secs(10),
            model_timeout: Duration::from_secs(30),
        }
    }
}

/// The full timing record.
#[derive(Debug, Clone, Default)]
pub struct TimingConfig {
    pub action: ActionTimingConfig,
    pub device: DeviceTimingConfig,
    pub connection: ConnectionTimingConfig,
}

/// Process-wide timing configuration.
pub static TIMING_CONFIG: Lazy<TimingConfig> = Lazy::new(TimingConfig::default);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let timing = TimingConfig::default();
        assert_eq!(timing.device.long_press_duration_ms, 600);
        assert_eq!(timing.device.swipe_duration_ms, 300);
        assert_eq!(timing.connection.subprocess_timeout, Duration::from_secs(10));
        assert_eq!(timing.connection.model_timeout, Duration::from_secs(30));
    }
}
