//! Device driver: a uniform phone interface over two transports.
//!
//! The Android transport shells out to the host `adb` binary; the HarmonyOS
//! transport uses `hdc` and its `uitest uiInput` surface. Which transport is
//! active is decided once per process, from configuration, and held by a
//! process-wide singleton.

mod adb;
mod hdc;
mod shell;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, RgbImage};
use once_cell::sync::OnceCell;
use std::io::Cursor;
use thiserror::Error;

/// Device transport errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to spawn `{0}`: {1}")]
    Spawn(String, #[source] std::io::Error),
    #[error("`{0}` timed out after {1}s")]
    Timeout(String, u64),
    #[error("`{0}` exited with status {1}: {2}")]
    CommandFailed(String, i32, String),
    #[error("screenshot failed: {0}")]
    Screenshot(String),
}

/// Which transport binary drives the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Android over ADB.
    Adb,
    /// HarmonyOS over HDC.
    Hdc,
}

impl DeviceKind {
    /// Parse a configuration string ("adb"/"android" or "hdc"/"harmony").
    pub fn from_config(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "hdc" | "harmony" | "harmonyos" => DeviceKind::Hdc,
            _ => DeviceKind::Adb,
        }
    }
}

/// A captured device frame.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub base64_data: String,
    pub width: u32,
    pub height: u32,
    /// True when the OS refused the capture (payment pages and similar) and
    /// this is the black fallback frame.
    pub is_sensitive: bool,
}

impl Screenshot {
    pub fn new(base64_data: String, width: u32, height: u32, is_sensitive: bool) -> Self {
        Self {
            base64_data,
            width,
            height,
            is_sensitive,
        }
    }

    /// Black fallback frame for screens the OS refuses to capture.
    pub fn fallback(is_sensitive: bool) -> Self {
        let width: u32 = 1080;
        let height: u32 = 2400;

        let black = RgbImage::from_pixel(width, height, image::Rgb([0u8, 0u8, 0u8]));
        let img = DynamicImage::ImageRgb8(black);

        let mut buffer = Cursor::new(Vec::new());
        let _ = img.write_to(&mut buffer, image::ImageFormat::Png);
        let base64_data = STANDARD.encode(buffer.into_inner());

        Self::new(base64_data, width, height, is_sensitive)
    }
}

/// Uniform interface to the phone, dispatching on [`DeviceKind`].
#[derive(Debug, Clone, Copy)]
pub struct DeviceDriver {
    kind: DeviceKind,
}

impl DeviceDriver {
    pub fn new(kind: DeviceKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Capture the current frame. Sensitive screens yield the black fallback
    /// frame instead of an error; transport failures are `DeviceError`.
    pub fn screenshot(&self, device_id: Option<&str>) -> Result<Screenshot, DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::screenshot(device_id),
            DeviceKind::Hdc => hdc::screenshot(device_id),
        }
    }

    /// Foreground app label, or "System Home" when unknown.
    pub fn current_app(&self, device_id: Option<&str>) -> String {
        match self.kind {
            DeviceKind::Adb => adb::current_app(device_id),
            DeviceKind::Hdc => hdc::current_app(device_id),
        }
    }

    pub fn tap(&self, x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::tap(x, y, device_id),
            DeviceKind::Hdc => hdc::tap(x, y, device_id),
        }
    }

    pub fn double_tap(&self, x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::double_tap(x, y, device_id),
            DeviceKind::Hdc => hdc::double_tap(x, y, device_id),
        }
    }

    pub fn long_press(
        &self,
        x: i32,
        y: i32,
        duration_ms: Option<u64>,
        device_id: Option<&str>,
    ) -> Result<(), DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::long_press(x, y, duration_ms, device_id),
            DeviceKind::Hdc => hdc::long_press(x, y, device_id),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn swipe(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration_ms: Option<u64>,
        device_id: Option<&str>,
    ) -> Result<(), DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::swipe(start_x, start_y, end_x, end_y, duration_ms, device_id),
            DeviceKind::Hdc => hdc::swipe(start_x, start_y, end_x, end_y, duration_ms, device_id),
        }
    }

    pub fn back(&self, device_id: Option<&str>) -> Result<(), DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::back(device_id),
            DeviceKind::Hdc => hdc::back(device_id),
        }
    }

    pub fn home(&self, device_id: Option<&str>) -> Result<(), DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::home(device_id),
            DeviceKind::Hdc => hdc::home(device_id),
        }
    }

    pub fn type_text(&self, text: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::type_text(text, device_id),
            DeviceKind::Hdc => hdc::type_text(text, device_id),
        }
    }

    pub fn clear_text(&self, device_id: Option<&str>) -> Result<(), DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::clear_text(device_id),
            DeviceKind::Hdc => hdc::clear_text(device_id),
        }
    }

    /// Switch to the ADB keyboard if needed; returns the previous IME id so
    /// it can be restored after typing. A no-op on HarmonyOS, where
    /// `uiInput inputText` types Unicode without an IME swap.
    pub fn detect_and_set_adb_keyboard(
        &self,
        device_id: Option<&str>,
    ) -> Result<String, DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::detect_and_set_adb_keyboard(device_id),
            DeviceKind::Hdc => Ok(String::new()),
        }
    }

    /// Restore a previously captured IME. Idempotent: empty ids and the ADB
    /// keyboard itself are left alone.
    pub fn restore_keyboard(&self, ime: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::restore_keyboard(ime, device_id),
            DeviceKind::Hdc => Ok(()),
        }
    }

    /// Launch an app by display label. Returns false when the label is not
    /// in the app table.
    pub fn launch_app(&self, label: &str, device_id: Option<&str>) -> Result<bool, DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::launch_app(label, device_id),
            DeviceKind::Hdc => hdc::launch_app(label, device_id),
        }
    }

    /// Send a key event by Android key-event code or name.
    pub fn send_key(&self, code: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
        match self.kind {
            DeviceKind::Adb => adb::send_key(code, device_id),
            DeviceKind::Hdc => hdc::send_key(code, device_id),
        }
    }
}

static DRIVER: OnceCell<DeviceDriver> = OnceCell::new();

/// Initialise the process-wide driver from configuration. Later calls keep
/// the first kind; the device is a singleton per task.
pub fn init_device_driver(kind: DeviceKind) -> &'static DeviceDriver {
    DRIVER.get_or_init(|| DeviceDriver::new(kind))
}

/// The process-wide driver. Defaults to ADB when never initialised.
pub fn device_driver() -> &'static DeviceDriver {
    DRIVER.get_or_init(|| DeviceDriver::new(DeviceKind::Adb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_kind_from_config() {
        assert_eq!(DeviceKind::from_config("adb"), DeviceKind::Adb);
        assert_eq!(DeviceKind::from_config("Android"), DeviceKind::Adb);
        assert_eq!(DeviceKind::from_config("hdc"), DeviceKind::Hdc);
        assert_eq!(DeviceKind::from_config("HarmonyOS"), DeviceKind::Hdc);
        assert_eq!(DeviceKind::from_config(""), DeviceKind::Adb);
    }

    #[test]
    fn test_fallback_screenshot() {
        let shot = Screenshot::fallback(true);
        assert_eq!(shot.width, 1080);
        assert_eq!(shot.height, 2400);
        assert!(shot.is_sensitive);
        assert!(!shot.base64_data.is_empty());
    }
}
