//! HarmonyOS transport over the host `hdc` binary and `uitest uiInput`.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::io::Cursor;
use std::thread;
use std::{env, fs};
use uuid::Uuid;

use crate::config::{get_package_name, APP_PACKAGES, TIMING_CONFIG};

use super::shell::run;
use super::{DeviceError, Screenshot};

const DEVICE_SCREENCAP_PATH: &str = "/data/local/tmp/screencap.png";

// HarmonyOS key codes (the 2000 range). Enter is 2054.
const KEY_ENTER: &str = "2054";
const KEY_DEL: &str = "2055";
const KEY_CTRL_LEFT: &str = "2072";
const KEY_A: &str = "2017";
const KEY_HOME: &str = "1";
const KEY_BACK: &str = "2";

fn hdc_args(device_id: Option<&str>, tail: &[&str]) -> Vec<String> {
    let mut args = Vec::with_capacity(tail.len() + 2);
    if let Some(id) = device_id {
        args.push("-t".to_string());
        args.push(id.to_string());
    }
    args.extend(tail.iter().map(|s| s.to_string()));
    args
}

fn settle() {
    thread::sleep(TIMING_CONFIG.device.settle_delay);
}

/// Map an Android key-event code or name to a HarmonyOS key code.
/// Returns None for codes with no mapping; those fall back to the
/// Android-style `input keyevent` command.
pub(super) fn harmony_key_code(code: &str) -> Option<&'static str> {
    match code {
        "KEYCODE_ENTER" | "ENTER" | "66" => Some(KEY_ENTER),
        "KEYCODE_DEL" | "67" => Some(KEY_DEL),
        "KEYCODE_HOME" | "3" => Some(KEY_HOME),
        "KEYCODE_BACK" | "4" => Some(KEY_BACK),
        _ => None,
    }
}

/// Numeric codes in the 2000 range are already HarmonyOS key codes.
fn is_harmony_numeric_code(code: &str) -> bool {
    code.len() == 4 && code.starts_with('2') && code.chars().all(|ch| ch.is_ascii_digit())
}

pub(super) fn screenshot(device_id: Option<&str>) -> Result<Screenshot, DeviceError> {
    run(
        "hdc",
        &hdc_args(
            device_id,
            &["shell", "uitest", "screenCap", "-p", DEVICE_SCREENCAP_PATH],
        ),
    )?;

    let temp_path = env::temp_dir().join(format!("screenshot_{}.png", Uuid::new_v4()));
    let temp_str = temp_path.to_string_lossy().into_owned();
    run(
        "hdc",
        &hdc_args(device_id, &["file", "recv", DEVICE_SCREENCAP_PATH, &temp_str]),
    )?;

    let result = match image::open(&temp_path) {
        Ok(img) => {
            let (width, height) = (img.width(), img.height());
            let mut buffer = Cursor::new(Vec::new());
            match img.write_to(&mut buffer, image::ImageFormat::Png) {
                Ok(()) => Ok(Screenshot::new(
                    STANDARD.encode(buffer.into_inner()),
                    width,
                    height,
                    false,
                )),
                Err(e) => Err(DeviceError::Screenshot(e.to_string())),
            }
        }
        Err(e) => Err(DeviceError::Screenshot(e.to_string())),
    };

    let _ = fs::remove_file(&temp_path);
    result
}

/// Foreground app label from the window manager dump.
pub(super) fn current_app(device_id: Option<&str>) -> String {
    let output = match run(
        "hdc",
        &hdc_args(
            device_id,
            &["shell", "hidumper", "-s", "WindowManagerService", "-a", "-a"],
        ),
    ) {
        Ok(o) => o,
        Err(e) => {
            tracing::debug!("hidumper failed: {e}");
            return "System Home".to_string();
        }
    };

    let stdout = output.stdout;
    for (label, package) in APP_PACKAGES.iter() {
        if stdout.contains(*package) {
            return label.to_string();
        }
    }

    "System Home".to_string()
}

pub(super) fn tap(x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError> {
    run(
        "hdc",
        &hdc_args(
            device_id,
            &[
                "shell",
                "uitest",
                "uiInput",
                "click",
                &x.to_string(),
                &y.to_string(),
            ],
        ),
    )?;
    settle();
    Ok(())
}

pub(super) fn double_tap(x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError> {
    run(
        "hdc",
        &hdc_args(
            device_id,
            &[
                "shell",
                "uitest",
                "uiInput",
                "doubleClick",
                &x.to_string(),
                &y.to_string(),
            ],
        ),
    )?;
    settle();
    Ok(())
}

pub(super) fn long_press(x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError> {
    run(
        "hdc",
        &hdc_args(
            device_id,
            &[
                "shell",
                "uitest",
                "uiInput",
                "longClick",
                &x.to_string(),
                &y.to_string(),
            ],
        ),
    )?;
    settle();
    Ok(())
}

/// `uiInput swipe` takes a velocity in px/s rather than a duration; derive
/// it from the gesture distance and the configured duration.
pub(super) fn swipe(
    start_x: i32,
    start_y: i32,
    end_x: i32,
    end_y: i32,
    duration_ms: Option<u64>,
    device_id: Option<&str>,
) -> Result<(), DeviceError> {
    let duration = duration_ms.unwrap_or(TIMING_CONFIG.device.swipe_duration_ms).max(1);
    let dx = (start_x - end_x) as f64;
    let dy = (start_y - end_y) as f64;
    let distance = (dx * dx + dy * dy).sqrt();
    let velocity = ((distance * 1000.0 / duration as f64) as i64).clamp(200, 40000);

    run(
        "hdc",
        &hdc_args(
            device_id,
            &[
                "shell",
                "uitest",
                "uiInput",
                "swipe",
                &start_x.to_string(),
                &start_y.to_string(),
                &end_x.to_string(),
                &end_y.to_string(),
                &velocity.to_string(),
            ],
        ),
    )?;
    settle();
    Ok(())
}

pub(super) fn back(device_id: Option<&str>) -> Result<(), DeviceError> {
    key_event(KEY_BACK, device_id)?;
    settle();
    Ok(())
}

pub(super) fn home(device_id: Option<&str>) -> Result<(), DeviceError> {
    key_event(KEY_HOME, device_id)?;
    settle();
    Ok(())
}

pub(super) fn send_key(code: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
    match harmony_key_code(code) {
        Some(mapped) => key_event(mapped, device_id)?,
        None if is_harmony_numeric_code(code) => key_event(code, device_id)?,
        None => {
            // Unmapped keys fall back to the Android-style command.
            run(
                "hdc",
                &hdc_args(device_id, &["shell", "input", "keyevent", code]),
            )?;
        }
    }
    settle();
    Ok(())
}

fn key_event(code: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
    run(
        "hdc",
        &hdc_args(device_id, &["shell", "uitest", "uiInput", "keyEvent", code]),
    )?;
    Ok(())
}

fn key_combo(first: &str, second: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
    run(
        "hdc",
        &hdc_args(
            device_id,
            &["shell", "uitest", "uiInput", "keyEvent", first, second],
        ),
    )?;
    Ok(())
}

/// `uiInput inputText` types Unicode directly; no IME swap is needed.
pub(super) fn type_text(text: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
    if text.is_empty() {
        return Ok(());
    }
    run(
        "hdc",
        &hdc_args(device_id, &["shell", "uitest", "uiInput", "inputText", text]),
    )?;
    Ok(())
}

/// Select-all then delete in the focused field.
pub(super) fn clear_text(device_id: Option<&str>) -> Result<(), DeviceError> {
    key_combo(KEY_CTRL_LEFT, KEY_A, device_id)?;
    key_event(KEY_DEL, device_id)?;
    Ok(())
}

/// Start an app by bundle name through the ability manager.
pub(super) fn launch_app(label: &str, device_id: Option<&str>) -> Result<bool, DeviceError> {
    let package = match get_package_name(label) {
        Some(p) => p,
        None => return Ok(false),
    };

    run(
        "hdc",
        &hdc_args(
            device_id,
            &["shell", "aa", "start", "-b", package, "-a", "EntryAbility"],
        ),
    )?;
    settle();
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hdc_args_with_and_without_device() {
        assert_eq!(hdc_args(None, &["shell"]), vec!["shell"]);
        assert_eq!(
            hdc_args(Some("abc123"), &["shell"]),
            vec!["-t", "abc123", "shell"]
        );
    }

    #[test]
    fn test_enter_maps_to_2054() {
        assert_eq!(harmony_key_code("KEYCODE_ENTER"), Some("2054"));
        assert_eq!(harmony_key_code("66"), Some("2054"));
    }

    #[test]
    fn test_unmapped_key_has_no_harmony_code() {
        assert_eq!(harmony_key_code("KEYCODE_VOLUME_UP"), None);
        assert_eq!(harmony_key_code("24"), None);
    }
}
