//! Android transport over the host `adb` binary.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::io::Cursor;
use std::thread;
use std::{env, fs};
use uuid::Uuid;

use crate::config::{get_package_name, APP_PACKAGES, TIMING_CONFIG};

use super::shell::run;
use super::{DeviceError, Screenshot};

/// The custom IME used for reliable Unicode text entry.
/// See: https://github.com/senzhk/ADBKeyBoard
pub const ADB_KEYBOARD_IME: &str = "com.android.adbkeyboard/.AdbIME";

const DEVICE_SCREENCAP_PATH: &str = "/sdcard/tmp.png";

fn adb_args(device_id: Option<&str>, tail: &[&str]) -> Vec<String> {
    let mut args = Vec::with_capacity(tail.len() + 2);
    if let Some(id) = device_id {
        args.push("-s".to_string());
        args.push(id.to_string());
    }
    args.extend(tail.iter().map(|s| s.to_string()));
    args
}

fn settle() {
    thread::sleep(TIMING_CONFIG.device.settle_delay);
}

/// Capture a frame via `screencap` on the device, then pull and decode it.
///
/// Sensitive screens (payment pages) make screencap report a failure on
/// stdout while exiting zero; those yield the black fallback frame.
pub(super) fn screenshot(device_id: Option<&str>) -> Result<Screenshot, DeviceError> {
    let capture = run(
        "adb",
        &adb_args(device_id, &["shell", "screencap", "-p", DEVICE_SCREENCAP_PATH]),
    )?;

    let combined = capture.combined();
    if combined.contains("Status: -1") || combined.contains("Failed") {
        return Ok(Screenshot::fallback(true));
    }

    let temp_path = env::temp_dir().join(format!("screenshot_{}.png", Uuid::new_v4()));
    let temp_str = temp_path.to_string_lossy().into_owned();
    run(
        "adb",
        &adb_args(device_id, &["pull", DEVICE_SCREENCAP_PATH, &temp_str]),
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

/// Foreground app label derived from `dumpsys window` focus lines.
pub(super) fn current_app(device_id: Option<&str>) -> String {
    let output = match run("adb", &adb_args(device_id, &["shell", "dumpsys", "window"])) {
        Ok(o) => o,
        Err(e) => {
            tracing::debug!("dumpsys window failed: {e}");
            return "System Home".to_string();
        }
    };

    for line in output.stdout.lines() {
        if line.contains("mCurrentFocus") || line.contains("mFocusedApp") {
            for (label, package) in APP_PACKAGES.iter() {
                if line.contains(*package) {
                    return label.to_string();
                }
            }
        }
    }

    "System Home".to_string()
}

pub(super) fn tap(x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError> {
    run(
        "adb",
        &adb_args(
            device_id,
            &["shell", "input", "tap", &x.to_string(), &y.to_string()],
        ),
    )?;
    settle();
    Ok(())
}

pub(super) fn double_tap(x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError> {
    let args = adb_args(
        device_id,
        &["shell", "input", "tap", &x.to_string(), &y.to_string()],
    );
    run("adb", &args)?;
    thread::sleep(TIMING_CONFIG.device.double_tap_interval);
    run("adb", &args)?;
    settle();
    Ok(())
}

/// Long press is a zero-distance swipe held for the press duration.
pub(super) fn long_press(
    x: i32,
    y: i32,
    duration_ms: Option<u64>,
    device_id: Option<&str>,
) -> Result<(), DeviceError> {
    let duration = duration_ms.unwrap_or(TIMING_CONFIG.device.long_press_duration_ms);
    run(
        "adb",
        &adb_args(
            device_id,
            &[
                "shell",
                "input",
                "swipe",
                &x.to_string(),
                &y.to_string(),
                &x.to_string(),
                &y.to_string(),
                &duration.to_string(),
            ],
        ),
    )?;
    settle();
    Ok(())
}

pub(super) fn swipe(
    start_x: i32,
    start_y: i32,
    end_x: i32,
    end_y: i32,
    duration_ms: Option<u64>,
    device_id: Option<&str>,
) -> Result<(), DeviceError> {
    let duration = duration_ms.unwrap_or(TIMING_CONFIG.device.swipe_duration_ms);
    run(
        "adb",
        &adb_args(
            device_id,
            &[
                "shell",
                "input",
                "swipe",
                &start_x.to_string(),
                &start_y.to_string(),
                &end_x.to_string(),
                &end_y.to_string(),
                &duration.to_string(),
            ],
        ),
    )?;
    settle();
    Ok(())
}

pub(super) fn back(device_id: Option<&str>) -> Result<(), DeviceError> {
    run(
        "adb",
        &adb_args(device_id, &["shell", "input", "keyevent", "4"]),
    )?;
    settle();
    Ok(())
}

pub(super) fn home(device_id: Option<&str>) -> Result<(), DeviceError> {
    run(
        "adb",
        &adb_args(device_id, &["shell", "input", "keyevent", "KEYCODE_HOME"]),
    )?;
    settle();
    Ok(())
}

pub(super) fn send_key(code: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
    run(
        "adb",
        &adb_args(device_id, &["shell", "input", "keyevent", code]),
    )?;
    settle();
    Ok(())
}

/// Type text into the focused field through the ADB keyboard broadcast.
/// Base64 framing keeps Unicode (e.g. Chinese) intact across the shell.
pub(super) fn type_text(text: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
    let encoded = STANDARD.encode(text.as_bytes());
    run(
        "adb",
        &adb_args(
            device_id,
            &[
                "shell",
                "am",
                "broadcast",
                "-a",
                "ADB_INPUT_B64",
                "--es",
                "msg",
                &encoded,
            ],
        ),
    )?;
    Ok(())
}

pub(super) fn clear_text(device_id: Option<&str>) -> Result<(), DeviceError> {
    run(
        "adb",
        &adb_args(
            device_id,
            &["shell", "am", "broadcast", "-a", "ADB_CLEAR_TEXT"],
        ),
    )?;
    Ok(())
}

/// Capture the current IME and switch to the ADB keyboard if needed.
/// Returns the previous IME id for later restoration.
pub(super) fn detect_and_set_adb_keyboard(
    device_id: Option<&str>,
) -> Result<String, DeviceError> {
    let current_ime = run(
        "adb",
        &adb_args(
            device_id,
            &["shell", "settings", "get", "secure", "default_input_method"],
        ),
    )
    .map(|o| o.combined().trim().to_string())
    .unwrap_or_default();

    if !current_ime.contains(ADB_KEYBOARD_IME) {
        run(
            "adb",
            &adb_args(device_id, &["shell", "ime", "set", ADB_KEYBOARD_IME]),
        )?;
    }

    // Warm up the keyboard
    type_text("", device_id)?;

    Ok(current_ime)
}

pub(super) fn restore_keyboard(ime: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
    if ime.is_empty() || ime.contains(ADB_KEYBOARD_IME) {
        return Ok(());
    }

    run("adb", &adb_args(device_id, &["shell", "ime", "set", ime]))?;
    Ok(())
}

/// Launch an app by display label via a launcher intent.
pub(super) fn launch_app(label: &str, device_id: Option<&str>) -> Result<bool, DeviceError> {
    let package = match get_package_name(label) {
        Some(p) => p,
        None => return Ok(false),
    };

    run(
        "adb",
        &adb_args(
            device_id,
            &[
                "shell",
                "monkey",
                "-p",
                package,
                "-c",
                "android.intent.category.LAUNCHER",
                "1",
            ],
        ),
    )?;
    settle();
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adb_args_with_and_without_device() {
        assert_eq!(adb_args(None, &["shell", "input"]), vec!["shell", "input"]);
        assert_eq!(
            adb_args(Some("emulator-5554"), &["shell"]),
            vec!["-s", "emulator-5554", "shell"]
        );
    }

    #[test]
    fn test_launch_app_unknown_label() {
        assert!(!launch_app("UnknownApp123", None).unwrap_or(true));
    }

    #[test]
    fn test_type_text_base64_framing() {
        let text = "你好, world";
        let encoded = STANDARD.encode(text.as_bytes());
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), text);
    }
}
