//! Action interpreter: maps action records onto device driver calls.

use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use crate::config::TIMING_CONFIG;
use crate::device::{device_driver, DeviceError};

/// Relative coordinates run 0-999; the scaling divisor is exactly 1000 for
/// compatibility with model outputs that use 0-1000 inclusive.
pub const COORDINATE_DIVISOR: f64 = 1000.0;

/// Largest accepted relative coordinate.
pub const COORDINATE_MAX: i64 = 999;

/// Wait durations above this are clamped so a step stays bounded.
const MAX_WAIT_SECS: f64 = 60.0;

/// Result of an action execution.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub success: bool,
    pub should_finish: bool,
    pub message: Option<String>,
    pub requires_confirmation: bool,
}

impl ActionResult {
    pub fn success() -> Self {
        Self {
            success: true,
            should_finish: false,
            message: None,
            requires_confirmation: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            should_finish: false,
            message: Some(message.into()),
            requires_confirmation: false,
        }
    }

    pub fn finish(message: Option<String>) -> Self {
        Self {
            success: true,
            should_finish: true,
            message,
            requires_confirmation: false,
        }
    }
}

/// Callback invoked before executing a sensitive tap; returns false to veto.
pub type ConfirmationCallback = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Callback invoked for takeover requests (login, captcha); blocks until the
/// human signals continuation.
pub type TakeoverCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Executes action records against the device.
pub struct ActionHandler {
    device_id: Option<String>,
    confirmation_callback: ConfirmationCallback,
    takeover_callback: TakeoverCallback,
}

impl ActionHandler {
    pub fn new(
        device_id: Option<String>,
        confirmation_callback: Option<ConfirmationCallback>,
        takeover_callback: Option<TakeoverCallback>,
    ) -> Self {
        Self {
            device_id,
            confirmation_callback: confirmation_callback
                .unwrap_or_else(|| Box::new(default_confirmation)),
            takeover_callback: takeover_callback.unwrap_or_else(|| Box::new(default_takeover)),
        }
    }

    /// Execute an action record against the current screen dimensions.
    ///
    /// Never panics or propagates: every failure is reported inside the
    /// returned [`ActionResult`].
    pub fn execute(&self, action: &Value, screen_width: u32, screen_height: u32) -> ActionResult {
        let action_type = action
            .get("_metadata")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        if action_type == "finish" {
            let message = action
                .get("message")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            return ActionResult::finish(message);
        }

        if action_type != "do" {
            return ActionResult {
                success: false,
                should_finish: true,
                message: Some(format!("Unknown action type: {action_type}")),
                requires_confirmation: false,
            };
        }

        let action_name = action.get("action").and_then(|v| v.as_str()).unwrap_or("");

        let result = match action_name {
            "Launch" => self.handle_launch(action),
            "Tap" => self.handle_tap(action, screen_width, screen_height),
            "Type" | "Type_Name" => self.handle_type(action),
            "Swipe" => self.handle_swipe(action, screen_width, screen_height),
            "Back" => self.handle_back(),
            "Home" => self.handle_home(),
            "Double Tap" => self.handle_double_tap(action, screen_width, screen_height),
            "Long Press" => self.handle_long_press(action, screen_width, screen_height),
            "Wait" => self.handle_wait(action),
            "Take_over" => self.handle_takeover(action),
            "Note" => Ok(ActionResult::success()),
            "Call_API" => Ok(ActionResult::success()),
            "Interact" => Ok(ActionResult {
                success: true,
                should_finish: false,
                message: Some("User interaction required".to_string()),
                requires_confirmation: false,
            }),
            other => Ok(ActionResult::failure(format!("Unknown action: {other}"))),
        };

        result.unwrap_or_else(|e| ActionResult::failure(format!("Action failed: {e}")))
    }

    fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    fn handle_launch(&self, action: &Value) -> Result<ActionResult, DeviceError> {
        let app = match action.get("app").and_then(|v| v.as_str()) {
            Some(name) => name,
            None => return Ok(ActionResult::failure("No app name specified")),
        };

        if device_driver().launch_app(app, self.device_id())? {
            Ok(ActionResult::success())
        } else {
            Ok(ActionResult::failure(format!("App not found: {app}")))
        }
    }

    /// A message on a Tap, Double Tap, or Long Press marks a sensitive
    /// operation; the user must confirm before anything reaches the device.
    /// Returns the veto result when the user declines.
    fn confirm_if_sensitive(&self, action: &Value) -> Option<ActionResult> {
        let message = action.get("message").and_then(|v| v.as_str())?;
        if (self.confirmation_callback)(message) {
            None
        } else {
            Some(ActionResult {
                success: false,
                should_finish: true,
                message: Some("User cancelled sensitive operation".to_string()),
                requires_confirmation: true,
            })
        }
    }

    fn handle_tap(
        &self,
        action: &Value,
        width: u32,
        height: u32,
    ) -> Result<ActionResult, DeviceError> {
        if let Some(veto) = self.confirm_if_sensitive(action) {
            return Ok(veto);
        }

        let (x, y) = match element_pixels(action, "element", width, height) {
            Ok(coords) => coords,
            Err(result) => return Ok(result),
        };
        device_driver().tap(x, y, self.device_id())?;
        Ok(ActionResult::success())
    }

    /// Swap to the ADB keyboard, clear, type, restore. The IME session is a
    /// scoped acquisition: the previous keyboard is restored on every exit
    /// path, including transport errors mid-sequence.
    fn handle_type(&self, action: &Value) -> Result<ActionResult, DeviceError> {
        let text = action.get("text").and_then(|v| v.as_str()).unwrap_or("");
        let timing = &TIMING_CONFIG.action;

        let session = ImeSession::acquire(self.device_id())?;
        thread::sleep(timing.keyboard_switch_delay);

        device_driver().clear_text(self.device_id())?;
        thread::sleep(timing.text_clear_delay);

        device_driver().type_text(text, self.device_id())?;
        thread::sleep(timing.text_input_delay);

        session.restore()?;
        thread::sleep(timing.keyboard_restore_delay);

        Ok(ActionResult::success())
    }

    fn handle_swipe(
        &self,
        action: &Value,
        width: u32,
        height: u32,
    ) -> Result<ActionResult, DeviceError> {
        let (start_x, start_y) = match element_pixels(action, "start", width, height) {
            Ok(coords) => coords,
            Err(result) => return Ok(result),
        };
        let (end_x, end_y) = match element_pixels(action, "end", width, height) {
            Ok(coords) => coords,
            Err(result) => return Ok(result),
        };

        device_driver().swipe(start_x, start_y, end_x, end_y, None, self.device_id())?;
        Ok(ActionResult::success())
    }

    fn handle_back(&self) -> Result<ActionResult, DeviceError> {
        device_driver().back(self.device_id())?;
        Ok(ActionResult::success())
    }

    fn handle_home(&self) -> Result<ActionResult, DeviceError> {
        device_driver().home(self.device_id())?;
        Ok(ActionResult::success())
    }

    fn handle_double_tap(
        &self,
        action: &Value,
        width: u32,
        height: u32,
    ) -> Result<ActionResult, DeviceError> {
        if let Some(veto) = self.confirm_if_sensitive(action) {
            return Ok(veto);
        }

        let (x, y) = match element_pixels(action, "element", width, height) {
            Ok(coords) => coords,
            Err(result) => return Ok(result),
        };
        device_driver().double_tap(x, y, self.device_id())?;
        Ok(ActionResult::success())
    }

    fn handle_long_press(
        &self,
        action: &Value,
        width: u32,
        height: u32,
    ) -> Result<ActionResult, DeviceError> {
        if let Some(veto) = self.confirm_if_sensitive(action) {
            return Ok(veto);
        }

        let (x, y) = match element_pixels(action, "element", width, height) {
            Ok(coords) => coords,
            Err(result) => return Ok(result),
        };
        device_driver().long_press(x, y, None, self.device_id())?;
        Ok(ActionResult::success())
    }

    /// Sleep on the host, not on the device.
    fn handle_wait(&self, action: &Value) -> Result<ActionResult, DeviceError> {
        let duration_str = action
            .get("duration")
            .and_then(|v| v.as_str())
            .unwrap_or("1 seconds");

        let duration = parse_wait_duration(duration_str);
        thread::sleep(Duration::from_secs_f64(duration));
        Ok(ActionResult::success())
    }

    /// Hand control to the human; the loop continues after they signal.
    fn handle_takeover(&self, action: &Value) -> Result<ActionResult, DeviceError> {
        let message = action
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("User intervention required");

        (self.takeover_callback)(message);
        Ok(ActionResult::success())
    }
}

/// Parse a Wait duration of the form "`<float> seconds`"; 1.0 on failure.
fn parse_wait_duration(raw: &str) -> f64 {
    let duration: f64 = raw.replace("seconds", "").trim().parse().unwrap_or(1.0);
    duration.clamp(0.0, MAX_WAIT_SECS)
}

/// Extract a coordinate pair field and scale it to pixels; a missing or
/// out-of-range pair becomes a failed-action result the model can react to.
fn element_pixels(
    action: &Value,
    key: &str,
    width: u32,
    height: u32,
) -> Result<(i32, i32), ActionResult> {
    let coords = action
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| {
                    v.as_i64()
                        .or_else(|| v.as_f64().map(|f| f.round() as i64))
                })
                .collect::<Vec<i64>>()
        })
        .unwrap_or_default();

    if coords.len() < 2 {
        return Err(ActionResult::failure(format!("Invalid {key} coordinates")));
    }

    convert_relative_to_absolute(coords[0], coords[1], width, height)
        .map_err(|msg| ActionResult::failure(format!("Coordinate error for {key}: {msg}")))
}

/// Scale a relative pair (0-999) to absolute pixels:
/// `pixel = round(rel / 1000 * screen_dim)`, clamped below the dimension.
pub fn convert_relative_to_absolute(
    rel_x: i64,
    rel_y: i64,
    screen_width: u32,
    screen_height: u32,
) -> Result<(i32, i32), String> {
    for (value, axis) in [(rel_x, "X"), (rel_y, "Y")] {
        if !(0..=COORDINATE_MAX).contains(&value) {
            return Err(format!(
                "{axis} coordinate {value} is out of range; expected an integer in [0, {COORDINATE_MAX}]"
            ));
        }
    }

    let x = ((rel_x as f64 / COORDINATE_DIVISOR) * screen_width as f64).round() as i64;
    let y = ((rel_y as f64 / COORDINATE_DIVISOR) * screen_height as f64).round() as i64;

    Ok((
        x.min(screen_width as i64 - 1) as i32,
        y.min(screen_height as i64 - 1) as i32,
    ))
}

/// Default confirmation callback using console input.
fn default_confirmation(message: &str) -> bool {
    print!("Sensitive operation: {}\nConfirm? (Y/N): ", message);
    let _ = io::stdout().flush();

    let stdin = io::stdin();
    let mut line = String::new();
    let _ = stdin.lock().read_line(&mut line);

    line.trim().eq_ignore_ascii_case("y")
}

/// Default takeover callback using console input.
fn default_takeover(message: &str) {
    print!(
        "{}\nPress Enter after completing manual operation...",
        message
    );
    let _ = io::stdout().flush();

    let stdin = io::stdin();
    let mut line = String::new();
    let _ = stdin.lock().read_line(&mut line);
}

/// Scoped ownership of the device IME. Restores the previous keyboard when
/// dropped, so an error between swap and restore cannot leave the ADB
/// keyboard active past the handler.
struct ImeSession<'a> {
    previous: String,
    device_id: Option<&'a str>,
    restored: bool,
}

impl<'a> ImeSession<'a> {
    fn acquire(device_id: Option<&'a str>) -> Result<Self, DeviceError> {
        let previous = device_driver().detect_and_set_adb_keyboard(device_id)?;
        Ok(Self {
            previous,
            device_id,
            restored: false,
        })
    }

    fn restore(mut self) -> Result<(), DeviceError> {
        self.restored = true;
        device_driver().restore_keyboard(&self.previous, self.device_id)
    }
}

impl Drop for ImeSession<'_> {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(e) = device_driver().restore_keyboard(&self.previous, self.device_id) {
                tracing::warn!("failed to restore keyboard: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::parser::{do_action, finish_action};
    use serde_json::json;

    #[test]
    fn test_action_result_constructors() {
        let success = ActionResult::success();
        assert!(success.success);
        assert!(!success.should_finish);

        let finish = ActionResult::finish(Some("Done".to_string()));
        assert!(finish.success);
        assert!(finish.should_finish);
    }

    #[test]
    fn test_convert_relative_to_absolute_rounds() {
        // 500/1000 * 1080 = 540, 500/1000 * 1920 = 960
        assert_eq!(
            convert_relative_to_absolute(500, 500, 1080, 1920).unwrap(),
            (540, 960)
        );
        // 333/1000 * 1080 = 359.64 -> 360
        assert_eq!(
            convert_relative_to_absolute(333, 0, 1080, 1920).unwrap().0,
            360
        );
    }

    #[test]
    fn test_convert_relative_corners_stay_in_bounds() {
        let (x, y) = convert_relative_to_absolute(0, 0, 1080, 1920).unwrap();
        assert_eq!((x, y), (0, 0));

        // On small screens round(999/1000 * dim) can reach dim; the result
        // must still be strictly below it.
        for (w, h) in [(1080u32, 1920u32), (100, 100), (720, 1280), (1, 1)] {
            let (x, y) = convert_relative_to_absolute(999, 999, w, h).unwrap();
            assert!(x >= 0 && (x as u32) < w, "x={x} out of [0,{w})");
            assert!(y >= 0 && (y as u32) < h, "y={y} out of [0,{h})");
        }
    }

    #[test]
    fn test_convert_relative_rejects_out_of_range() {
        assert!(convert_relative_to_absolute(-1, 0, 1080, 1920).is_err());
        assert!(convert_relative_to_absolute(0, 1000, 1080, 1920).is_err());
        assert!(convert_relative_to_absolute(5000, 5000, 1080, 1920).is_err());
    }

    #[test]
    fn test_scaling_round_trip_within_one_pixel() {
        let (w, h) = (1080u32, 2400u32);
        for rel in [0i64, 1, 250, 499, 500, 750, 998, 999] {
            let (px, _) = convert_relative_to_absolute(rel, 0, w, h).unwrap();
            let back = ((px as f64) / w as f64 * COORDINATE_DIVISOR).round() as i64;
            assert!((back - rel).abs() <= 1, "rel={rel} came back as {back}");
        }
    }

    #[test]
    fn test_confirmation_veto_finishes_task() {
        let handler = ActionHandler::new(None, Some(Box::new(|_msg| false)), None);
        let action = do_action(
            "Tap",
            &[
                ("element", json!([300, 600])),
                ("message", json!("confirm payment")),
            ],
        );

        let result = handler.execute(&action, 1080, 1920);
        assert!(!result.success);
        assert!(result.should_finish);
        assert_eq!(
            result.message.as_deref(),
            Some("User cancelled sensitive operation")
        );
    }

    #[test]
    fn test_confirmation_veto_covers_double_tap() {
        let handler = ActionHandler::new(None, Some(Box::new(|_msg| false)), None);
        let action = do_action(
            "Double Tap",
            &[
                ("element", json!([400, 400])),
                ("message", json!("confirm transfer")),
            ],
        );

        let result = handler.execute(&action, 1080, 1920);
        assert!(!result.success);
        assert!(result.should_finish);
        assert_eq!(
            result.message.as_deref(),
            Some("User cancelled sensitive operation")
        );
    }

    #[test]
    fn test_confirmation_veto_covers_long_press() {
        let handler = ActionHandler::new(None, Some(Box::new(|_msg| false)), None);
        let action = do_action(
            "Long Press",
            &[
                ("element", json!([200, 800])),
                ("message", json!("delete account")),
            ],
        );

        let result = handler.execute(&action, 1080, 1920);
        assert!(!result.success);
        assert!(result.should_finish);
        assert_eq!(
            result.message.as_deref(),
            Some("User cancelled sensitive operation")
        );
    }

    #[test]
    fn test_confirmation_message_reaches_callback() {
        use std::sync::{Arc, Mutex};

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let handler = ActionHandler::new(
            None,
            Some(Box::new(move |msg| {
                seen_clone.lock().unwrap().push(msg.to_string());
                false
            })),
            None,
        );

        let action = do_action(
            "Tap",
            &[
                ("element", json!([300, 600])),
                ("message", json!("confirm payment")),
            ],
        );
        handler.execute(&action, 1080, 1920);

        assert_eq!(seen.lock().unwrap().as_slice(), ["confirm payment"]);
    }

    #[test]
    fn test_finish_action_reports_message() {
        let handler = ActionHandler::new(None, None, None);
        let result = handler.execute(&finish_action(Some("task done")), 1080, 1920);
        assert!(result.success);
        assert!(result.should_finish);
        assert_eq!(result.message.as_deref(), Some("task done"));
    }

    #[test]
    fn test_unknown_metadata_finishes_with_failure() {
        let handler = ActionHandler::new(None, None, None);
        let result = handler.execute(&json!({"_metadata": "error"}), 1080, 1920);
        assert!(!result.success);
        assert!(result.should_finish);
    }

    #[test]
    fn test_reserved_actions_are_noops() {
        let handler = ActionHandler::new(None, None, None);

        let note = handler.execute(&do_action("Note", &[]), 1080, 1920);
        assert!(note.success && !note.should_finish);

        let api = handler.execute(&do_action("Call_API", &[]), 1080, 1920);
        assert!(api.success && !api.should_finish);

        let interact = handler.execute(&do_action("Interact", &[]), 1080, 1920);
        assert!(interact.success);
        assert_eq!(interact.message.as_deref(), Some("User interaction required"));
    }

    #[test]
    fn test_tap_with_out_of_range_coordinates_fails_without_finishing() {
        let handler = ActionHandler::new(None, None, None);
        let action = do_action("Tap", &[("element", json!([1500, 500]))]);

        let result = handler.execute(&action, 1080, 1920);
        assert!(!result.success);
        assert!(!result.should_finish);
        assert!(result.message.unwrap().contains("out of range"));
    }

    #[test]
    fn test_tap_with_missing_coordinates_fails() {
        let handler = ActionHandler::new(None, None, None);
        let result = handler.execute(&do_action("Tap", &[]), 1080, 1920);
        assert!(!result.success);
        assert!(result.message.unwrap().contains("element"));
    }

    #[test]
    fn test_parse_wait_duration() {
        assert_eq!(parse_wait_duration("2 seconds"), 2.0);
        assert_eq!(parse_wait_duration("1.5 seconds"), 1.5);
        assert_eq!(parse_wait_duration("not a number"), 1.0);
        // Oversized waits are clamped.
        assert_eq!(parse_wait_duration("999 seconds"), MAX_WAIT_SECS);
    }
}
