//! Construction of chat-completion messages.
//!
//! Wire shape: each message is `{role, content}` where `content` is either a
//! plain string or an ordered list of `{type: "text"|"image_url", ...}`
//! parts. Screenshots ride along as `data:image/png;base64,<payload>` URLs.

use serde_json::{json, Value};

/// System message with plain string content.
pub fn system_message(text: &str) -> Value {
    json!({
        "role": "system",
        "content": text,
    })
}

/// User message carrying text and, for the current step, the screen frame.
pub fn user_message(text: &str, image_base64: Option<&str>) -> Value {
    let mut parts = vec![json!({ "type": "text", "text": text })];

    if let Some(data) = image_base64 {
        parts.push(json!({
            "type": "image_url",
            "image_url": { "url": format!("data:image/png;base64,{data}") },
        }));
    }

    json!({
        "role": "user",
        "content": parts,
    })
}

/// Assistant message echoing a model reply back into the thread.
pub fn assistant_message(text: &str) -> Value {
    json!({
        "role": "assistant",
        "content": text,
    })
}

/// Drop every image part from a message, leaving its text parts in order.
///
/// Applied to a user turn once its request has completed, so only the most
/// recent step carries an image and context growth stays O(steps).
pub fn strip_images(message: &mut Value) {
    if let Some(Value::Array(parts)) = message.get_mut("content") {
        parts.retain(|part| part.get("type").and_then(Value::as_str) == Some("text"));
    }
}

/// Screen-state summary shown to the model alongside each frame.
pub fn screen_info(current_app: &str) -> String {
    json!({ "current_app": current_app }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_and_assistant_messages_use_string_content() {
        let sys = system_message("be helpful");
        assert_eq!(sys["role"], "system");
        assert_eq!(sys["content"], "be helpful");

        let assistant = assistant_message("do(action=\"Back\")");
        assert_eq!(assistant["role"], "assistant");
        assert_eq!(assistant["content"], "do(action=\"Back\")");
    }

    #[test]
    fn test_user_message_without_image_is_single_text_part() {
        let msg = user_message("打开微信", None);
        assert_eq!(msg["role"], "user");

        let parts = msg["content"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "打开微信");
    }

    #[test]
    fn test_user_message_embeds_image_as_data_url() {
        let msg = user_message("screen below", Some("iVBORw0KGgo="));
        let parts = msg["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);

        let url = parts[1]["image_url"]["url"].as_str().unwrap();
        assert_eq!(url, "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn test_strip_images_leaves_text_parts_only() {
        let mut msg = user_message("task text", Some("frame"));
        strip_images(&mut msg);

        let parts = msg["content"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["type"], "text");

        // Idempotent, and harmless on string-content messages.
        strip_images(&mut msg);
        assert_eq!(msg["content"].as_array().unwrap().len(), 1);
        let mut sys = system_message("prompt");
        strip_images(&mut sys);
        assert_eq!(sys["content"], "prompt");
    }

    #[test]
    fn test_screen_info_names_the_foreground_app() {
        let info = screen_info("微信");
        assert_eq!(info, r#"{"current_app":"微信"}"#);
    }
}
