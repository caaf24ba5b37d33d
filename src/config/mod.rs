//! Configuration module: prompts, app table, timing, console messages.

mod apps;
mod i18n;
mod prompts;
mod thirdparty;
mod timing;

pub use apps::{get_app_label, get_package_name, APP_PACKAGES};
pub use i18n::{get_messages, Messages, MESSAGES_EN, MESSAGES_ZH};
pub use prompts::{get_native_system_prompt, SYSTEM_PROMPT_EN, SYSTEM_PROMPT_ZH};
pub use thirdparty::{
    get_thirdparty_prompt, THIRDPARTY_MINIMAL_PROMPT, THIRDPARTY_MINIMAL_PROMPT_WITH_THINKING,
};
pub use timing::{
    ActionTimingConfig, ConnectionTimingConfig, DeviceTimingConfig, TimingConfig, TIMING_CONFIG,
};

/// Get the system prompt for the selected mode.
///
/// Third-party mode keeps the prompt compact; `thirdparty_thinking` picks the
/// `<think>/<answer>` shape. Some gateways silently strip `<think>` tags or
/// return empty replies for them, so neither shape is hardcoded.
pub fn get_system_prompt(lang: &str, use_thirdparty: bool, thirdparty_thinking: bool) -> String {
    if use_thirdparty {
        get_thirdparty_prompt(thirdparty_thinking).to_string()
    } else {
        get_native_system_prompt(lang)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_system_prompt_modes() {
        let native = get_system_prompt("cn", false, true);
        assert!(native.contains("今天的日期是"));

        let tp = get_system_prompt("cn", true, true);
        assert!(tp.contains("<think>"));

        let tp_plain = get_system_prompt("cn", true, false);
        assert!(!tp_plain.contains("<think>"));
    }
}
