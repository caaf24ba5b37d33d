//! The agent loop: perception, decision, actuation.

use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use std::collections::VecDeque;
use thiserror::Error;

use crate::actions::{
    do_action, parse_action, ActionHandler, ConfirmationCallback, TakeoverCallback,
};
use crate::config::{get_messages, get_system_prompt};
use crate::device::device_driver;
use crate::model::{
    assistant_message, screen_info, strip_images, system_message, user_message, ModelClient,
    ModelConfig, ModelResponse,
};

/// Capacity of the recent-action signature ring.
const SIGNATURE_RING_CAPACITY: usize = 12;

/// Window examined for repeated / alternating action patterns.
const LOOP_WINDOW: usize = 6;

/// Frozen-screen steps before a stuck warning is raised.
const STUCK_SCREEN_THRESHOLD: u32 = 2;

/// Frozen-screen steps before the third-party override kicks in.
const OVERRIDE_UNCHANGED_THRESHOLD: u32 = 6;

/// Accumulated warnings before the third-party override kicks in.
const OVERRIDE_WARNING_THRESHOLD: u32 = 2;

const TAKEOVER_OVERRIDE_MESSAGE: &str =
    "检测到长时间无界面变化且动作可能循环，请手动完成当前步骤，完成后按回车继续。";

const STUCK_HINT: &str = "\n\n你可能卡住了（界面长时间未变化或动作重复）。\
请改变策略：例如先返回上一页、滑动页面或使用搜索；\
如需登录/验证码请输出：do(action=\"Take_over\", message=\"需要你手动登录/验证\")。";

/// Agent errors.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Task required for first step")]
    TaskRequired,
}

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Hard step budget for a task.
    pub max_steps: u32,
    /// Device id; None selects the single default device.
    pub device_id: Option<String>,
    /// Prompt language ("cn" or "en").
    pub lang: String,
    /// Custom system prompt; None picks the default for the mode.
    pub system_prompt: Option<String>,
    /// Print step progress to the console.
    pub verbose: bool,
    /// Embed instructions into the user turn for gateways without a
    /// `system` role.
    pub use_thirdparty_prompt: bool,
    /// Third-party mode outputs `<think>/<answer>` instead of bare actions.
    pub thirdparty_thinking: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            device_id: None,
            lang: "cn".to_string(),
            system_prompt: None,
            verbose: true,
            use_thirdparty_prompt: false,
            thirdparty_thinking: true,
        }
    }
}

impl AgentConfig {
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_thirdparty_prompt(mut self, use_thirdparty: bool) -> Self {
        self.use_thirdparty_prompt = use_thirdparty;
        self
    }

    pub fn with_thirdparty_thinking(mut self, thinking: bool) -> Self {
        self.thirdparty_thinking = thinking;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    /// The system prompt for the configured mode.
    pub fn get_system_prompt(&self) -> String {
        self.system_prompt.clone().unwrap_or_else(|| {
            get_system_prompt(
                &self.lang,
                self.use_thirdparty_prompt,
                self.thirdparty_thinking,
            )
        })
    }
}

/// Result of a single agent step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub success: bool,
    pub finished: bool,
    pub action: Option<Value>,
    pub thinking: String,
    pub message: Option<String>,
}

/// Final outcome of a task run.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Final message shown to the caller.
    pub message: String,
    /// Steps consumed.
    pub steps: u32,
    /// The last action that executed, if any.
    pub final_action: Option<Value>,
    /// True when the task ended with a `finish` action from the model.
    pub finished: bool,
}

/// AI-powered agent driving a phone UI to complete natural-language tasks.
///
/// Each step captures the screen, asks the vision-language model for the
/// next action, and executes it. A SHA-1 screen hash and a ring of recent
/// action signatures feed the stuck detector that keeps the loop from
/// burning steps unproductively.
pub struct PhoneAgent {
    model_client: ModelClient,
    agent_config: AgentConfig,
    action_handler: ActionHandler,
    context: Vec<Value>,
    step_count: u32,
    last_screen_hash: Option<String>,
    screen_unchanged_steps: u32,
    recent_action_signatures: VecDeque<String>,
    stuck_warnings: u32,
}

impl PhoneAgent {
    pub fn new(
        model_config: ModelConfig,
        agent_config: AgentConfig,
        confirmation_callback: Option<ConfirmationCallback>,
        takeover_callback: Option<TakeoverCallback>,
    ) -> Self {
        let action_handler = ActionHandler::new(
            agent_config.device_id.clone(),
            confirmation_callback,
            takeover_callback,
        );

        Self {
            model_client: ModelClient::new(model_config),
            agent_config,
            action_handler,
            context: Vec::new(),
            step_count: 0,
            last_screen_hash: None,
            screen_unchanged_steps: 0,
            recent_action_signatures: VecDeque::with_capacity(SIGNATURE_RING_CAPACITY),
            stuck_warnings: 0,
        }
    }

    /// Run the agent until the task finishes or the step budget is spent.
    pub async fn run(&mut self, task: &str) -> TaskOutcome {
        self.reset();

        let mut result = self.execute_step(Some(task), true).await;

        while !result.finished && self.step_count < self.agent_config.max_steps {
            result = self.execute_step(None, false).await;
        }

        if result.finished {
            let finished_by_model = result
                .action
                .as_ref()
                .and_then(|a| a.get("_metadata"))
                .and_then(|v| v.as_str())
                .map(|m| m == "finish")
                .unwrap_or(false);
            TaskOutcome {
                message: result
                    .message
                    .unwrap_or_else(|| "Task completed".to_string()),
                steps: self.step_count,
                final_action: result.action,
                finished: finished_by_model,
            }
        } else {
            TaskOutcome {
                message: "Max steps reached".to_string(),
                steps: self.step_count,
                final_action: result.action,
                finished: false,
            }
        }
    }

    /// Execute a single step; useful for manual control or debugging.
    pub async fn step(&mut self, task: Option<&str>) -> Result<StepResult, AgentError> {
        let is_first = self.context.is_empty();

        if is_first && task.is_none() {
            return Err(AgentError::TaskRequired);
        }

        Ok(self.execute_step(task, is_first).await)
    }

    /// Reset all per-task state.
    pub fn reset(&mut self) {
        self.context.clear();
        self.step_count = 0;
        self.last_screen_hash = None;
        self.screen_unchanged_steps = 0;
        self.recent_action_signatures.clear();
        self.stuck_warnings = 0;
    }

    async fn execute_step(&mut self, user_prompt: Option<&str>, is_first: bool) -> StepResult {
        self.step_count += 1;

        let device_id = self.agent_config.device_id.clone();
        let device_id = device_id.as_deref();
        let driver = device_driver();

        let screenshot = match driver.screenshot(device_id) {
            Ok(shot) => shot,
            Err(e) => {
                return StepResult {
                    success: false,
                    finished: true,
                    action: None,
                    thinking: String::new(),
                    message: Some(format!("Device error: {e}")),
                }
            }
        };
        let current_app = driver.current_app(device_id);

        let current_hash = screen_hash(&screenshot.base64_data);
        if self.last_screen_hash.as_deref() == Some(current_hash.as_str()) {
            self.screen_unchanged_steps += 1;
        } else {
            self.screen_unchanged_steps = 0;
        }
        self.last_screen_hash = Some(current_hash);

        // Clearly stuck for a long time: bypass the model and hand over,
        // instead of burning the remaining step budget.
        if should_force_takeover(
            self.agent_config.use_thirdparty_prompt,
            self.screen_unchanged_steps,
            self.stuck_warnings,
        ) {
            let action = do_action("Take_over", &[("message", json!(TAKEOVER_OVERRIDE_MESSAGE))]);
            let result = self
                .action_handler
                .execute(&action, screenshot.width, screenshot.height);
            return StepResult {
                success: result.success,
                finished: result.should_finish,
                action: Some(action),
                thinking: String::new(),
                message: result.message,
            };
        }

        let screen_state = screen_info(&current_app);
        let image = self.model_client.prepare_image(&screenshot.base64_data);
        let user_text = self.build_user_text(user_prompt, &screen_state, is_first);

        if is_first && !self.agent_config.use_thirdparty_prompt {
            self.context
                .push(system_message(&self.agent_config.get_system_prompt()));
        }
        self.context.push(user_message(&user_text, Some(&image)));

        let mut response = match self.model_client.request(&self.context).await {
            Ok(resp) => resp,
            Err(e) => {
                return StepResult {
                    success: false,
                    finished: true,
                    action: None,
                    thinking: String::new(),
                    message: Some(format!("Model error: {e}")),
                }
            }
        };

        // Bounded-context invariant: only the most recent step may carry an
        // image. Strip this step's image now that the request is done.
        if let Some(last) = self.context.last_mut() {
            strip_images(last);
        }

        self.push_assistant_echo(&response);

        // Parse, with one in-band retry for third-party models, which are
        // more likely to emit slightly malformed action code.
        let mut action: Option<Value> = None;
        let mut parse_error: Option<String> = None;
        for attempt in 0..2 {
            match parse_action(&response.action) {
                Ok(parsed) => {
                    action = Some(parsed);
                    parse_error = None;
                    break;
                }
                Err(e) => {
                    tracing::warn!("action parse failed: {e}");
                    parse_error = Some(e.to_string());

                    if attempt == 0 && self.agent_config.use_thirdparty_prompt {
                        let retry_text = format!(
                            "上一步输出的动作代码无法解析。\n原始输出: {}\n解析错误: {}\n\n\
                             请重新输出。优先按规范使用 <think>/<answer>，但必须保证动作可解析；\
                             如果不支持 XML 标签，则直接输出 1 行动作代码。\n示例：\n\
                             <think>点击搜索</think><answer>do(action=\"Tap\", element=[500, 500])</answer>\n\
                             或\nfinish(message=\"任务完成\")",
                            response.action, e
                        );
                        self.context.push(user_message(&retry_text, None));

                        response = match self.model_client.request(&self.context).await {
                            Ok(resp) => resp,
                            Err(e) => {
                                return StepResult {
                                    success: false,
                                    finished: true,
                                    action: None,
                                    thinking: String::new(),
                                    message: Some(format!("Model error: {e}")),
                                }
                            }
                        };
                        self.push_assistant_echo(&response);
                        continue;
                    }
                    break;
                }
            }
        }

        let action = match action {
            Some(a) => a,
            None => {
                return StepResult {
                    success: false,
                    finished: true,
                    action: None,
                    thinking: response.thinking,
                    message: Some(format!(
                        "动作解析失败，无法继续执行：{}",
                        parse_error.unwrap_or_default()
                    )),
                }
            }
        };

        // Track the signature for loop detection before executing.
        self.recent_action_signatures
            .push_back(action_signature(&action));
        while self.recent_action_signatures.len() > SIGNATURE_RING_CAPACITY {
            self.recent_action_signatures.pop_front();
        }
        if self.screen_unchanged_steps >= STUCK_SCREEN_THRESHOLD
            || looks_like_loop(&self.recent_action_signatures)
        {
            self.stuck_warnings += 1;
        }

        if self.agent_config.verbose {
            let msgs = get_messages(&self.agent_config.lang);
            println!("\n{}", "=".repeat(50));
            println!("💭 {}:", msgs.thinking);
            println!("{}", response.thinking);
            println!("{}", "-".repeat(50));
            println!("🎯 {}:", msgs.action);
            println!(
                "{}",
                serde_json::to_string_pretty(&action).unwrap_or_default()
            );
            println!("{}\n", "=".repeat(50));
        }

        let result = self
            .action_handler
            .execute(&action, screenshot.width, screenshot.height);

        if self.agent_config.verbose && !result.success {
            if let Some(ref msg) = result.message {
                println!("⚠️ Action failed: {msg}");
            }
        }

        let finished = action
            .get("_metadata")
            .and_then(|v| v.as_str())
            .map(|m| m == "finish")
            .unwrap_or(false)
            || result.should_finish;

        if finished && self.agent_config.verbose {
            let msgs = get_messages(&self.agent_config.lang);
            let final_message = result
                .message
                .clone()
                .or_else(|| {
                    action
                        .get("message")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                })
                .unwrap_or_else(|| msgs.done.to_string());
            println!("\n🎉 {}", "=".repeat(48));
            println!("✅ {}: {}", msgs.task_completed, final_message);
            println!("{}\n", "=".repeat(50));
        }

        StepResult {
            success: result.success,
            finished,
            message: result.message.or_else(|| {
                action
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            }),
            thinking: response.thinking,
            action: Some(action),
        }
    }

    /// Build the text part of this step's user message.
    fn build_user_text(
        &self,
        user_prompt: Option<&str>,
        screen_info: &str,
        is_first: bool,
    ) -> String {
        if is_first {
            return if self.agent_config.use_thirdparty_prompt {
                // Instructions are embedded into the user turn: some
                // gateways reject the system role outright.
                format!(
                    "{}\n\n---\n任务: {}\n\n{}",
                    self.agent_config.get_system_prompt(),
                    user_prompt.unwrap_or(""),
                    screen_info
                )
            } else {
                format!("{}\n\n{}", user_prompt.unwrap_or(""), screen_info)
            };
        }

        if !self.agent_config.use_thirdparty_prompt {
            return format!("** Screen Info **\n\n{screen_info}");
        }

        // Third-party models get the recent action history spelled out and,
        // when the detector reports trouble, a recovery hint.
        let recent: Vec<&String> = self
            .recent_action_signatures
            .iter()
            .rev()
            .take(LOOP_WINDOW)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let history_text = if recent.is_empty() {
            "(无)".to_string()
        } else {
            recent
                .iter()
                .map(|s| format!("- {s}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let stuck_hints = if self.screen_unchanged_steps >= STUCK_SCREEN_THRESHOLD
            || looks_like_loop(&self.recent_action_signatures)
        {
            STUCK_HINT
        } else {
            ""
        };

        let tail_instruction = if self.agent_config.thirdparty_thinking {
            "按规范输出 <think>/<answer>（think 尽量简短），每步只输出一个动作。"
        } else {
            "只输出一个动作代码，不要解释。"
        };

        format!(
            "继续执行任务。当前屏幕信息：{screen_info}\n\n最近动作(供参考)：\n{history_text}{stuck_hints}\n\n{tail_instruction}"
        )
    }

    /// Echo the assistant turn in the shape the active mode expects.
    fn push_assistant_echo(&mut self, response: &ModelResponse) {
        let content =
            if self.agent_config.use_thirdparty_prompt && !self.agent_config.thirdparty_thinking {
                response.action.clone()
            } else {
                format!(
                    "<think>{}</think><answer>{}</answer>",
                    response.thinking, response.action
                )
            };
        self.context.push(assistant_message(&content));
    }

    /// The accumulated conversation context, for post-mortems.
    pub fn context(&self) -> &[Value] {
        &self.context
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }
}

/// SHA-1 over the base64 screenshot bytes.
fn screen_hash(base64_data: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(base64_data.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Canonical signature used only for loop detection.
fn action_signature(action: &Value) -> String {
    if action.get("_metadata").and_then(|v| v.as_str()) == Some("finish") {
        return "finish".to_string();
    }

    let compact = |v: Option<&Value>| -> String {
        v.and_then(|val| serde_json::to_string(val).ok())
            .unwrap_or_else(|| "null".to_string())
    };
    let text = |key: &str| -> String {
        action
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };

    match action.get("action").and_then(|v| v.as_str()) {
        Some("Tap") => format!("Tap:{}", compact(action.get("element"))),
        Some("Swipe") => format!(
            "Swipe:{}->{}",
            compact(action.get("start")),
            compact(action.get("end"))
        ),
        Some("Type") => format!("Type:{}", text("text")),
        Some("Launch") => format!("Launch:{}", text("app")),
        Some("Wait") => format!("Wait:{}", text("duration")),
        Some("Take_over") => "Take_over".to_string(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}

/// A loop is six equal signatures or an exact ABABAB alternation.
fn looks_like_loop(signatures: &VecDeque<String>) -> bool {
    if signatures.len() < LOOP_WINDOW {
        return false;
    }

    let last6: Vec<&String> = signatures.iter().rev().take(LOOP_WINDOW).collect();
    let last6: Vec<&String> = last6.into_iter().rev().collect();

    let (a, b) = (last6[0], last6[1]);
    if a == b {
        return last6.iter().all(|s| *s == a);
    }
    last6
        .iter()
        .enumerate()
        .all(|(i, s)| if i % 2 == 0 { *s == a } else { *s == b })
}

/// Third-party stuck-override condition: the screen has been frozen for a
/// long stretch and warnings have already accumulated.
fn should_force_takeover(use_thirdparty: bool, unchanged_steps: u32, warnings: u32) -> bool {
    use_thirdparty
        && unchanged_steps >= OVERRIDE_UNCHANGED_THRESHOLD
        && warnings >= OVERRIDE_WARNING_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(signatures: &[&str]) -> VecDeque<String> {
        signatures.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_agent_config_default() {
        let config = AgentConfig::default();
        assert_eq!(config.max_steps, 100);
        assert_eq!(config.lang, "cn");
        assert!(!config.use_thirdparty_prompt);
        assert!(config.thirdparty_thinking);
    }

    #[test]
    fn test_agent_config_builder() {
        let config = AgentConfig::default()
            .with_device_id("device123")
            .with_lang("en")
            .with_max_steps(50)
            .with_thirdparty_prompt(true)
            .with_thirdparty_thinking(false)
            .quiet();

        assert_eq!(config.device_id, Some("device123".to_string()));
        assert_eq!(config.lang, "en");
        assert_eq!(config.max_steps, 50);
        assert!(config.use_thirdparty_prompt);
        assert!(!config.thirdparty_thinking);
        assert!(!config.verbose);
    }

    #[test]
    fn test_screen_hash_is_stable_sha1() {
        // SHA-1 of "abc"
        assert_eq!(screen_hash("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(screen_hash("abc"), screen_hash("abc"));
        assert_ne!(screen_hash("abc"), screen_hash("abd"));
    }

    #[test]
    fn test_action_signature_round_trip_with_parser() {
        let action = parse_action(r#"do(action="Tap", element=[100, 200])"#).unwrap();
        assert_eq!(action_signature(&action), "Tap:[100,200]");
    }

    #[test]
    fn test_action_signatures() {
        let swipe = do_action(
            "Swipe",
            &[("start", json!([500, 700])), ("end", json!([500, 300]))],
        );
        assert_eq!(action_signature(&swipe), "Swipe:[500,700]->[500,300]");

        let launch = do_action("Launch", &[("app", json!("微信"))]);
        assert_eq!(action_signature(&launch), "Launch:微信");

        let typing = do_action("Type", &[("text", json!("hello"))]);
        assert_eq!(action_signature(&typing), "Type:hello");

        let wait = do_action("Wait", &[("duration", json!("2 seconds"))]);
        assert_eq!(action_signature(&wait), "Wait:2 seconds");

        assert_eq!(
            action_signature(&do_action("Take_over", &[])),
            "Take_over"
        );
        assert_eq!(action_signature(&do_action("Back", &[])), "Back");
        assert_eq!(
            action_signature(&crate::actions::finish_action(None)),
            "finish"
        );
    }

    #[test]
    fn test_looks_like_loop_six_identical() {
        let sigs = ring(&["Tap:[100,200]"; 6]);
        assert!(looks_like_loop(&sigs));
    }

    #[test]
    fn test_looks_like_loop_abab_alternation() {
        let sigs = ring(&["A", "B", "A", "B", "A", "B"]);
        assert!(looks_like_loop(&sigs));
    }

    #[test]
    fn test_looks_like_loop_negative_cases() {
        assert!(!looks_like_loop(&ring(&["A", "A", "A"])));
        assert!(!looks_like_loop(&ring(&["A", "B", "C", "A", "B", "C"])));
        assert!(!looks_like_loop(&ring(&["A", "B", "A", "B", "A", "C"])));
    }

    #[test]
    fn test_looks_like_loop_checks_only_the_tail() {
        // Earlier variety does not matter once the last six repeat.
        let sigs = ring(&["X", "Y", "Z", "A", "A", "A", "A", "A", "A"]);
        assert!(looks_like_loop(&sigs));
    }

    #[test]
    fn test_should_force_takeover() {
        assert!(should_force_takeover(true, 6, 2));
        assert!(should_force_takeover(true, 10, 5));
        // Native mode never overrides.
        assert!(!should_force_takeover(false, 10, 5));
        // Both thresholds must be met.
        assert!(!should_force_takeover(true, 5, 2));
        assert!(!should_force_takeover(true, 6, 1));
    }

    #[test]
    fn test_signature_ring_capacity() {
        let mut agent_ring: VecDeque<String> = VecDeque::new();
        for i in 0..20 {
            agent_ring.push_back(format!("sig{i}"));
            while agent_ring.len() > SIGNATURE_RING_CAPACITY {
                agent_ring.pop_front();
            }
        }
        assert_eq!(agent_ring.len(), SIGNATURE_RING_CAPACITY);
        assert_eq!(agent_ring.front().map(|s| s.as_str()), Some("sig8"));
    }
}
