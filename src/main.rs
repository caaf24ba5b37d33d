//! Phone Pilot - AI-powered phone automation
//!
//! CLI entry point. Run with a task as the argument, or without arguments
//! for an interactive prompt.

use phone_pilot::settings::env_truthy;
use phone_pilot::{init_device_driver, AgentConfig, AppSettings, DeviceKind, ModelConfig, PhoneAgent};
use std::env;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

/// Merge stored settings with environment overrides.
fn load_settings_with_env() -> AppSettings {
    let mut settings = AppSettings::load();

    if let Ok(v) = env::var("MODEL_BASE_URL") {
        settings.base_url = v;
    }
    if let Ok(v) = env::var("MODEL_API_KEY") {
        settings.api_key = v;
    }
    if let Ok(v) = env::var("MODEL_NAME") {
        settings.model_name = v;
    }
    if let Ok(v) = env::var("MODEL_TIMEOUT") {
        if let Ok(parsed) = v.parse() {
            settings.timeout_secs = parsed;
        }
    }
    if let Ok(v) = env::var("DEVICE_KIND") {
        settings.device_kind = v;
    }
    if let Ok(v) = env::var("DEVICE_ID") {
        settings.device_id = v;
    }
    if let Ok(v) = env::var("AGENT_LANG") {
        settings.lang = v;
    }
    if let Ok(v) = env::var("MAX_STEPS") {
        if let Ok(parsed) = v.parse() {
            settings.max_steps = parsed;
        }
    }
    if let Ok(v) = env::var("USE_THIRDPARTY_PROMPT") {
        settings.use_thirdparty_prompt = env_truthy(&v);
    }
    if let Ok(v) = env::var("THIRDPARTY_THINKING") {
        settings.thirdparty_thinking = env_truthy(&v);
    }
    if let Ok(v) = env::var("COMPRESS_IMAGE") {
        settings.compress_image = env_truthy(&v);
    }

    settings
}

fn prompt_with_default(label: &str, default: &str) -> anyhow::Result<String> {
    print!("{} [{}]: ", label, default);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    let value = input.trim();
    if value.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(value.to_string())
    }
}

fn prompt_bool(label: &str, default: bool) -> anyhow::Result<bool> {
    let default_str = if default { "y" } else { "n" };
    let input = prompt_with_default(label, default_str)?;
    Ok(matches!(
        input.to_lowercase().as_str(),
        "y" | "yes" | "true" | "1"
    ))
}

fn prompt_number<T>(label: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr + ToString + Copy,
{
    let input = prompt_with_default(label, &default.to_string())?;
    Ok(input.parse().unwrap_or(default))
}

/// Interactive configuration wizard.
fn run_config_wizard(mut settings: AppSettings) -> anyhow::Result<()> {
    println!("Phone Pilot Setup");
    if let Some(path) = AppSettings::settings_path() {
        println!("Config file: {}", path.display());
    }
    println!("Press Enter to keep the current value in brackets.\n");

    settings.base_url = prompt_with_default("Model base URL", &settings.base_url)?;
    settings.api_key = prompt_with_default("Model API key", &settings.api_key)?;
    settings.model_name = prompt_with_default("Model name", &settings.model_name)?;
    settings.timeout_secs = prompt_number("Model timeout (seconds)", settings.timeout_secs)?;

    let kind_input = prompt_with_default("Device transport (adb/hdc)", &settings.device_kind)?;
    settings.device_kind = if kind_input.to_lowercase() == "hdc" {
        "hdc".to_string()
    } else {
        "adb".to_string()
    };
    settings.device_id = prompt_with_default("Device ID (optional)", &settings.device_id)?;

    let lang_input = prompt_with_default("Language (cn/en)", &settings.lang)?;
    settings.lang = if lang_input.to_lowercase() == "en" {
        "en".to_string()
    } else {
        "cn".to_string()
    };

    settings.max_steps = prompt_number("Max steps", settings.max_steps)?;
    settings.use_thirdparty_prompt = prompt_bool(
        "Use third-party prompt? (y/n)",
        settings.use_thirdparty_prompt,
    )?;
    settings.thirdparty_thinking = prompt_bool(
        "Third-party <think>/<answer> output? (y/n)",
        settings.thirdparty_thinking,
    )?;
    settings.compress_image =
        prompt_bool("Compress screenshots? (y/n)", settings.compress_image)?;

    let allow_secrets = env::var("PHONE_PILOT_ALLOW_CONFIG_FILE_SECRETS")
        .map(|v| env_truthy(&v))
        .unwrap_or(false);
    settings
        .save(allow_secrets)
        .map_err(|e| anyhow::anyhow!(e))?;

    if allow_secrets {
        println!("\n✅ Settings saved (API key included).");
    } else {
        println!("\n✅ Settings saved. The API key was redacted; provide it via MODEL_API_KEY or .env.");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();

    // Allow running interactive setup before anything else
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "config" | "--config" | "--setup" | "setup"))
    {
        run_config_wizard(AppSettings::load())?;
        return Ok(ExitCode::SUCCESS);
    }

    let settings = load_settings_with_env();

    let device_kind = DeviceKind::from_config(&settings.device_kind);
    init_device_driver(device_kind);

    let model_config = ModelConfig::default()
        .with_base_url(&settings.base_url)
        .with_api_key(&settings.api_key)
        .with_model_name(&settings.model_name)
        .with_timeout(settings.timeout_secs)
        .with_compress_image(settings.compress_image);

    let mut agent_config = AgentConfig::default()
        .with_lang(&settings.lang)
        .with_max_steps(settings.max_steps)
        .with_thirdparty_prompt(settings.use_thirdparty_prompt)
        .with_thirdparty_thinking(settings.thirdparty_thinking);
    if !settings.device_id.trim().is_empty() {
        agent_config = agent_config.with_device_id(settings.device_id.trim());
    }

    println!("🤖 Phone Pilot - AI-powered Phone Automation");
    println!("================================================");
    println!("Model: {} @ {}", settings.model_name, settings.base_url);
    println!("Transport: {:?}", device_kind);
    println!("Language: {}", settings.lang);
    println!("Max steps: {}", settings.max_steps);
    if settings.use_thirdparty_prompt {
        println!(
            "Prompt mode: third-party ({})",
            if settings.thirdparty_thinking {
                "<think>/<answer>"
            } else {
                "plain action"
            }
        );
    }
    if let Some(ref id) = agent_config.device_id {
        println!("Device: {}", id);
    }
    println!("================================================\n");

    let mut agent = PhoneAgent::new(model_config, agent_config, None, None);

    // Task provided as arguments: run once and report via the exit code.
    if args.len() > 1 {
        let task = args[1..].join(" ");
        println!("📝 Task: {}\n", task);

        let outcome = agent.run(&task).await;
        println!(
            "\n{} Result: {} ({} steps)",
            if outcome.finished { "✅" } else { "❌" },
            outcome.message,
            outcome.steps
        );

        return Ok(if outcome.finished {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    // Interactive mode
    println!("Interactive mode. Type your task and press Enter.");
    println!("Type 'quit' or 'exit' to exit.\n");

    let stdin = io::stdin();
    loop {
        print!("📝 Task: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let task = line.trim();

        if task.is_empty() {
            continue;
        }

        if task == "quit" || task == "exit" {
            println!("Goodbye! 👋");
            break;
        }

        agent.reset();
        let outcome = agent.run(task).await;
        println!(
            "\n{} Result: {} ({} steps)\n",
            if outcome.finished { "✅" } else { "❌" },
            outcome.message,
            outcome.steps
        );
    }

    Ok(ExitCode::SUCCESS)
}
