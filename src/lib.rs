// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Phone Pilot
//!
//! AI-driven UI automation agent for Android and HarmonyOS phones.
//!
//! Given a natural-language task and a connected device, the agent drives
//! the phone's UI to completion by iteratively capturing the screen, asking
//! a vision-language model for the next action, and executing that action
//! over ADB or HDC.
//!
//! ## Example
//!
//! ```rust,no_run
//! use phone_pilot::{AgentConfig, ModelConfig, PhoneAgent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let model_config = ModelConfig::default();
//!     let agent_config = AgentConfig::default();
//!
//!     let mut agent = PhoneAgent::new(model_config, agent_config, None, None);
//!     let outcome = agent.run("打开微信").await;
//!
//!     println!("Task result: {} ({} steps)", outcome.message, outcome.steps);
//! }
//! ```

pub mod actions;
pub mod agent;
pub mod config;
pub mod device;
pub mod model;
pub mod settings;

pub use actions::{
    parse_action, ActionHandler, ActionResult, ConfirmationCallback, ParseError, TakeoverCallback,
};
pub use agent::{AgentConfig, AgentError, PhoneAgent, StepResult, TaskOutcome};
pub use device::{
    device_driver, init_device_driver, DeviceDriver, DeviceError, DeviceKind, Screenshot,
};
pub use model::{ModelClient, ModelConfig, ModelError, ModelResponse};
pub use settings::AppSettings;
