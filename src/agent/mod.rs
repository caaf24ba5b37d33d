//! Agent module orchestrating the perception-decision-actuation loop.

mod phone_agent;

pub use phone_agent::{AgentConfig, AgentError, PhoneAgent, StepResult, TaskOutcome};
