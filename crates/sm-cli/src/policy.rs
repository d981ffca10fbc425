//! Interactive instance-state prompt

use async_trait::async_trait;
use dialoguer::{theme::ColorfulTheme, Select};

use sm_core::Target;
use sm_orchestrator::{RunningDecision, StatePolicy, StoppedDecision};

const STOPPED_CHOICES: &[&str] = &["Start", "<= Back"];
const RUNNING_CHOICES: &[&str] = &["Stop", "Restart", "<= Back"];

/// Asks the operator on the terminal.
///
/// Without a terminal (or if the prompt is dismissed) the instance is left
/// alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptPolicy;

#[async_trait]
impl StatePolicy for PromptPolicy {
    async fn on_stopped(&self, target: &Target) -> StoppedDecision {
        let prompt = format!("{} is stopped. What would you like to do?", target.name());
        match choose(prompt, STOPPED_CHOICES).await {
            Some(0) => StoppedDecision::Start,
            _ => StoppedDecision::Abort,
        }
    }

    async fn on_running(&self, target: &Target) -> RunningDecision {
        let prompt = format!("{} is running. What would you like to do?", target.name());
        match choose(prompt, RUNNING_CHOICES).await {
            Some(0) => RunningDecision::Stop,
            Some(1) => RunningDecision::Restart,
            _ => RunningDecision::Abort,
        }
    }
}

/// Show a selection menu off the async runtime
async fn choose(prompt: String, items: &'static [&'static str]) -> Option<usize> {
    let picked = tokio::task::spawn_blocking(move || {
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact_opt()
    })
    .await;

    match picked {
        Ok(Ok(choice)) => choice,
        Ok(Err(e)) => {
            tracing::warn!("Prompt unavailable, leaving instance unchanged: {}", e);
            None
        }
        Err(e) => {
            tracing::warn!("Prompt task failed: {}", e);
            None
        }
    }
}
