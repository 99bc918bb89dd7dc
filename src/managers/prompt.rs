//! Confirmation prompt for destructive operations

use anyhow::{Context, Result};
use dialoguer::Confirm;

pub trait ConfirmPrompt: Send + Sync {
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Asks on the terminal; defaults to "no"
pub struct TerminalPrompt;

impl ConfirmPrompt for TerminalPrompt {
    fn confirm(&self, message: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(message)
            .default(false)
            .interact()
            .context("Failed to read confirmation")
    }
}

/// Fixed answer, for tests and non-interactive callers
pub struct FixedAnswer(pub bool);

impl ConfirmPrompt for FixedAnswer {
    fn confirm(&self, _message: &str) -> Result<bool> {
        Ok(self.0)
    }
}
