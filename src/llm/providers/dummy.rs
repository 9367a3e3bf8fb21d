//! Dummy provider: echoes the latest user message back prefixed with `[echo]`.
//! Lets the bot run end to end without any API key.

use crate::llm::InferenceError;
use crate::subsystems::memory::{Role, Turn};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, _model: &str, messages: &[Turn]) -> Result<String, InferenceError> {
        let last = messages
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map_or("", |t| t.content.as_str());
        Ok(format!("[echo] {last}"))
    }
}
