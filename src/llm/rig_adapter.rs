//! Bridges rig's `CompletionModel` to [`LlmProvider`].

use std::time::Duration;

use async_trait::async_trait;
use rig::OneOrMany;
use rig::completion::{AssistantContent, CompletionError, CompletionModel, Message};

use crate::error::LlmError;

use super::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};

/// Wraps any rig completion model behind the provider trait.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
    timeout: Duration,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str, timeout: Duration) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
            timeout,
        }
    }

    fn map_error(&self, err: CompletionError) -> LlmError {
        match err {
            CompletionError::JsonError(e) => LlmError::InvalidResponse {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            },
            CompletionError::ResponseError(reason) => LlmError::InvalidResponse {
                provider: self.provider.to_string(),
                reason,
            },
            other => LlmError::RequestFailed {
                provider: self.provider.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// A request split the way rig wants it.
#[derive(Debug)]
struct RigPrompt {
    preamble: Option<String>,
    history: Vec<Message>,
    prompt: Message,
}

/// System messages become the preamble; the last user message is the prompt
/// and anything before it is chat history.
fn split_messages(request: &CompletionRequest, provider: &str) -> Result<RigPrompt, LlmError> {
    let mut turns: Vec<&ChatMessage> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();
    let last = match turns.pop() {
        Some(m) if m.role == Role::User => m,
        _ => {
            return Err(LlmError::RequestFailed {
                provider: provider.to_string(),
                reason: "request must end with a user message".to_string(),
            });
        }
    };

    let history = turns
        .into_iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content.clone()),
            _ => Message::user(m.content.clone()),
        })
        .collect();

    Ok(RigPrompt {
        preamble: request.system_prompt(),
        history,
        prompt: Message::user(last.content.clone()),
    })
}

/// Concatenate the text parts of a choice. Tool calls and reasoning are ignored.
fn choice_text(choice: &OneOrMany<AssistantContent>) -> String {
    choice
        .iter()
        .filter_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

fn finish_reason(output_tokens: u32, max_tokens: Option<u32>) -> FinishReason {
    match max_tokens {
        Some(limit) if output_tokens >= limit => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let RigPrompt {
            preamble,
            history,
            prompt,
        } = split_messages(&request, self.provider)?;

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        tracing::debug!(
            provider = self.provider,
            model = %self.model_name,
            messages = request.messages.len(),
            "Sending completion"
        );

        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.provider.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|e| self.map_error(e))?;

        let input_tokens = u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX);
        let output_tokens = u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX);

        Ok(CompletionResponse {
            content: choice_text(&response.choice),
            input_tokens,
            output_tokens,
            finish_reason: finish_reason(output_tokens, request.max_tokens),
        })
    }
}
