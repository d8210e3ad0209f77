//! Assessment request: flattened table in, Markdown report out.
//!
//! One chat request per run, no retries. The deck text is the table's `Text`
//! cells joined with single spaces; the reply is passed through
//! [`clean_markdown`] before it is returned.

use crate::config::PipelineConfig;
use crate::error::DeckError;
use crate::pipeline::flatten::Table;
use crate::pipeline::postprocess::clean_markdown;
use crate::prompts::{task_prompt, DEFAULT_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// The model's assessment and what it cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub markdown: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

/// Instruction message followed by the task message for `content`.
pub fn build_messages(content: &str, config: &PipelineConfig) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(instruction(config)),
        ChatMessage::user(task_prompt(content)),
    ]
}

/// The configured instruction, or the default reviewer role.
pub fn instruction(config: &PipelineConfig) -> &str {
    config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT)
}

/// Ask `provider` for an assessment of the deck text in `table`.
pub async fn summarize(
    provider: &Arc<dyn LLMProvider>,
    table: &Table,
    config: &PipelineConfig,
) -> Result<Summary, DeckError> {
    let start = Instant::now();
    let content = table.joined_text();
    let messages = build_messages(&content, config);
    debug!(
        "Summarizing {} rows ({} chars)",
        table.len(),
        content.chars().count()
    );

    let response = provider
        .chat(&messages, Some(&build_options(config)))
        .await
        .map_err(|e| DeckError::LlmApiError {
            message: e.to_string(),
        })?;

    let duration_ms = start.elapsed().as_millis() as u64;
    debug!(
        "Assessment: {} input tokens, {} output tokens, {}ms",
        response.prompt_tokens, response.completion_tokens, duration_ms
    );

    Ok(Summary {
        markdown: clean_markdown(&response.content),
        input_tokens: response.prompt_tokens as u64,
        output_tokens: response.completion_tokens as u64,
        duration_ms,
    })
}

fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
