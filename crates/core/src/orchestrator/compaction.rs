use iai_model::{ModelMessage, ModelRequest};

use crate::conversation::Message;

const CHARS_PER_TOKEN: f64 = 3.5;
const SUMMARY_MAX_TOKENS: u32 = 2000;
const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful assistant that \
    summarizes technical conversations concisely.";
const SUMMARY_INSTRUCTIONS: &str = "Summarize the following conversation \
    concisely. Focus on key decisions, findings, and context that would be \
    important for continuing the conversation. Use bullet points. Keep it \
    under 500 words.\n\n";

/// Roughly estimates the number of tokens of a text.
pub(super) fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as f64 / CHARS_PER_TOKEN).ceil() as u64
}

/// Estimates the size of a prompt made of `system_prompt` and `history`.
///
/// Stored messages count with the usage the model reported for them, and a
/// summary, which has no usage, with its estimated size.
pub(super) fn history_tokens(system_prompt: &str, history: &[Message]) -> u64 {
    let messages: u64 = history
        .iter()
        .map(|msg| match msg.usage {
            Some(usage) => usage.input_tokens + usage.output_tokens,
            None if msg.content.is_summary() => {
                estimate_tokens(&msg.content.text())
            }
            None => 0,
        })
        .sum();
    estimate_tokens(system_prompt) + messages
}

/// Builds the request that asks the model to summarize `messages`.
pub(super) fn summary_request(messages: &[Message]) -> ModelRequest {
    let mut prompt = SUMMARY_INSTRUCTIONS.to_owned();
    for msg in messages {
        let text = msg.content.text();
        if text.is_empty() {
            continue;
        }
        let role = msg.role.as_str().to_uppercase();
        prompt.push_str(&format!("{role}: {text}\n\n"));
    }
    ModelRequest {
        system: Some(SUMMARY_SYSTEM_PROMPT.to_owned()),
        messages: vec![ModelMessage::user_text(prompt)],
        tools: vec![],
        max_tokens: Some(SUMMARY_MAX_TOKENS),
    }
}
