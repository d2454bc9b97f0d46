//! Context window construction.
//!
//! Packs the system preamble (with retrieved snippets), recent history and
//! the new user message into a character budget. Lowest priority goes
//! first: oldest turns, then lowest-ranked snippets, then the preamble. The
//! user message is never dropped; when it alone exceeds the budget it is cut
//! from the end.

use super::prompt::{context_block, PromptTemplate};
use crate::llm::{ChatMessage, Role};
use crate::rag::RetrievalResult;

pub struct PromptInputs<'a> {
    /// Prior turns, oldest first.
    pub conversation: &'a [ChatMessage],
    pub retrieval: &'a RetrievalResult,
    pub message: &'a str,
    pub max_chars: usize,
    /// Pre-formatted so assembly stays deterministic.
    pub date: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub system: Option<String>,
    pub history: Vec<ChatMessage>,
    pub user_message: String,
    pub documents_used: usize,
    pub turns_dropped: usize,
    pub message_truncated: bool,
}

impl AssembledPrompt {
    /// Characters handed to the completion service.
    pub fn char_len(&self) -> usize {
        self.system.as_deref().map(char_len).unwrap_or(0)
            + self.history.iter().map(|m| char_len(&m.content)).sum::<usize>()
            + char_len(&self.user_message)
    }

    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::new(Role::System, system.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::new(Role::User, self.user_message.clone()));
        messages
    }
}

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    template: PromptTemplate,
}

impl PromptAssembler {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    pub fn assemble(&self, inputs: PromptInputs<'_>) -> AssembledPrompt {
        let max_chars = inputs.max_chars;

        let user_message = truncate_chars(inputs.message, max_chars);
        let message_truncated = user_message.len() < inputs.message.len();
        if message_truncated {
            tracing::warn!(
                "User message truncated from {} to {} characters",
                char_len(inputs.message),
                max_chars
            );
        }
        let mut remaining = max_chars - char_len(user_message);

        let snippets: Vec<&str> = inputs.retrieval.texts().collect();
        let mut kept = snippets.len();
        let mut system = None;
        loop {
            let candidate = self
                .template
                .render(&context_block(&snippets[..kept]), inputs.date);
            let cost = char_len(&candidate);
            if cost <= remaining {
                remaining -= cost;
                system = Some(candidate);
                break;
            }
            if kept == 0 {
                break;
            }
            kept -= 1;
        }
        let documents_used = if system.is_some() { kept } else { 0 };

        let mut history = Vec::new();
        for turn in inputs.conversation.iter().rev() {
            let cost = char_len(&turn.content);
            if cost > remaining {
                break;
            }
            remaining -= cost;
            history.push(turn.clone());
        }
        history.reverse();
        let turns_dropped = inputs.conversation.len() - history.len();

        AssembledPrompt {
            system,
            history,
            user_message: user_message.to_string(),
            documents_used,
            turns_dropped,
            message_truncated,
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Keeps the first `max` characters, respecting char boundaries.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
