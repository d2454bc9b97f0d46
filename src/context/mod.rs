//! Prompt assembly.
//!
//! Turns retrieved snippets, prior turns and the new user message into the
//! message list sent to the completion service, within a character budget.

mod prompt;
mod window;

pub use prompt::{context_block, format_prompt_date, PromptTemplate, NO_CONTEXT};
pub use window::{AssembledPrompt, PromptAssembler, PromptInputs};
