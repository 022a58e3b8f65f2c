//! Prompt rendering for the answer model.
//!
//! The layout is a contract with the model: it is told to answer only from
//! the supplied context and to finish with a `**Sources Used**:` section.

use super::history::{recent_turns, ConversationTurn};
use crate::rag::intent::Intent;
use crate::rag::selector::ContextBlock;

pub const PREAMBLE: &str = "You are a helpful legal assistant having a conversation with a user.";
pub const SOURCES_HEADER: &str = "**Sources Used**:";

/// Numbered `--- Source <n>: <source> ---` blocks separated by blank lines.
pub fn render_context(blocks: &[ContextBlock]) -> String {
    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| format!("--- Source {}: {} ---\n{}", i + 1, block.source, block.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_history(history: &[ConversationTurn]) -> String {
    recent_turns(history)
        .iter()
        .map(|turn| format!("{}\n", turn.render()))
        .collect()
}

pub fn render_sources(sources: &[String]) -> String {
    sources
        .iter()
        .map(|source| format!("- {}", source))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn compose_prompt(
    history: &[ConversationTurn],
    context: &[ContextBlock],
    question: &str,
    intent: Intent,
    used_sources: &[String],
) -> String {
    let prompt = format!(
        "{preamble}\n\
         \n\
         Here is the recent chat history:\n\
         {history}\n\
         \n\
         Use the context below to answer the user's next question. Be concise, structured, and relevant to the current and past conversation.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Instructions: {instructions}\n\
         \n\
         Your answer must be structured and must end with a section:\n\
         {header}\n\
         {sources}\n",
        preamble = PREAMBLE,
        history = render_history(history),
        context = render_context(context),
        question = question,
        instructions = intent.instruction(),
        header = SOURCES_HEADER,
        sources = render_sources(used_sources),
    );

    prompt.trim().to_string()
}
