//! Conversation history and prompt assembly.

pub mod history;
pub mod prompt;

pub use history::ConversationTurn;
pub use prompt::compose_prompt;
