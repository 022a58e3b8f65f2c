pub mod context;
pub mod core;
pub mod llm;
pub mod query;
pub mod rag;
pub mod server;
pub mod state;
