//! Data models module
//!
//! Gateway request/result types and the OpenAI wire shapes providers normalize into

pub mod chat;
pub mod openai;

pub use chat::{ChatReply, ChatRequest, Completion, CompletionRequest};
