pub(crate) mod anthropic;
pub(crate) mod common;
pub(crate) mod health;
pub(crate) mod models;
pub(crate) mod ollama;
pub(crate) mod openai_chat;
pub(crate) mod openai_responses;
