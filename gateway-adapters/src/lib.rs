//! Backend adapters used by the gateway.
//!
//! Each module wraps one concrete inference mechanism behind the shared
//! [`BackendAdapter`](traits::BackendAdapter) capability defined in [`traits`].

#![warn(missing_docs, clippy::pedantic)]

pub mod anthropic;
pub mod local;
pub mod ollama;
pub mod openai;
pub mod traits;

mod http_client;
