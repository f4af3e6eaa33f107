//! Backend implementations.

mod openai;

pub use openai::{OpenAiBackend, OpenAiBackendBuilder};
