//! Query description: turning free text into per-medium prompts.

mod types;

pub use types::{ChatModel, DescribeRequest, Description, SYSTEM_INSTRUCTION};
