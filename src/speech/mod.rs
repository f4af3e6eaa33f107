//! Speech synthesis types.

mod types;

pub use types::{GeneratedSpeech, SpeechModel, SpeechRequest, Voice};
