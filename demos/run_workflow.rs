//! Runs one query through the whole workflow without a window.
//!
//! Run with: `cargo run --example run_workflow -- "a lighthouse at dusk"`
//!
//! Requires `OPENAI_API_KEY` (or an `api_key.txt` in the working directory)
//! and `ffmpeg` on the PATH for the clip.

use minipres::{
    ApiKeyStore, MiniPresError, OpenAiBackend, Settings, WorkflowEvent, WorkflowRunner,
};

fn main() -> minipres::Result<()> {
    let query = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "a lighthouse at dusk".to_string());

    let key = ApiKeyStore::default()
        .resolve(None)?
        .ok_or_else(|| MiniPresError::Auth("no OpenAI API key found".into()))?;
    let runner = WorkflowRunner::with_openai(OpenAiBackend::builder(), key, Settings::default())?;

    let handle = runner.submit(&query)?;
    for event in handle.events().iter() {
        match event {
            WorkflowEvent::Status(state) => println!("{}", state.status_text()),
            WorkflowEvent::Described(description) => {
                println!("Image prompt: {}", description.image_prompt)
            }
            WorkflowEvent::VideoFailed(message) => eprintln!("Video skipped: {message}"),
            WorkflowEvent::Failed { stage, message } => {
                eprintln!("{}: {message}", stage.failure_text())
            }
            _ => {}
        }
    }

    let summary = handle.join()?;
    println!(
        "Image: {}, audio: {}, video: {:?}",
        summary.frame_path.display(),
        summary.audio_path.display(),
        summary.video_path
    );

    Ok(())
}
