//! CLI for MiniPres - a query in, a tiny presentation out.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use minipres::config::DEFAULT_KEY_FILE;
use minipres::{
    ApiKey, ApiKeyStore, ChatModel, ImageModel, NoticeKind, OpenAiBackendBuilder, OutputLayout,
    RunState, Settings, SpeechModel, Voice, WorkflowRunner, WorkflowView,
};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "minipres")]
#[command(about = "Turn a word or phrase into a description, an image, narration and a short video")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// File the OpenAI API key is read from and saved to
    #[arg(long, global = true, default_value = DEFAULT_KEY_FILE)]
    key_file: PathBuf,

    /// API key for this invocation (overrides OPENAI_API_KEY and the key file)
    #[arg(long, global = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a presentation for a query
    Run(RunArgs),

    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Open the desktop window
    #[cfg(feature = "gui")]
    Gui(SettingsArgs),
}

#[derive(Subcommand)]
enum KeyAction {
    /// Save a key to the key file
    Set {
        /// The key; prompted for when omitted
        key: Option<String>,
    },
    /// Show where the key comes from, masked
    Show,
    /// Delete the key file
    Clear,
}

#[derive(Args)]
struct RunArgs {
    /// Word or phrase to present
    query: String,

    #[command(flatten)]
    settings: SettingsArgs,

    /// Play the narration when done
    #[arg(long)]
    open_audio: bool,

    /// Open the clip when done
    #[arg(long)]
    open_video: bool,
}

#[derive(Args)]
struct SettingsArgs {
    /// Directory artifacts are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Write each run to its own runs/<id>/ directory
    #[arg(long)]
    per_run: bool,

    /// Chat model for the description
    #[arg(long, value_enum, default_value = "gpt-3.5-turbo")]
    chat_model: ChatModelArg,

    /// Image model
    #[arg(long, value_enum, default_value = "dall-e-2")]
    image_model: ImageModelArg,

    /// Square image edge in pixels
    #[arg(long, default_value_t = 512)]
    image_size: u32,

    /// Speech model
    #[arg(long, value_enum, default_value = "tts-1")]
    speech_model: SpeechModelArg,

    /// Narration voice
    #[arg(long, value_enum, default_value = "alloy")]
    voice: VoiceArg,

    /// Clip length in seconds
    #[arg(short, long, default_value_t = 5)]
    duration: u32,

    /// Clip frame rate
    #[arg(long, default_value_t = 24)]
    fps: u32,

    /// Video codec handed to ffmpeg
    #[arg(long, default_value = "libx264")]
    codec: String,

    /// ffmpeg program name or path
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// OpenAI-compatible API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Ask the chat model for a JSON object response
    #[arg(long)]
    json_mode: bool,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl SettingsArgs {
    fn settings(&self) -> Settings {
        Settings {
            chat_model: self.chat_model.into(),
            image_model: self.image_model.into(),
            image_size: self.image_size,
            speech_model: self.speech_model.into(),
            voice: self.voice.into(),
            video_duration_secs: self.duration,
            video_fps: self.fps,
            video_codec: self.codec.clone(),
            ffmpeg: self.ffmpeg.clone(),
            output_dir: self.output_dir.clone(),
            layout: if self.per_run {
                OutputLayout::PerRun
            } else {
                OutputLayout::Fixed
            },
        }
    }

    fn backend(&self) -> OpenAiBackendBuilder {
        let mut builder = OpenAiBackendBuilder::new()
            .chat_model(self.chat_model.into())
            .image_model(self.image_model.into())
            .speech_model(self.speech_model.into())
            .json_mode(self.json_mode);
        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(secs) = self.timeout {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChatModelArg {
    #[value(name = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[value(name = "gpt-4o-mini")]
    Gpt4oMini,
    #[value(name = "gpt-4o")]
    Gpt4o,
}

impl From<ChatModelArg> for ChatModel {
    fn from(arg: ChatModelArg) -> Self {
        match arg {
            ChatModelArg::Gpt35Turbo => ChatModel::Gpt35Turbo,
            ChatModelArg::Gpt4oMini => ChatModel::Gpt4oMini,
            ChatModelArg::Gpt4o => ChatModel::Gpt4o,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ImageModelArg {
    #[value(name = "dall-e-2")]
    DallE2,
    #[value(name = "dall-e-3")]
    DallE3,
}

impl From<ImageModelArg> for ImageModel {
    fn from(arg: ImageModelArg) -> Self {
        match arg {
            ImageModelArg::DallE2 => ImageModel::DallE2,
            ImageModelArg::DallE3 => ImageModel::DallE3,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SpeechModelArg {
    #[value(name = "tts-1")]
    Tts1,
    #[value(name = "tts-1-hd")]
    Tts1Hd,
}

impl From<SpeechModelArg> for SpeechModel {
    fn from(arg: SpeechModelArg) -> Self {
        match arg {
            SpeechModelArg::Tts1 => SpeechModel::Tts1,
            SpeechModelArg::Tts1Hd => SpeechModel::Tts1Hd,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VoiceArg {
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl From<VoiceArg> for Voice {
    fn from(arg: VoiceArg) -> Self {
        match arg {
            VoiceArg::Alloy => Voice::Alloy,
            VoiceArg::Echo => Voice::Echo,
            VoiceArg::Fable => Voice::Fable,
            VoiceArg::Onyx => Voice::Onyx,
            VoiceArg::Nova => Voice::Nova,
            VoiceArg::Shimmer => Voice::Shimmer,
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("minipres=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = ApiKeyStore::new(&cli.key_file);

    match cli.command {
        Commands::Run(args) => {
            let key = require_key(&store, cli.api_key.as_deref())?;
            run_presentation(args, key, cli.json)
        }
        Commands::Key { action } => {
            manage_key(action, &store, cli.api_key.as_deref(), cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        #[cfg(feature = "gui")]
        Commands::Gui(args) => {
            let key = store.resolve(cli.api_key.as_deref())?;
            let exit = minipres::gui::run(minipres::gui::GuiConfig {
                key_store: store,
                api_key: key,
                settings: args.settings(),
                backend: args.backend(),
            })
            .map_err(|e| anyhow::anyhow!("window failed: {e}"))?;
            Ok(match exit {
                minipres::gui::GuiExit::Closed => ExitCode::SUCCESS,
                minipres::gui::GuiExit::KeyDeclined => ExitCode::FAILURE,
            })
        }
    }
}

/// Resolves the key, prompting for one (and saving it) on an interactive
/// terminal. Without a key nothing can run.
fn require_key(store: &ApiKeyStore, explicit: Option<&str>) -> anyhow::Result<ApiKey> {
    if let Some(key) = store.resolve(explicit)? {
        return Ok(key);
    }
    if !std::io::stdin().is_terminal() {
        anyhow::bail!(
            "API key is required to continue (pass --api-key, set OPENAI_API_KEY or write {})",
            store.path().display()
        );
    }

    let line = prompt_key()?;
    let Some(key) = store
        .accept_entry(&line)
        .with_context(|| format!("saving key to {}", store.path().display()))?
    else {
        anyhow::bail!("API key is required to continue.");
    };
    eprintln!("Saved API key to {}", store.path().display());
    Ok(key)
}

fn prompt_key() -> anyhow::Result<String> {
    eprint!("Enter your OpenAI API key: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

fn run_presentation(args: RunArgs, key: ApiKey, json_output: bool) -> anyhow::Result<ExitCode> {
    let runner = WorkflowRunner::with_openai(args.settings.backend(), key, args.settings.settings())?;
    let handle = match runner.submit(&args.query) {
        Ok(handle) => handle,
        Err(minipres::MiniPresError::EmptyQuery) => {
            anyhow::bail!("Please enter a word or phrase.");
        }
        Err(e) => return Err(e.into()),
    };

    let mut view = WorkflowView::new();
    let mut last_status = String::new();
    for event in handle.events().iter() {
        view.apply(event);
        if !json_output && view.status() != last_status {
            last_status = view.status().to_string();
            println!("{last_status}");
        }
        while let Some(notice) = view.take_notice() {
            match notice.kind {
                NoticeKind::Info => eprintln!("{}", notice.message),
                NoticeKind::Warning => eprintln!("Warning: {}", notice.message),
                NoticeKind::Error => eprintln!("Error: {}", notice.message),
            }
        }
    }

    let summary = match handle.join() {
        Ok(summary) => summary,
        // The failing stage has been reported above.
        Err(_) if matches!(view.state(), RunState::Failed { .. }) => return Ok(ExitCode::FAILURE),
        Err(e) => return Err(e.into()),
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Image: {}", summary.frame_path.display());
        println!("Audio: {}", summary.audio_path.display());
        match &summary.video_path {
            Some(path) => println!("Video: {}", path.display()),
            None => println!("Video: not generated"),
        }
        println!("Duration: {}ms", summary.duration_ms);
    }

    if args.open_audio {
        if let Err(e) = minipres::launch::open_artifact(&summary.audio_path) {
            eprintln!("Error: Cannot play audio: {e}");
        }
    }
    if args.open_video {
        match &summary.video_path {
            Some(path) => {
                if let Err(e) = minipres::launch::open_artifact(path) {
                    eprintln!("Error: Cannot open video: {e}");
                }
            }
            None => eprintln!("Warning: no video to open"),
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn manage_key(
    action: KeyAction,
    store: &ApiKeyStore,
    explicit: Option<&str>,
    json_output: bool,
) -> anyhow::Result<()> {
    match action {
        KeyAction::Set { key } => {
            let key = match key {
                Some(raw) => ApiKey::new(raw)?,
                None => match ApiKey::new(prompt_key()?) {
                    Ok(key) => key,
                    Err(_) => anyhow::bail!("API key is required to continue."),
                },
            };
            store.save(&key)?;
            println!("Saved {} to {}", key.masked(), store.path().display());
        }
        KeyAction::Show => {
            let key = store.resolve(explicit)?;
            if json_output {
                let result = serde_json::json!({
                    "configured": key.is_some(),
                    "key": key.as_ref().map(ApiKey::masked),
                    "key_file": store.path().display().to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                match key {
                    Some(key) => println!("{}", key.masked()),
                    None => println!("No API key configured ({})", store.path().display()),
                }
            }
        }
        KeyAction::Clear => {
            store.clear()?;
            println!("Removed {}", store.path().display());
        }
    }
    Ok(())
}
