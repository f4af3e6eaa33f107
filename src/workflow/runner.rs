//! Sequences the four stages of a run.

use crate::backend::MediaBackend;
use crate::config::{ApiKey, Settings};
use crate::describe::DescribeRequest;
use crate::error::{MiniPresError, Result};
use crate::image::{save_png, ImageRequest};
use crate::providers::OpenAiBackendBuilder;
use crate::speech::SpeechRequest;
use crate::video::{ComposedVideo, CompositionRequest, FfmpegCompositor, VideoCompositor};
use crate::workflow::events::{RunState, RunSummary, Stage, WorkflowEvent};
use crate::workflow::outputs::OutputPaths;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Drives describe → image → speech → video for one query at a time.
///
/// Each [`submit`](Self::submit) gets its own worker thread; progress comes
/// back as [`WorkflowEvent`]s on the returned [`RunHandle`].
#[derive(Clone)]
pub struct WorkflowRunner {
    backend: Arc<dyn MediaBackend>,
    compositor: Arc<dyn VideoCompositor>,
    settings: Settings,
}

impl WorkflowRunner {
    /// Creates a runner over the given collaborators.
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        compositor: Arc<dyn VideoCompositor>,
        settings: Settings,
    ) -> Self {
        Self {
            backend,
            compositor,
            settings,
        }
    }

    /// Creates a runner backed by OpenAI and the ffmpeg compositor
    /// described in `settings`.
    pub fn with_openai(
        builder: OpenAiBackendBuilder,
        api_key: ApiKey,
        settings: Settings,
    ) -> Result<Self> {
        settings.validate()?;
        let backend = builder.api_key(api_key).build()?;
        let compositor = FfmpegCompositor::new()
            .program(&settings.ffmpeg)
            .codec(&settings.video_codec);
        Ok(Self::new(Arc::new(backend), Arc::new(compositor), settings))
    }

    /// Returns the settings runs use.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Trims a query, rejecting blank input.
    pub fn validate_query(query: &str) -> Result<String> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(MiniPresError::EmptyQuery);
        }
        Ok(trimmed.to_string())
    }

    /// Starts a run on a new worker thread.
    ///
    /// Blank queries are rejected here and no thread is started.
    pub fn submit(&self, query: &str) -> Result<RunHandle> {
        let query = Self::validate_query(query)?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let runner = self.clone();

        let worker = std::thread::Builder::new()
            .name("minipres-worker".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let err = MiniPresError::Worker(format!("failed to start runtime: {e}"));
                        return Err(Progress::new(&tx).abort(Stage::Describe, err));
                    }
                };
                runtime.block_on(runner.run(&query, &tx))
            })
            .map_err(|e| MiniPresError::Worker(e.to_string()))?;

        Ok(RunHandle { events: rx, worker })
    }

    /// Runs the whole workflow on the current task, reporting to `events`.
    ///
    /// Describe, image and speech failures end the run with an error. A
    /// video failure is reported as [`WorkflowEvent::VideoFailed`] and the
    /// run still completes.
    pub async fn run(&self, query: &str, events: &Sender<WorkflowEvent>) -> Result<RunSummary> {
        let query = Self::validate_query(query)?;
        self.settings.validate()?;
        let started = Instant::now();
        let settings = &self.settings;
        let mut progress = Progress::new(events);

        tracing::info!(
            backend = self.backend.name(),
            compositor = self.compositor.name(),
            query = %query,
            "starting run"
        );
        progress.enter(Stage::Describe);
        if let Err(e) = self.backend.health_check().await {
            return Err(progress.abort(Stage::Describe, e));
        }
        let request = DescribeRequest::new(&query).with_model(settings.chat_model);
        let description = match self.backend.describe(&request).await {
            Ok(description) => description,
            Err(e) => return Err(progress.abort(Stage::Describe, e)),
        };
        emit(events, WorkflowEvent::Described(description.clone()));

        progress.enter(Stage::Image);
        let request = ImageRequest::new(&description.image_prompt)
            .with_size(settings.image_size)
            .with_model(settings.image_model);
        let raster = match self.backend.generate_image(&request).await {
            Ok(image) => match image.to_raster() {
                Ok(raster) => Arc::new(raster),
                Err(e) => return Err(progress.abort(Stage::Image, e)),
            },
            Err(e) => return Err(progress.abort(Stage::Image, e)),
        };
        emit(
            events,
            WorkflowEvent::ImageReady {
                preview: Arc::clone(&raster),
            },
        );

        progress.enter(Stage::Speech);
        let paths = OutputPaths::for_run(&settings.output_dir, settings.layout);
        if let Err(e) = self.speak(&description.audio_text, &paths).await {
            return Err(progress.abort(Stage::Speech, e));
        }
        emit(events, WorkflowEvent::AudioReady(paths.audio.clone()));

        progress.enter(Stage::Video);
        let (video_path, video_error) = match self.compose(&raster, &paths).await {
            Ok(video) => {
                tracing::info!(
                    path = %video.path.display(),
                    size_bytes = video.size_bytes,
                    "video ready"
                );
                emit(events, WorkflowEvent::VideoReady(video.path.clone()));
                progress.finish();
                (Some(video.path), None)
            }
            Err(e) => {
                tracing::warn!("video generation failed: {e}");
                emit(events, WorkflowEvent::VideoFailed(e.to_string()));
                progress.recover();
                (None, Some(e.to_string()))
            }
        };

        let summary = RunSummary {
            query,
            description,
            frame_path: paths.frame,
            audio_path: paths.audio,
            video_path,
            video_error,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        emit(events, WorkflowEvent::Finished(summary.clone()));
        Ok(summary)
    }

    async fn speak(&self, text: &str, paths: &OutputPaths) -> Result<()> {
        let request = SpeechRequest::new(text)
            .with_voice(self.settings.voice)
            .with_model(self.settings.speech_model);
        let speech = self.backend.synthesize_speech(&request).await?;
        paths.prepare()?;
        speech.save(&paths.audio)?;
        tracing::debug!(path = %paths.audio.display(), bytes = speech.size(), "audio saved");
        Ok(())
    }

    async fn compose(&self, raster: &::image::RgbaImage, paths: &OutputPaths) -> Result<ComposedVideo> {
        // A stale clip must not survive a failed composition.
        match std::fs::remove_file(&paths.video) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        save_png(raster, &paths.frame)?;

        let request = CompositionRequest::new(&paths.frame, &paths.audio, &paths.video)
            .with_duration(self.settings.video_duration_secs)
            .with_fps(self.settings.video_fps);
        self.compositor.compose(&request).await
    }
}

/// Tracks the run state and reports each transition.
struct Progress<'a> {
    state: RunState,
    events: &'a Sender<WorkflowEvent>,
}

impl<'a> Progress<'a> {
    fn new(events: &'a Sender<WorkflowEvent>) -> Self {
        Self {
            state: RunState::Idle,
            events,
        }
    }

    fn set(&mut self, next: Option<RunState>) {
        match next {
            Some(state) => {
                self.state = state;
                emit(self.events, WorkflowEvent::Status(state));
            }
            None => tracing::error!(state = ?self.state, "illegal run state transition"),
        }
    }

    fn enter(&mut self, stage: Stage) {
        tracing::info!(stage = %stage, "{}", stage.status_text());
        self.set(self.state.start(stage));
    }

    /// Reports a fatal failure of `stage`. Also valid before any stage
    /// started, e.g. when the worker cannot set itself up.
    fn abort(&mut self, stage: Stage, err: MiniPresError) -> MiniPresError {
        tracing::error!(stage = %stage, "{}: {err}", stage.failure_text());
        emit(
            self.events,
            WorkflowEvent::Failed {
                stage,
                message: err.to_string(),
            },
        );
        let failed = self.state.fail().unwrap_or(RunState::Failed { stage });
        self.set(Some(failed));
        err.in_stage(stage)
    }

    fn recover(&mut self) {
        self.set(self.state.fail());
    }

    fn finish(&mut self) {
        self.set(self.state.finish());
    }
}

fn emit(events: &Sender<WorkflowEvent>, event: WorkflowEvent) {
    if events.send(event).is_err() {
        tracing::trace!("event receiver dropped");
    }
}

/// A run in flight on its worker thread.
pub struct RunHandle {
    events: Receiver<WorkflowEvent>,
    worker: JoinHandle<Result<RunSummary>>,
}

impl RunHandle {
    /// The event stream of this run. It disconnects when the run ends.
    pub fn events(&self) -> &Receiver<WorkflowEvent> {
        &self.events
    }

    /// Whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Waits for the run to end and returns its outcome.
    pub fn join(self) -> Result<RunSummary> {
        self.worker
            .join()
            .map_err(|_| MiniPresError::Worker("worker thread panicked".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputLayout;
    use crate::describe::Description;
    use crate::image::{sample_png, GeneratedImage};
    use crate::speech::GeneratedSpeech;
    use crate::workflow::WorkflowView;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const GOOD_REPLY: &str = r#"{"image_prompt":"a cat playing a piano","audio_text":"A cat is playing the piano.","video_prompt":"..."}"#;

    struct FakeBackend {
        reply: String,
        unhealthy: bool,
        image_fails: bool,
        speech_fails: bool,
        audio: Mutex<Vec<u8>>,
        image_calls: AtomicUsize,
        speech_calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                reply: GOOD_REPLY.to_string(),
                unhealthy: false,
                image_fails: false,
                speech_fails: false,
                audio: Mutex::new(b"ID3 first recording, rather long".to_vec()),
                image_calls: AtomicUsize::new(0),
                speech_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MediaBackend for FakeBackend {
        async fn describe(&self, _request: &DescribeRequest) -> Result<Description> {
            Description::parse(&self.reply)
        }

        async fn generate_image(&self, _request: &ImageRequest) -> Result<GeneratedImage> {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            if self.image_fails {
                return Err(MiniPresError::ContentBlocked("nope".into()));
            }
            GeneratedImage::from_bytes(sample_png(16, 16))
        }

        async fn synthesize_speech(&self, _request: &SpeechRequest) -> Result<GeneratedSpeech> {
            self.speech_calls.fetch_add(1, Ordering::SeqCst);
            if self.speech_fails {
                return Err(MiniPresError::Api {
                    status: 500,
                    message: "tts down".into(),
                });
            }
            Ok(GeneratedSpeech::new(self.audio.lock().unwrap().clone()))
        }

        fn name(&self) -> &str {
            "fake"
        }

        async fn health_check(&self) -> Result<()> {
            if self.unhealthy {
                return Err(MiniPresError::Auth("no usable key".into()));
            }
            Ok(())
        }
    }

    struct FakeCompositor {
        fails: bool,
        calls: AtomicUsize,
    }

    impl FakeCompositor {
        fn new(fails: bool) -> Self {
            Self {
                fails,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VideoCompositor for FakeCompositor {
        async fn compose(&self, request: &CompositionRequest) -> Result<ComposedVideo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.image_path.is_file());
            assert!(request.audio_path.is_file());
            assert_eq!(request.duration_secs, 5);
            if self.fails {
                return Err(MiniPresError::Composition("encoder exploded".into()));
            }
            std::fs::write(&request.output_path, b"fake mp4")?;
            Ok(ComposedVideo {
                path: request.output_path.clone(),
                size_bytes: 8,
                duration_secs: request.duration_secs,
                duration_ms: None,
            })
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn settings(dir: &Path) -> Settings {
        Settings {
            output_dir: dir.to_path_buf(),
            ..Settings::default()
        }
    }

    fn runner(
        backend: &Arc<FakeBackend>,
        compositor: &Arc<FakeCompositor>,
        dir: &Path,
    ) -> WorkflowRunner {
        WorkflowRunner::new(backend.clone(), compositor.clone(), settings(dir))
    }

    fn statuses(events: &[WorkflowEvent]) -> Vec<&'static str> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::Status(state) => Some(state.status_text()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_successful_run_reports_stages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::new());
        let compositor = Arc::new(FakeCompositor::new(false));
        let (tx, rx) = crossbeam_channel::unbounded();

        let summary = runner(&backend, &compositor, dir.path())
            .run("  a cat playing piano ", &tx)
            .await
            .unwrap();
        let events: Vec<_> = rx.try_iter().collect();

        assert_eq!(
            statuses(&events),
            [
                "Generating description...",
                "Generating image...",
                "Generating audio...",
                "Generating video...",
                "Done!",
            ]
        );
        assert_eq!(summary.query, "a cat playing piano");
        assert_eq!(summary.description.image_prompt, "a cat playing a piano");
        assert_eq!(summary.video_path, Some(dir.path().join("video.mp4")));
        assert!(dir.path().join("frame.png").is_file());
        assert!(!std::fs::read(dir.path().join("speech.mp3")).unwrap().is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkflowEvent::ImageReady { preview } if preview.dimensions() == (16, 16))));
        assert!(matches!(events.last(), Some(WorkflowEvent::Finished(_))));
    }

    #[tokio::test]
    async fn test_malformed_description_aborts_before_image() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend {
            reply: r#"{"image_prompt":"x","video_prompt":"z"}"#.to_string(),
            ..FakeBackend::new()
        });
        let compositor = Arc::new(FakeCompositor::new(false));
        let (tx, rx) = crossbeam_channel::unbounded();

        let err = runner(&backend, &compositor, dir.path())
            .run("a cat", &tx)
            .await
            .unwrap_err();
        let events: Vec<_> = rx.try_iter().collect();

        assert_eq!(err.stage(), Some(Stage::Describe));
        assert_eq!(backend.image_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            statuses(&events),
            ["Generating description...", "Error getting description"]
        );
        assert!(events.iter().any(|e| matches!(
            e,
            WorkflowEvent::Failed { stage: Stage::Describe, message } if message.contains("audio_text")
        )));
        assert!(!dir.path().join("speech.mp3").exists());
    }

    #[tokio::test]
    async fn test_non_json_description_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend {
            reply: "Here you go: a cat at a piano".to_string(),
            ..FakeBackend::new()
        });
        let compositor = Arc::new(FakeCompositor::new(false));
        let (tx, _rx) = crossbeam_channel::unbounded();

        let result = runner(&backend, &compositor, dir.path()).run("a cat", &tx).await;
        assert!(result.is_err());
        assert_eq!(backend.image_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unhealthy_backend_fails_in_describe_stage() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend {
            unhealthy: true,
            ..FakeBackend::new()
        });
        let compositor = Arc::new(FakeCompositor::new(false));
        let (tx, rx) = crossbeam_channel::unbounded();

        let err = runner(&backend, &compositor, dir.path())
            .run("a cat", &tx)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Describe));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            statuses(&events),
            ["Generating description...", "Error getting description"]
        );
        assert_eq!(backend.image_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_image_failure_aborts_before_speech() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend {
            image_fails: true,
            ..FakeBackend::new()
        });
        let compositor = Arc::new(FakeCompositor::new(false));
        let (tx, rx) = crossbeam_channel::unbounded();

        let err = runner(&backend, &compositor, dir.path())
            .run("a cat", &tx)
            .await
            .unwrap_err();
        let events: Vec<_> = rx.try_iter().collect();

        assert_eq!(err.stage(), Some(Stage::Image));
        assert_eq!(backend.speech_calls.load(Ordering::SeqCst), 0);
        assert_eq!(statuses(&events).last(), Some(&"Error generating image"));
    }

    #[tokio::test]
    async fn test_speech_failure_skips_video() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend {
            speech_fails: true,
            ..FakeBackend::new()
        });
        let compositor = Arc::new(FakeCompositor::new(false));
        let (tx, rx) = crossbeam_channel::unbounded();

        let err = runner(&backend, &compositor, dir.path())
            .run("a cat", &tx)
            .await
            .unwrap_err();
        let events: Vec<_> = rx.try_iter().collect();

        assert_eq!(err.stage(), Some(Stage::Speech));
        assert_eq!(compositor.calls.load(Ordering::SeqCst), 0);
        assert!(!events
            .iter()
            .any(|e| matches!(e, WorkflowEvent::AudioReady(_))));
        assert_eq!(statuses(&events).last(), Some(&"Error generating audio"));
    }

    #[tokio::test]
    async fn test_video_failure_still_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        // Left over from an earlier successful run.
        std::fs::write(dir.path().join("video.mp4"), b"old clip").unwrap();

        let backend = Arc::new(FakeBackend::new());
        let compositor = Arc::new(FakeCompositor::new(true));
        let (tx, rx) = crossbeam_channel::unbounded();

        let summary = runner(&backend, &compositor, dir.path())
            .run("a cat", &tx)
            .await
            .unwrap();
        let events: Vec<_> = rx.try_iter().collect();

        assert_eq!(statuses(&events).last(), Some(&"Done!"));
        assert!(summary.video_path.is_none());
        assert!(summary.video_error.unwrap().contains("encoder exploded"));
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkflowEvent::AudioReady(_))));
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkflowEvent::VideoFailed(_))));
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkflowEvent::Status(RunState::Done { video: false }))));
        assert!(!dir.path().join("video.mp4").exists());
        assert!(dir.path().join("speech.mp3").is_file());
    }

    #[tokio::test]
    async fn test_rerun_replaces_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::new());
        let compositor = Arc::new(FakeCompositor::new(false));
        let runner = runner(&backend, &compositor, dir.path());
        let (tx, _rx) = crossbeam_channel::unbounded();

        runner.run("first", &tx).await.unwrap();
        let first_frame = std::fs::read(dir.path().join("frame.png")).unwrap();

        *backend.audio.lock().unwrap() = b"ID3 2nd".to_vec();
        runner.run("second", &tx).await.unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("speech.mp3")).unwrap(),
            b"ID3 2nd"
        );
        assert_eq!(
            std::fs::read(dir.path().join("frame.png")).unwrap(),
            first_frame
        );
        assert_eq!(
            std::fs::read(dir.path().join("video.mp4")).unwrap(),
            b"fake mp4"
        );
    }

    #[tokio::test]
    async fn test_per_run_layout_keeps_runs_apart() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::new());
        let compositor = Arc::new(FakeCompositor::new(false));
        let runner = WorkflowRunner::new(
            backend.clone(),
            compositor.clone(),
            Settings {
                layout: OutputLayout::PerRun,
                ..settings(dir.path())
            },
        );
        let (tx, _rx) = crossbeam_channel::unbounded();

        let a = runner.run("one", &tx).await.unwrap();
        let b = runner.run("two", &tx).await.unwrap();

        assert_ne!(a.audio_path, b.audio_path);
        assert!(a.audio_path.is_file());
        assert!(b.audio_path.is_file());
        assert!(a.audio_path.starts_with(dir.path().join("runs")));
    }

    #[test]
    fn test_abort_before_any_stage_reports_failed_state() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let err = Progress::new(&tx).abort(
            Stage::Describe,
            MiniPresError::Worker("failed to start runtime".into()),
        );
        assert_eq!(err.stage(), Some(Stage::Describe));

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events[0], WorkflowEvent::Failed { stage: Stage::Describe, .. }));
        assert!(matches!(
            events[1],
            WorkflowEvent::Status(RunState::Failed {
                stage: Stage::Describe
            })
        ));

        let mut view = WorkflowView::new();
        for event in events {
            view.apply(event);
        }
        assert!(view.take_notice().is_some());
        assert!(view.take_notice().is_none());
        assert_eq!(view.status(), "Error getting description");
    }

    #[test]
    fn test_empty_query_starts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::new());
        let compositor = Arc::new(FakeCompositor::new(false));
        let runner = runner(&backend, &compositor, dir.path());

        for query in ["", "   ", "\t\n"] {
            assert!(matches!(
                runner.submit(query),
                Err(MiniPresError::EmptyQuery)
            ));
        }
        assert_eq!(backend.image_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_submit_runs_on_worker_thread() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::new());
        let compositor = Arc::new(FakeCompositor::new(false));
        let handle = runner(&backend, &compositor, dir.path())
            .submit("a cat playing piano")
            .unwrap();

        let events: Vec<WorkflowEvent> = handle.events().iter().collect();
        let summary = handle.join().unwrap();

        assert_eq!(statuses(&events).last(), Some(&"Done!"));
        assert_eq!(summary.video_path, Some(dir.path().join("video.mp4")));
    }
}
