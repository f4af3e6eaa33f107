//! Desktop window: a query box, a Send button, a status line, the image
//! preview and buttons that hand the audio and video to the OS.

use crate::config::{ApiKey, ApiKeyStore, Settings};
use crate::error::MiniPresError;
use crate::launch::open_artifact;
use crate::providers::OpenAiBackendBuilder;
use crate::workflow::{Notice, RunHandle, RunState, WorkflowRunner, WorkflowView};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Everything the window needs at start-up.
pub struct GuiConfig {
    /// Where an entered key is persisted.
    pub key_store: ApiKeyStore,
    /// Key resolved before the window opened; when absent the window asks.
    pub api_key: Option<ApiKey>,
    /// Settings for every run.
    pub settings: Settings,
    /// Backend options; the key is filled in later.
    pub backend: OpenAiBackendBuilder,
}

/// How the window was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuiExit {
    /// The user closed the window.
    Closed,
    /// No API key was available and the user declined to enter one.
    KeyDeclined,
}

/// Opens the window and blocks until it is closed.
pub fn run(config: GuiConfig) -> eframe::Result<GuiExit> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([560.0, 720.0])
            .with_title("Mini Presentation"),
        ..Default::default()
    };

    let declined = Arc::new(AtomicBool::new(false));
    let app_declined = Arc::clone(&declined);
    eframe::run_native(
        "Mini Presentation",
        options,
        Box::new(move |_cc| Ok(Box::new(MiniPresApp::new(config, app_declined)))),
    )?;

    Ok(if declined.load(Ordering::SeqCst) {
        GuiExit::KeyDeclined
    } else {
        GuiExit::Closed
    })
}

struct MiniPresApp {
    key_store: ApiKeyStore,
    settings: Settings,
    backend: OpenAiBackendBuilder,
    runner: Option<WorkflowRunner>,
    key_input: String,
    key_declined: Arc<AtomicBool>,

    query: String,
    view: WorkflowView,
    handle: Option<RunHandle>,
    preview: Option<(egui::TextureHandle, u64)>,
    notice: Option<Notice>,
}

impl MiniPresApp {
    fn new(config: GuiConfig, key_declined: Arc<AtomicBool>) -> Self {
        let mut app = Self {
            key_store: config.key_store,
            settings: config.settings,
            backend: config.backend,
            runner: None,
            key_input: String::new(),
            key_declined,
            query: String::new(),
            view: WorkflowView::new(),
            handle: None,
            preview: None,
            notice: None,
        };
        if let Some(key) = config.api_key {
            app.connect(key);
        }
        app
    }

    fn connect(&mut self, key: ApiKey) {
        match WorkflowRunner::with_openai(self.backend.clone(), key, self.settings.clone()) {
            Ok(runner) => self.runner = Some(runner),
            Err(e) => self.view.notify(Notice::error(e.to_string())),
        }
    }

    fn busy(&self) -> bool {
        self.handle.is_some() || self.view.is_busy()
    }

    fn submit(&mut self) {
        let Some(runner) = &self.runner else {
            return;
        };
        match runner.submit(&self.query) {
            Ok(handle) => self.handle = Some(handle),
            Err(MiniPresError::EmptyQuery) => self.view.notify(Notice::input_required()),
            Err(e) => self.view.notify(Notice::error(e.to_string())),
        }
    }

    fn poll_events(&mut self) {
        let Some(handle) = &self.handle else {
            return;
        };
        for event in handle.events().try_iter() {
            self.view.apply(event);
        }
        if !handle.is_finished() {
            return;
        }

        let Some(handle) = self.handle.take() else {
            return;
        };
        for event in handle.events().try_iter() {
            self.view.apply(event);
        }
        if let Err(e) = handle.join() {
            // Stage failures were already reported through events.
            if !matches!(self.view.state(), RunState::Failed { .. }) {
                self.view.worker_lost(e.to_string());
            }
        }
    }

    fn save_key(&mut self) {
        match self.key_store.accept_entry(&self.key_input) {
            Ok(Some(key)) => {
                self.key_input.clear();
                self.connect(key);
            }
            Ok(None) => self.decline_key(),
            Err(e) => {
                tracing::warn!("could not persist API key: {e}");
                self.view.notify(Notice::error(format!(
                    "Cannot save key to {}: {e}",
                    self.key_store.path().display()
                )));
            }
        }
    }

    /// Without a key nothing can run; the window closes once the user has
    /// seen why.
    fn decline_key(&mut self) {
        self.key_declined.store(true, Ordering::SeqCst);
        self.view
            .notify(Notice::error("API key is required to continue."));
    }

    fn key_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("OpenAI API key");
        ui.label("Enter your OpenAI API key:");
        let response = ui.add(
            egui::TextEdit::singleline(&mut self.key_input)
                .password(true)
                .desired_width(360.0),
        );
        let entered = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
        ui.horizontal(|ui| {
            if ui.button("Save").clicked() || entered {
                self.save_key();
            }
            if ui.button("Cancel").clicked() {
                self.decline_key();
            }
        });
    }

    fn workflow_ui(&mut self, ui: &mut egui::Ui) {
        let busy = self.busy();

        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.query)
                    .hint_text("Enter a word or phrase")
                    .desired_width(380.0),
            );
            let entered = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            let clicked = ui.add_enabled(!busy, egui::Button::new("Send")).clicked();
            if clicked || (entered && !busy) {
                self.submit();
            }
        });

        ui.horizontal(|ui| {
            if busy {
                ui.spinner();
            }
            ui.label(self.view.status());
        });
        ui.separator();

        self.refresh_preview(ui.ctx());
        if let Some((texture, _)) = &self.preview {
            ui.add(
                egui::Image::new(texture)
                    .max_size(egui::vec2(512.0, 512.0))
                    .maintain_aspect_ratio(true),
            );
        }
        if let Some(description) = self.view.description() {
            ui.label(egui::RichText::new(&description.video_prompt).italics())
                .on_hover_text(&description.image_prompt);
        }

        ui.horizontal(|ui| {
            let audio = self.view.audio().map(|p| p.to_path_buf());
            if ui
                .add_enabled(audio.is_some(), egui::Button::new("Play Audio"))
                .clicked()
            {
                if let Some(path) = audio {
                    if let Err(e) = open_artifact(&path) {
                        self.view.notify(Notice::open_failed("play audio", e));
                    }
                }
            }

            let video = self.view.video().map(|p| p.to_path_buf());
            if ui
                .add_enabled(video.is_some(), egui::Button::new("Open Video"))
                .clicked()
            {
                if let Some(path) = video {
                    if let Err(e) = open_artifact(&path) {
                        self.view.notify(Notice::open_failed("open video", e));
                    }
                }
            }
        });
    }

    fn refresh_preview(&mut self, ctx: &egui::Context) {
        let Some((raster, version)) = self.view.preview() else {
            return;
        };
        if self.preview.as_ref().map(|(_, v)| *v) == Some(version) {
            return;
        }
        let size = [raster.width() as usize, raster.height() as usize];
        let image = egui::ColorImage::from_rgba_unmultiplied(size, raster.as_raw());
        let texture = ctx.load_texture("preview", image, egui::TextureOptions::LINEAR);
        self.preview = Some((texture, version));
    }

    fn notice_ui(&mut self, ctx: &egui::Context) {
        let Some(notice) = &self.notice else {
            return;
        };

        // Blocking dialogs sit in the middle while the panel underneath is
        // disabled; warnings sit at the bottom and leave it usable.
        let anchor = if notice.is_blocking() {
            (egui::Align2::CENTER_CENTER, [0.0, 0.0])
        } else {
            (egui::Align2::CENTER_BOTTOM, [0.0, -16.0])
        };
        let mut dismissed = false;
        egui::Window::new(notice.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(anchor.0, anchor.1)
            .show(ctx, |ui| {
                ui.label(notice.message.as_str());
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if !dismissed {
            return;
        }

        self.notice = None;
        if self.key_declined.load(Ordering::SeqCst) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}

impl eframe::App for MiniPresApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_events();
        if self.busy() {
            // Events arrive from the worker without waking the UI.
            ctx.request_repaint_after(Duration::from_millis(100));
        }
        if self.notice.is_none() {
            self.notice = self.view.take_notice();
        }
        let blocked = self.notice.as_ref().is_some_and(Notice::is_blocking);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(!blocked, |ui| {
                if self.runner.is_some() {
                    self.workflow_ui(ui);
                } else {
                    self.key_ui(ui);
                }
            });
        });

        self.notice_ui(ctx);
    }
}
