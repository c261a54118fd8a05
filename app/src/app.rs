use crate::config::{save_ui_settings, UiSettings};
use crate::ui::{ChatPanel, InputBar, InputBarState, LiveTurn, Sidebar, ThemeMode, ThemePalette};
use egui_commonmark::CommonMarkCache;
use ponder_core::error::ChatError;
use ponder_core::llm::ProviderRegistry;
use ponder_core::state::{ChatSession, TurnUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::error;

pub struct PonderEguiApp {
    session: ChatSession,
    registry: Arc<ProviderRegistry>,
    runtime: Arc<Runtime>,
    settings: UiSettings,
    input: InputBarState,
    selected_provider: Option<String>,
    selected_model: Option<String>,
    live: Option<LiveTurn>,
    error: Option<String>,
    turn_rx: Option<UnboundedReceiver<Result<TurnUpdate, ChatError>>>,
    markdown_cache: CommonMarkCache,
}

impl PonderEguiApp {
    pub fn new(
        session: ChatSession,
        registry: Arc<ProviderRegistry>,
        runtime: Arc<Runtime>,
        settings: UiSettings,
    ) -> Self {
        let mut app = Self {
            session,
            registry,
            runtime,
            settings,
            input: InputBarState::default(),
            selected_provider: None,
            selected_model: None,
            live: None,
            error: None,
            turn_rx: None,
            markdown_cache: CommonMarkCache::default(),
        };
        app.restore_last_selection();
        app
    }

    fn restore_last_selection(&mut self) {
        let (Some(provider), Some(model)) = (
            self.settings.last_provider.clone(),
            self.settings.last_model.clone(),
        ) else {
            return;
        };
        match self.session.select_model(&provider, &model) {
            Ok(()) => {
                self.selected_provider = Some(provider);
                self.selected_model = Some(model);
            }
            Err(err) => {
                tracing::warn!("error" = %err, "stored model selection no longer valid");
            }
        }
    }

    fn apply_selection(&mut self, provider: String, model: String) {
        match self.session.select_model(&provider, &model) {
            Ok(()) => {
                self.error = None;
                self.settings.last_provider = Some(provider);
                self.settings.last_model = Some(model);
                self.persist_settings();
            }
            Err(err) => {
                self.selected_model = None;
                self.error = Some(err.to_string());
            }
        }
    }

    fn persist_settings(&self) {
        let settings = self.settings.clone();
        self.runtime.spawn(async move {
            if let Err(err) = save_ui_settings(&settings).await {
                tracing::warn!("error" = %err, "failed to persist ui settings");
            }
        });
    }

    fn submit_message(&mut self) {
        let content = self.input.draft.trim().to_owned();
        if content.is_empty() || self.turn_rx.is_some() {
            return;
        }
        let attachments = std::mem::take(&mut self.input.attachments);
        let _guard = self.runtime.enter();
        match self.session.submit_turn_streaming(content, attachments) {
            Ok(rx) => {
                self.input.draft.clear();
                self.live = Some(LiveTurn::default());
                self.error = None;
                self.turn_rx = Some(rx);
            }
            Err(err) => {
                // Draft and attachments stay in place so the user can retry.
                self.error = Some(err.to_string());
            }
        }
    }

    fn attach_file(&mut self) {
        if let Some(path) = rfd::FileDialog::new().pick_file() {
            self.input.attachments.push(path.display().to_string());
        }
    }

    fn clear_conversation(&mut self) {
        self.session.clear();
        self.live = None;
        self.error = None;
    }

    fn drain_turn_updates(&mut self) {
        let Some(mut rx) = self.turn_rx.take() else {
            return;
        };
        let mut still_streaming = true;
        loop {
            match rx.try_recv() {
                Ok(Ok(TurnUpdate::Event(event))) => {
                    if let Some(live) = self.live.as_mut() {
                        live.apply(&event);
                    }
                }
                Ok(Ok(TurnUpdate::Completed(_))) => {
                    // The session already appended the message; the next
                    // history snapshot repaints it.
                    self.live = None;
                    still_streaming = false;
                    break;
                }
                Ok(Err(err)) => {
                    error!("error" = %err, "turn failed");
                    self.live = None;
                    self.error = Some(err.to_string());
                    still_streaming = false;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.live = None;
                    still_streaming = false;
                    break;
                }
            }
        }
        if still_streaming {
            self.turn_rx = Some(rx);
        }
    }

    fn palette(&self, ctx: &egui::Context) -> (ThemePalette, bool) {
        let dark = match self.settings.theme_mode {
            ThemeMode::Dark => true,
            ThemeMode::Light => false,
            ThemeMode::System => ctx.style().visuals.dark_mode,
        };
        let palette = if dark {
            ThemePalette::for_dark()
        } else {
            ThemePalette::for_light()
        };
        (palette, dark)
    }
}

impl eframe::App for PonderEguiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_turn_updates();

        let (palette, dark) = self.palette(ctx);
        ctx.set_visuals(palette.visuals(dark));

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Ponder");
                if let Some(error) = &self.error {
                    ui.colored_label(palette.warning, error);
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    egui::ComboBox::from_id_source("theme_selector")
                        .selected_text(self.settings.theme_mode.label())
                        .show_ui(ui, |ui| {
                            for mode in ThemeMode::ALL {
                                if ui
                                    .selectable_label(self.settings.theme_mode == mode, mode.label())
                                    .clicked()
                                    && self.settings.theme_mode != mode
                                {
                                    self.settings.theme_mode = mode;
                                    self.persist_settings();
                                }
                            }
                        });
                });
            });
        });

        egui::SidePanel::left("sidebar").show(ctx, |ui| {
            let output = Sidebar::show(
                ui,
                &palette,
                &self.registry,
                &mut self.selected_provider,
                &mut self.selected_model,
            );
            if let Some((provider, model)) = output.selection_changed {
                self.apply_selection(provider, model);
            }
            if output.clear_clicked {
                self.clear_conversation();
            }
        });

        egui::TopBottomPanel::bottom("input").show(ctx, |ui| {
            let busy = self.turn_rx.is_some();
            let output = InputBar::show(ui, &mut self.input, &palette, busy);
            if output.send {
                self.submit_message();
            }
            if output.attach {
                self.attach_file();
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let messages = self.session.history();
            if messages.is_empty() && self.live.is_none() {
                ui.label("Pick a provider and model, then start the conversation.");
            } else {
                ChatPanel::show(
                    ui,
                    &palette,
                    &mut self.markdown_cache,
                    &messages,
                    self.live.as_ref(),
                );
            }
        });

        if self.turn_rx.is_some() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }
}
