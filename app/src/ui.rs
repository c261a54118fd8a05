use chrono::{DateTime, Local};
use egui::{self, Align, Color32, Frame, Layout, Margin, RichText, Vec2};
use egui_commonmark::{CommonMarkCache, CommonMarkViewer};
use ponder_core::state::{Message, MessageContent, MessageRole};
use ponder_core::stream::LiveEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

impl ThemeMode {
    pub const ALL: [ThemeMode; 3] = [ThemeMode::System, ThemeMode::Light, ThemeMode::Dark];

    pub fn label(self) -> &'static str {
        match self {
            ThemeMode::System => "System",
            ThemeMode::Light => "Light",
            ThemeMode::Dark => "Dark",
        }
    }

    pub fn fallback_theme(self) -> eframe::Theme {
        match self {
            ThemeMode::Light => eframe::Theme::Light,
            ThemeMode::System | ThemeMode::Dark => eframe::Theme::Dark,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemePalette {
    pub background: Color32,
    pub surface: Color32,
    pub user_bubble: Color32,
    pub assistant_bubble: Color32,
    pub accent: Color32,
    pub text_primary: Color32,
    pub text_secondary: Color32,
    pub border: Color32,
    pub warning: Color32,
}

impl ThemePalette {
    pub fn for_dark() -> Self {
        Self {
            background: color_from_hex("#1E1E1E"),
            surface: color_from_hex("#2D2D30"),
            user_bubble: color_from_hex("#3A3D41"),
            assistant_bubble: color_from_hex("#2D2D30"),
            accent: color_from_hex("#0078D7"),
            text_primary: color_from_hex("#E6E6E6"),
            text_secondary: color_from_hex("#B0B0B0"),
            border: color_from_hex("#3B3B3B"),
            warning: color_from_hex("#C63C3C"),
        }
    }

    pub fn for_light() -> Self {
        Self {
            background: color_from_hex("#FFFFFF"),
            surface: color_from_hex("#F9F9F9"),
            user_bubble: color_from_hex("#E5E5E5"),
            assistant_bubble: color_from_hex("#F9F9F9"),
            accent: color_from_hex("#0063B1"),
            text_primary: color_from_hex("#202020"),
            text_secondary: color_from_hex("#5F5F5F"),
            border: color_from_hex("#D0D0D0"),
            warning: color_from_hex("#B02020"),
        }
    }

    pub fn visuals(&self, dark_mode: bool) -> egui::Visuals {
        let mut visuals = if dark_mode {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        };
        visuals.window_fill = self.surface;
        visuals.panel_fill = self.background;
        visuals.extreme_bg_color = self.surface;
        visuals.widgets.noninteractive.bg_fill = self.surface;
        visuals.widgets.noninteractive.fg_stroke.color = self.text_primary;
        visuals.widgets.active.fg_stroke.color = self.text_primary;
        visuals.widgets.inactive.fg_stroke.color = self.text_primary;
        visuals.dark_mode = dark_mode;
        visuals
    }
}

fn color_from_hex(hex: &str) -> Color32 {
    let trimmed = hex.trim_start_matches('#');
    if trimmed.len() == 6 {
        if let Ok(value) = u32::from_str_radix(trimmed, 16) {
            let r = ((value >> 16) & 0xFF) as u8;
            let g = ((value >> 8) & 0xFF) as u8;
            let b = (value & 0xFF) as u8;
            return Color32::from_rgb(r, g, b);
        }
    }
    Color32::WHITE
}

/// View state for the turn currently streaming in.
#[derive(Debug, Default, Clone)]
pub struct LiveTurn {
    pub reasoning: String,
    pub answer: String,
    pub elapsed_secs: Option<u64>,
    pub thinking: bool,
}

impl LiveTurn {
    pub fn apply(&mut self, event: &LiveEvent) {
        match event {
            LiveEvent::Reasoning { text } => {
                self.thinking = true;
                self.reasoning.push_str(text);
            }
            LiveEvent::Content {
                text,
                elapsed_reasoning_secs,
            } => {
                self.thinking = false;
                self.elapsed_secs = *elapsed_reasoning_secs;
                self.answer.push_str(text);
            }
        }
    }
}

#[derive(Default)]
pub struct SidebarOutput {
    pub selection_changed: Option<(String, String)>,
    pub clear_clicked: bool,
}

pub struct Sidebar;

impl Sidebar {
    pub fn show(
        ui: &mut egui::Ui,
        palette: &ThemePalette,
        registry: &ponder_core::llm::ProviderRegistry,
        selected_provider: &mut Option<String>,
        selected_model: &mut Option<String>,
    ) -> SidebarOutput {
        let mut output = SidebarOutput::default();

        ui.heading("Settings");
        ui.add_space(8.0);

        let providers = registry.provider_names();
        if providers.is_empty() {
            ui.label(
                RichText::new("No providers configured")
                    .color(palette.warning)
                    .small(),
            );
            return output;
        }

        ui.label(RichText::new("Provider").color(palette.text_secondary).small());
        let provider_text = selected_provider.as_deref().unwrap_or("Select provider");
        egui::ComboBox::from_id_source("provider_selector")
            .selected_text(provider_text.to_string())
            .show_ui(ui, |ui| {
                for provider in &providers {
                    let active = selected_provider.as_deref() == Some(provider.as_str());
                    if ui.selectable_label(active, provider).clicked() && !active {
                        *selected_provider = Some(provider.clone());
                        *selected_model = None;
                    }
                }
            });

        let Some(provider) = selected_provider.clone() else {
            return output;
        };

        let models = registry.models(&provider).unwrap_or_default();
        ui.add_space(6.0);
        ui.label(RichText::new("Model").color(palette.text_secondary).small());
        let model_text = selected_model
            .as_deref()
            .map(|model| registry.display_name(&provider, model))
            .unwrap_or_else(|| "Select model".to_string());
        egui::ComboBox::from_id_source("model_selector")
            .selected_text(model_text)
            .show_ui(ui, |ui| {
                for model in &models {
                    let active = selected_model.as_deref() == Some(model.as_str());
                    let label = registry.display_name(&provider, model);
                    if ui.selectable_label(active, label).clicked() && !active {
                        *selected_model = Some(model.clone());
                        output.selection_changed = Some((provider.clone(), model.clone()));
                    }
                }
            });
        if models.is_empty() {
            ui.label(
                RichText::new("No models listed for this provider")
                    .color(palette.text_secondary)
                    .small(),
            );
        }

        ui.add_space(12.0);
        ui.separator();
        if ui.button("🗑 New chat").clicked() {
            output.clear_clicked = true;
        }

        output
    }
}

pub struct ChatPanel;

impl ChatPanel {
    pub fn show(
        ui: &mut egui::Ui,
        palette: &ThemePalette,
        markdown_cache: &mut CommonMarkCache,
        messages: &[Message],
        live: Option<&LiveTurn>,
    ) {
        egui::ScrollArea::vertical()
            .id_source("chat_history")
            .stick_to_bottom(true)
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                for message in messages {
                    Self::chat_bubble(ui, palette, markdown_cache, message);
                    ui.add_space(8.0);
                }
                if let Some(live) = live {
                    Self::streaming_bubble(ui, palette, markdown_cache, live);
                    ui.add_space(8.0);
                }
            });
    }

    fn chat_bubble(
        ui: &mut egui::Ui,
        palette: &ThemePalette,
        markdown_cache: &mut CommonMarkCache,
        message: &Message,
    ) {
        let is_user = matches!(message.role, MessageRole::User);
        let bubble_color = if is_user {
            palette.user_bubble
        } else {
            palette.assistant_bubble
        };
        let total_width = ui.available_width().max(0.0);
        let (bubble_width, leading_pad) = if is_user {
            let width = total_width.min(640.0).max(240.0).min(total_width);
            (width, (total_width - width).max(0.0))
        } else {
            (total_width, 0.0)
        };
        ui.horizontal(|ui| {
            if leading_pad > 0.0 {
                ui.add_space(leading_pad);
            }
            ui.allocate_ui_with_layout(
                Vec2::new(bubble_width, 0.0),
                Layout::top_down(Align::Min),
                |ui| {
                    ui.set_width(bubble_width);
                    Frame::none()
                        .fill(bubble_color)
                        .stroke(egui::Stroke::new(1.0, palette.border))
                        .rounding(egui::Rounding::same(10.0))
                        .inner_margin(Margin::symmetric(12.0, 8.0))
                        .show(ui, |ui| {
                            ui.horizontal(|ui| {
                                ui.label(RichText::new(role_label(&message.role)).strong());
                                ui.label(
                                    RichText::new(format_timestamp(message.created_at))
                                        .color(palette.text_secondary)
                                        .small(),
                                );
                            });
                            match &message.content {
                                MessageContent::Plain(text) => {
                                    if is_user {
                                        // User text is never interpreted as markup.
                                        ui.label(text);
                                    } else {
                                        CommonMarkViewer::new(format!("msg_{}", message.id)).show(
                                            ui,
                                            markdown_cache,
                                            text,
                                        );
                                    }
                                }
                                MessageContent::Phased {
                                    reasoning,
                                    answer,
                                    elapsed_reasoning_secs,
                                } => {
                                    Self::reasoning_section(
                                        ui,
                                        palette,
                                        message.id,
                                        reasoning,
                                        thought_header(*elapsed_reasoning_secs),
                                        false,
                                    );
                                    CommonMarkViewer::new(format!("msg_{}", message.id)).show(
                                        ui,
                                        markdown_cache,
                                        answer,
                                    );
                                }
                            }
                            if !message.attachments.is_empty() {
                                ui.horizontal(|ui| {
                                    for name in &message.attachments {
                                        ui.label(
                                            RichText::new(format!("📎 {name}"))
                                                .color(palette.text_secondary)
                                                .small(),
                                        );
                                    }
                                });
                            }
                        });
                },
            );
        });
    }

    fn streaming_bubble(
        ui: &mut egui::Ui,
        palette: &ThemePalette,
        markdown_cache: &mut CommonMarkCache,
        live: &LiveTurn,
    ) {
        Frame::none()
            .fill(palette.assistant_bubble)
            .stroke(egui::Stroke::new(1.0, palette.border))
            .rounding(egui::Rounding::same(10.0))
            .inner_margin(Margin::symmetric(12.0, 8.0))
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label(RichText::new("Ponder").strong());
                    if live.thinking || (live.reasoning.is_empty() && live.answer.is_empty()) {
                        ui.spinner();
                    }
                });
                if !live.reasoning.is_empty() {
                    let header = if live.thinking {
                        "Thinking…".to_string()
                    } else {
                        thought_header(live.elapsed_secs)
                    };
                    Self::reasoning_section(
                        ui,
                        palette,
                        uuid::Uuid::nil(),
                        &live.reasoning,
                        header,
                        true,
                    );
                }
                if !live.answer.is_empty() {
                    let draft = format!("{}▋", live.answer);
                    CommonMarkViewer::new("live_answer").show(ui, markdown_cache, &draft);
                }
            });
    }

    fn reasoning_section(
        ui: &mut egui::Ui,
        palette: &ThemePalette,
        id: uuid::Uuid,
        reasoning: &str,
        header: String,
        open: bool,
    ) {
        egui::CollapsingHeader::new(RichText::new(header).color(palette.accent).small())
            .id_source(("reasoning", id))
            .default_open(open)
            .show(ui, |ui| {
                ui.label(
                    RichText::new(reasoning)
                        .color(palette.text_secondary)
                        .italics(),
                );
            });
    }
}

fn thought_header(elapsed_secs: Option<u64>) -> String {
    match elapsed_secs {
        Some(secs) => format!("Thought for {secs}s"),
        None => "Thoughts".to_string(),
    }
}

fn role_label(role: &MessageRole) -> &'static str {
    match role {
        MessageRole::System => "System",
        MessageRole::User => "You",
        MessageRole::Assistant => "Ponder",
    }
}

fn format_timestamp(time: DateTime<chrono::Utc>) -> String {
    let local: DateTime<Local> = DateTime::from(time);
    local.format("%H:%M").to_string()
}

#[derive(Debug, Default, Clone)]
pub struct InputBarState {
    pub draft: String,
    pub attachments: Vec<String>,
}

#[derive(Default)]
pub struct InputBarOutput {
    pub send: bool,
    pub attach: bool,
}

pub struct InputBar;

impl InputBar {
    pub fn show(
        ui: &mut egui::Ui,
        state: &mut InputBarState,
        palette: &ThemePalette,
        busy: bool,
    ) -> InputBarOutput {
        let mut output = InputBarOutput::default();
        Frame::none()
            .fill(palette.surface)
            .rounding(6.0)
            .stroke(egui::Stroke::new(1.0, palette.border))
            .inner_margin(Margin::symmetric(10.0, 8.0))
            .show(ui, |ui| {
                let textarea = egui::TextEdit::multiline(&mut state.draft)
                    .desired_rows(3)
                    .desired_width(f32::INFINITY)
                    .hint_text("Message Ponder…")
                    .lock_focus(true)
                    .frame(false);
                let response = ui.add(textarea);
                let send_shortcut = ui
                    .input(|i| i.key_pressed(egui::Key::Enter) && !i.modifiers.shift);
                if send_shortcut && response.has_focus() && !busy {
                    output.send = true;
                }
                ui.horizontal(|ui| {
                    if ui.add_enabled(!busy, egui::Button::new("✈ Send")).clicked() {
                        output.send = true;
                    }
                    if ui.button("📎 Attach").clicked() {
                        output.attach = true;
                    }
                    for name in &state.attachments {
                        ui.label(
                            RichText::new(name)
                                .color(palette.text_secondary)
                                .small(),
                        );
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        let chars = state.draft.chars().count();
                        ui.label(
                            RichText::new(format!("{chars} chars"))
                                .color(palette.text_secondary)
                                .small(),
                        );
                    });
                });
            });
        output
    }
}
