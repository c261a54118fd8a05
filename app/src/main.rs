use clap::Parser;
use eframe::egui;
use ponder::{load_ui_settings, PonderEguiApp};
use ponder_core::llm::ProviderRegistry;
use ponder_core::state::ChatSession;
use ponder_core::telemetry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "Ponder", version)]
struct Cli {
    /// Path to a providers.yaml, overriding the default lookup locations.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing(EnvFilter::from_default_env())?;

    let cli = Cli::parse();

    let runtime = Arc::new(Runtime::new()?);
    let registry = Arc::new(ProviderRegistry::from_file(cli.config.as_deref())?);
    let session = ChatSession::new(registry.clone());

    let ui_settings = runtime.block_on(load_ui_settings())?;
    let initial_size = ui_settings.window_size;
    let inner_size = egui::vec2(initial_size[0].max(960.0), initial_size[1].max(640.0));
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size(inner_size)
        .with_min_inner_size(egui::vec2(960.0, 640.0));
    let native_options = eframe::NativeOptions {
        viewport,
        follow_system_theme: true,
        default_theme: ui_settings.theme_mode.fallback_theme(),
        ..Default::default()
    };

    let runtime_for_ui = runtime.clone();
    eframe::run_native(
        "Ponder",
        native_options,
        Box::new(move |_cc| {
            Box::new(PonderEguiApp::new(
                session,
                registry,
                runtime_for_ui,
                ui_settings,
            ))
        }),
    )
    .map_err(|err| anyhow::anyhow!(err.to_string()))?;

    Ok(())
}
