//! VDU viewer — entry point.
//!
//! ```text
//! vdu-viewer                     Connect with defaults
//! vdu-viewer --config <path>     Use custom config TOML
//! vdu-viewer --gen-config        Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vdu_core::{
    DisplayController, DisplayEvent, FilePreferenceStore, HttpConfigService, RendererSelector,
    ViewSize,
};

use vdu_viewer::config::ViewerConfig;
use vdu_viewer::loader::EngineLoader;
use vdu_viewer::overlay::LoadingOverlay;
use vdu_viewer::supervisor::StreamSupervisor;
use vdu_viewer::surface::ViewportSurface;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vdu-viewer", about = "VDU remote virtual display viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vdu-viewer.toml")]
    config: PathBuf,

    /// Device base URL (overrides config). Example: http://192.168.1.50:8722
    #[arg(short, long)]
    device: Option<String>,

    /// Frame stream address (overrides config). Example: 192.168.1.50:8723
    #[arg(short, long)]
    stream: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(base_url) = cli.device {
        config.device.base_url = base_url;
    }
    if let Some(addr) = cli.stream {
        config.device.stream_address = addr;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vdu-viewer v{}", env!("CARGO_PKG_VERSION"));
    info!("device {}", config.device.base_url);

    // ── 1. Decode domain ────────────────────────────────────────

    let (frames, mut frame_rx) = ViewportSurface::channel();
    let selector = Arc::new(RendererSelector::new(Arc::new(EngineLoader::new(frames))));
    let (overlay, mut overlay_rx) = LoadingOverlay::new();

    // ── 2. Control domain ───────────────────────────────────────

    let service = Arc::new(HttpConfigService::new(&config.device.base_url));
    let prefs = Arc::new(FilePreferenceStore::open(&config.device.preferences)?);
    let supervisor = Arc::new(StreamSupervisor::new(
        selector,
        &config.device.stream_address,
        overlay.clone(),
    ));

    let (mut controller, mut handles) = DisplayController::new(service, prefs, supervisor);
    let view = ViewSize::new(config.display.width, config.display.height);
    controller.initialize(view).await?;
    let controller_task = tokio::spawn(controller.run());

    // ── 3. Event loop ───────────────────────────────────────────

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt, shutting down");
                handles.handle.shutdown();
                break;
            }
            event = handles.events.recv() => match event {
                None => break,
                Some(DisplayEvent::DisplayTypeSelectionRequired) => {
                    // No selection UI on this host; take the primary
                    // display and remember the choice.
                    info!("secondary display available, defaulting to primary");
                    handles.handle.resolve_display_type(true);
                }
                Some(DisplayEvent::SessionRefreshed { size }) => {
                    info!("session refreshed at {size}");
                }
                Some(DisplayEvent::SessionRestartRequired) => {
                    warn!("renderer changed on the device, restart the viewer");
                    handles.handle.shutdown();
                    break;
                }
            },
            changed = handles.mode.changed() => {
                if changed.is_err() {
                    break;
                }
                overlay.on_mode(*handles.mode.borrow_and_update());
            }
            changed = frame_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(frame) = frame_rx.borrow_and_update().clone() {
                    tracing::trace!(
                        "frame {}x{} at {}us",
                        frame.width,
                        frame.height,
                        frame.timestamp_us
                    );
                }
            }
            changed = overlay_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let visible = *overlay_rx.borrow_and_update();
                info!("loading overlay {}", if visible { "shown" } else { "hidden" });
            }
        }
    }

    // ── 4. Shutdown ─────────────────────────────────────────────

    let _ = controller_task.await;
    info!("stopped");
    Ok(())
}
