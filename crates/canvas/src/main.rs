mod app;
mod map_view;
mod tile_fetch;

use app::CanvasApp;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opsmap_canvas=info".into()),
        )
        .init();

    // Parse --server <url> argument
    let server = parse_server_arg();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("OpsMap — Fleet Map")
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([800.0, 500.0]),
        ..Default::default()
    };

    if let Err(e) = eframe::run_native(
        "opsmap-canvas",
        native_options,
        Box::new(move |cc| Ok(Box::new(CanvasApp::new(cc, server)?))),
    ) {
        tracing::error!("Failed to start application: {e}");
    }
}

fn parse_server_arg() -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--server" && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}
