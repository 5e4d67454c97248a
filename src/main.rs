#![warn(clippy::all, rust_2018_idioms)]

use maxwell_board::BoardApp;
use maxwell_board::app::INITIAL_SIZE;
use maxwell_board::config::Settings;

fn main() -> eframe::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting maxwell-board {}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load_or_default();
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("maxwell")
            .with_inner_size(INITIAL_SIZE),
        ..Default::default()
    };
    eframe::run_native(
        "maxwell",
        native_options,
        Box::new(|cc| Ok(Box::new(BoardApp::new(cc, settings)))),
    )
}
