mod app;
mod audio;
mod bands;
mod engine;
mod error;
mod playback;
mod playhead;
mod presets;
mod scheduler;
mod spectrum;
mod transport;
mod ui;
mod view_sync;

use app::EqApp;
use eframe::egui;

fn main() -> eframe::Result<()> {
    env_logger::init();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native(
        "abeq",
        options,
        Box::new(|_cc| Ok(Box::new(EqApp::new()))),
    )
}
