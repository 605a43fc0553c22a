mod backend_bridge;
mod config;
mod controller;
mod ui;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "reconstruct_gui")]
struct Args {
    /// Override the simulated engine pacing from settings, in milliseconds.
    #[arg(long)]
    step_millis: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(step_millis) = args.step_millis {
        settings.simulated_step_millis = step_millis;
    }
    tracing::info!(?settings, "starting reconstruct gui");

    let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(32);
    let (ui_tx, ui_rx) = crossbeam_channel::bounded(256);
    backend_bridge::runtime::launch(settings, cmd_rx, ui_tx);

    let native_options = eframe::NativeOptions::default();
    eframe::run_native(
        "Reconstruct",
        native_options,
        Box::new(move |_cc| Ok(Box::new(ui::app::ReconstructApp::new(cmd_tx, ui_rx)))),
    )
    .map_err(|err| anyhow::anyhow!("failed to run ui: {err}"))?;
    Ok(())
}
