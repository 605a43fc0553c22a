//! Drag-and-drop window: a drop target for a folder of images, a progress
//! bar, and a terminal outcome line.

use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender};
use egui::{Color32, ProgressBar};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{outcome_summary, UiEvent};
use crate::controller::orchestration::dispatch_backend_command;

pub struct ReconstructApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    status: String,
    folder: Option<String>,
    output: Option<PathBuf>,
    progress: f64,
    running: bool,
    last_outcome: Option<String>,
}

impl ReconstructApp {
    pub fn new(cmd_tx: Sender<BackendCommand>, ui_rx: Receiver<UiEvent>) -> Self {
        Self {
            cmd_tx,
            ui_rx,
            status: "Starting backend worker...".to_string(),
            folder: None,
            output: None,
            progress: 0.0,
            running: false,
            last_outcome: None,
        }
    }

    fn drain_backend_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::Info(message) => self.status = message,
                UiEvent::JobStarted { folder, output } => {
                    self.running = true;
                    self.progress = 0.0;
                    self.last_outcome = None;
                    self.status = format!("Reconstructing '{folder}'...");
                    self.folder = Some(folder);
                    self.output = Some(output);
                }
                UiEvent::Progress(fraction) => self.progress = fraction,
                UiEvent::JobRejected(message) => {
                    self.status = format!("Submission rejected: {message}");
                }
                UiEvent::Finished(outcome) => {
                    self.running = false;
                    self.last_outcome = Some(outcome_summary(&outcome));
                    self.status = "Idle".to_string();
                }
                UiEvent::Error(message) => self.status = message,
            }
        }
    }

    fn start_job(&mut self, input_dir: PathBuf) {
        dispatch_backend_command(
            &self.cmd_tx,
            BackendCommand::StartJob { input_dir },
            &mut self.status,
        );
    }

    fn handle_dropped_files(&mut self, dropped: Vec<egui::DroppedFile>) {
        let Some(first) = dropped.into_iter().next() else {
            return;
        };
        match accept_drop(self.running, first.path.as_deref()) {
            Ok(input_dir) => self.start_job(input_dir),
            Err(message) => self.status = message,
        }
    }
}

/// Drop policy: one job at a time, folders only.
fn accept_drop(running: bool, path: Option<&Path>) -> Result<PathBuf, String> {
    let Some(path) = path else {
        return Err("Dropped item has no filesystem path".to_string());
    };
    if running {
        return Err("A job is already running; drop ignored".to_string());
    }
    if !path.is_dir() {
        return Err(format!(
            "'{}' is not a folder; drop a folder of images",
            path.display()
        ));
    }
    Ok(path.to_path_buf())
}

impl eframe::App for ReconstructApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_backend_events();

        let hovering = ctx.input(|i| !i.raw.hovered_files.is_empty());
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        if !dropped.is_empty() {
            self.handle_dropped_files(dropped);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Photogrammetry");
            ui.add_space(8.0);

            let fill = if hovering {
                Color32::from_rgb(96, 176, 96)
            } else {
                ui.visuals().extreme_bg_color
            };
            egui::Frame::default()
                .fill(fill)
                .stroke(ui.visuals().window_stroke())
                .inner_margin(egui::Margin::same(24))
                .show(ui, |ui| {
                    ui.set_min_size(egui::vec2(320.0, 160.0));
                    ui.centered_and_justified(|ui| {
                        ui.label("Drag and drop a folder of images");
                    });
                });
            ui.add_space(8.0);

            match &self.folder {
                Some(folder) => ui.label(folder),
                None => ui.label("No folder selected yet"),
            };
            ui.add(ProgressBar::new(self.progress as f32).show_percentage());
            ui.add_space(8.0);

            ui.horizontal(|ui| {
                if ui.button("Choose folder...").clicked() {
                    if let Some(folder) = rfd::FileDialog::new().pick_folder() {
                        match accept_drop(self.running, Some(&folder)) {
                            Ok(input_dir) => self.start_job(input_dir),
                            Err(message) => self.status = message,
                        }
                    }
                }
                if ui
                    .add_enabled(self.running, egui::Button::new("Cancel"))
                    .clicked()
                {
                    dispatch_backend_command(
                        &self.cmd_tx,
                        BackendCommand::CancelJob,
                        &mut self.status,
                    );
                }
            });
            ui.add_space(8.0);

            ui.label(&self.status);
            if let Some(outcome) = &self.last_outcome {
                ui.label(outcome);
            }
            if let Some(output) = &self.output {
                ui.small(format!("Target: {}", output.display()));
            }
        });

        if self.running {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_is_rejected_while_a_job_runs() {
        let dir = std::env::temp_dir();
        let err = accept_drop(true, Some(&dir)).unwrap_err();
        assert!(err.contains("already running"));
    }

    #[test]
    fn drop_of_a_plain_file_is_rejected() {
        let file = std::env::temp_dir().join("reconstruct_gui_drop_test.txt");
        std::fs::write(&file, b"x").expect("scratch file");
        let err = accept_drop(false, Some(&file)).unwrap_err();
        assert!(err.contains("not a folder"));
        let _ = std::fs::remove_file(file);
    }

    #[test]
    fn drop_of_a_folder_is_accepted_when_idle() {
        let dir = std::env::temp_dir();
        assert_eq!(accept_drop(false, Some(&dir)).expect("accepted"), dir);
    }
}
