use eframe::egui;
use egui::{Align2, Color32, FontId};
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::mpsc;
use uuid::Uuid;

use crate::canvas::{Canvas, PointerEvent};
use crate::components::history::HistoryPanel;
use crate::components::tools::BrushTool;
use crate::engine::{EngineConfig, EngineLoader, EngineStatus};
use crate::io::{self, FileHandler, SESSION_EXTENSION, SaveFormat, SessionFileV1};
use crate::ops::inpaint::InpaintMethod;
use crate::ops::remove::{InpaintJob, InpaintParams, RemoveError};
use crate::project::Project;
use crate::settings::{AppSettings, RADIUS_MAX};

/// Result of a background removal pass.
struct JobResult {
    project_id: Uuid,
    result: Result<RgbaImage, RemoveError>,
}

/// Result of a background file load.
enum IoResult {
    Image { path: PathBuf, image: RgbaImage },
    Session { path: PathBuf, session: SessionFileV1 },
    Failed { path: PathBuf, message: String },
}

pub struct DewatermarkApp {
    settings: AppSettings,
    engine: EngineLoader,
    /// Time of the last readiness probe (egui seconds).
    last_engine_poll: f64,
    project: Option<Project>,
    canvas: Canvas,
    brush: BrushTool,
    history_panel: HistoryPanel,
    file_handler: FileHandler,
    /// Pass accepted by the project, waiting for its start time so the
    /// processing notice gets drawn first.
    pending_job: Option<(f64, InpaintJob)>,
    job_sender: mpsc::Sender<JobResult>,
    job_receiver: mpsc::Receiver<JobResult>,
    io_sender: mpsc::Sender<IoResult>,
    io_receiver: mpsc::Receiver<IoResult>,
    loading_file: bool,
    error_notice: Option<String>,
    status_line: String,
}

impl DewatermarkApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = AppSettings::load();
        crate::log_info!("Settings: {:?}", settings);
        let engine = EngineLoader::spawn(EngineConfig::default());
        let (job_sender, job_receiver) = mpsc::channel();
        let (io_sender, io_receiver) = mpsc::channel();
        let mut file_handler = FileHandler::new();
        file_handler.last_format = settings.export_format;
        file_handler.last_quality = settings.jpeg_quality;
        Self {
            brush: BrushTool::new(settings.brush_size),
            settings,
            engine,
            last_engine_poll: f64::NEG_INFINITY,
            project: None,
            canvas: Canvas::new(),
            history_panel: HistoryPanel::default(),
            file_handler,
            pending_job: None,
            job_sender,
            job_receiver,
            io_sender,
            io_receiver,
            loading_file: false,
            error_notice: None,
            status_line: String::new(),
        }
    }

    fn inpaint_params(&self) -> InpaintParams {
        InpaintParams {
            radius: self.settings.inpaint_radius,
            method: self.settings.inpaint_method,
            threshold: self.settings.mask_threshold,
        }
    }

    // ------------------------------------------------------------------
    // Engine readiness
    // ------------------------------------------------------------------

    fn poll_engine(&mut self, ctx: &egui::Context, now: f64) {
        if !matches!(self.engine.status(), EngineStatus::Loading) {
            return;
        }
        let interval = self.settings.engine_poll_ms as f64 / 1000.0;
        if now - self.last_engine_poll >= interval {
            self.last_engine_poll = now;
            if let EngineStatus::Failed(msg) = self.engine.poll() {
                self.error_notice = Some(format!("The inpainting engine failed to start: {}", msg));
            }
        }
        if matches!(self.engine.status(), EngineStatus::Loading) {
            let poll = std::time::Duration::from_millis(self.settings.engine_poll_ms);
            ctx.request_repaint_after(poll);
        }
    }

    // ------------------------------------------------------------------
    // File loading
    // ------------------------------------------------------------------

    fn open_dialog(&mut self) {
        if let Some(path) = self.file_handler.pick_image_path() {
            self.start_load(path);
        }
    }

    fn start_load(&mut self, path: PathBuf) {
        let sender = self.io_sender.clone();
        self.loading_file = true;
        crate::log_info!("Opening {}", path.display());
        rayon::spawn(move || {
            let is_session = path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(SESSION_EXTENSION));
            let msg = if is_session {
                match io::read_session(&path) {
                    Ok(session) => IoResult::Session { path, session },
                    Err(e) => IoResult::Failed {
                        message: e.to_string(),
                        path,
                    },
                }
            } else {
                match io::load_image_sync(&path) {
                    Ok(image) => IoResult::Image { path, image },
                    Err(e) => IoResult::Failed {
                        message: e.to_string(),
                        path,
                    },
                }
            };
            let _ = sender.send(msg);
        });
    }

    fn receive_io(&mut self) {
        while let Ok(msg) = self.io_receiver.try_recv() {
            self.loading_file = false;
            match msg {
                IoResult::Image { path, image } => {
                    self.install_project(Project::from_image(
                        image,
                        Some(path),
                        self.settings.max_width,
                        self.settings.max_undo_steps,
                    ));
                }
                IoResult::Session { path, session } => {
                    let brush = session.brush_size;
                    let max_undo = self.settings.max_undo_steps;
                    match Project::from_session(session, path.clone(), max_undo) {
                        Ok(project) => {
                            self.brush = BrushTool::new(brush);
                            self.install_project(project);
                        }
                        Err(e) => self.report_load_failure(&path, &e.to_string()),
                    }
                }
                IoResult::Failed { path, message } => self.report_load_failure(&path, &message),
            }
        }
    }

    fn install_project(&mut self, project: Project) {
        let (w, h) = project.working_size();
        self.status_line = format!("{} ({}x{})", project.name, w, h);
        self.file_handler.track(project.path.as_deref());
        self.project = Some(project);
        self.pending_job = None;
        self.canvas.invalidate();
    }

    fn report_load_failure(&mut self, path: &std::path::Path, message: &str) {
        crate::log_err!("Failed to open {}: {}", path.display(), message);
        self.error_notice = Some(format!("Could not open {}:\n{}", path.display(), message));
    }

    // ------------------------------------------------------------------
    // Removal passes
    // ------------------------------------------------------------------

    fn request_removal(&mut self, now: f64) {
        let params = self.inpaint_params();
        let ready = self.engine.is_ready();
        let Some(project) = self.project.as_mut() else {
            crate::log_info!("Remove ignored: {}", RemoveError::NoImage);
            return;
        };
        match project.begin_inpaint(ready, params) {
            Ok(job) => {
                let start = now + self.settings.invoke_delay_ms as f64 / 1000.0;
                self.pending_job = Some((start, job));
            }
            Err(e) => {
                crate::log_info!("Remove ignored: {}", e);
            }
        }
    }

    fn start_pending_job(&mut self, ctx: &egui::Context, now: f64) {
        let Some((start, _)) = &self.pending_job else { return };
        if now < *start {
            ctx.request_repaint_after(std::time::Duration::from_secs_f64(*start - now));
            return;
        }
        let Some((_, job)) = self.pending_job.take() else { return };
        let Some(project_id) = self.project.as_ref().map(|p| p.id) else { return };
        let Some(engine) = self.engine.engine().cloned() else {
            if let Some(project) = self.project.as_mut() {
                let _ = project.finish_inpaint(Err(RemoveError::EngineNotReady));
            }
            return;
        };

        let sender = self.job_sender.clone();
        let ctx = ctx.clone();
        rayon::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job.run(&engine)))
                .unwrap_or_else(|panic_info| {
                    let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.to_string()
                    } else {
                        "unknown panic payload".to_string()
                    };
                    crate::log_err!("Removal worker panicked: {}", msg);
                    Err(RemoveError::Panicked(msg))
                });
            let _ = sender.send(JobResult { project_id, result });
            ctx.request_repaint();
        });
    }

    fn receive_jobs(&mut self) {
        while let Ok(JobResult { project_id, result }) = self.job_receiver.try_recv() {
            let Some(project) = self.project.as_mut().filter(|p| p.id == project_id) else {
                crate::log_warn!("Dropping removal result for a closed image");
                continue;
            };
            if let Err(e) = project.finish_inpaint(result)
                && !e.is_noop()
            {
                self.error_notice = Some(e.user_message().to_string());
            }
        }
    }

    // ------------------------------------------------------------------
    // Export / sessions
    // ------------------------------------------------------------------

    fn export(&mut self) {
        let Some(project) = self.project.as_mut() else { return };
        let default_name =
            io::export_file_name(&self.settings.export_name, self.file_handler.last_format);
        let Some(path) = self.file_handler.pick_export_path(&default_name) else { return };
        match self.file_handler.export(project.export_image(), &path) {
            Ok(()) => {
                crate::log_info!("Exported {}", path.display());
                project.mark_clean();
                self.status_line = format!("Saved {}", path.display());
            }
            Err(e) => {
                crate::log_err!("Export to {} failed: {}", path.display(), e);
                self.error_notice = Some(format!("Could not save {}:\n{}", path.display(), e));
            }
        }
    }

    fn save_session(&mut self) {
        let Some(project) = self.project.as_ref() else { return };
        let stem = project
            .name
            .rsplit_once('.')
            .map(|(s, _)| s)
            .unwrap_or(&project.name);
        let default_name = format!("{}.{}", stem, SESSION_EXTENSION);
        let Some(path) = self.file_handler.pick_session_path(&default_name) else { return };
        match io::write_session(&project.to_session(self.brush.size), &path) {
            Ok(()) => {
                crate::log_info!("Session saved to {}", path.display());
            }
            Err(e) => {
                crate::log_err!("Session save failed: {}", e);
                self.error_notice = Some(format!("Could not save session:\n{}", e));
            }
        }
    }

    // ------------------------------------------------------------------
    // UI
    // ------------------------------------------------------------------

    fn handle_shortcuts(&mut self, ctx: &egui::Context, now: f64) {
        let (undo, open, save, run) = ctx.input_mut(|i| {
            (
                i.consume_key(egui::Modifiers::COMMAND, egui::Key::Z),
                i.consume_key(egui::Modifiers::COMMAND, egui::Key::O),
                i.consume_key(egui::Modifiers::COMMAND, egui::Key::S),
                i.consume_key(egui::Modifiers::NONE, egui::Key::Enter),
            )
        });
        if undo && let Some(p) = self.project.as_mut() {
            p.undo();
        }
        if open {
            self.open_dialog();
        }
        if save {
            self.export();
        }
        if run {
            self.request_removal(now);
        }

        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .collect()
        });
        if let Some(path) = dropped.into_iter().next() {
            self.start_load(path);
        }
    }

    fn show_side_panel(&mut self, ctx: &egui::Context, now: f64) {
        egui::SidePanel::left("tools").resizable(false).default_width(220.0).show(ctx, |ui| {
            ui.heading("Dewatermark");
            ui.separator();

            ui.horizontal_wrapped(|ui| {
                if ui.button("Open…").clicked() {
                    self.open_dialog();
                }
                let has_image = self.project.is_some();
                if ui.add_enabled(has_image, egui::Button::new("Save image…")).clicked() {
                    self.export();
                }
                if ui.add_enabled(has_image, egui::Button::new("Save session…")).clicked() {
                    self.save_session();
                }
            });
            ui.separator();

            if self.brush.show(ui) {
                self.settings.brush_size = self.brush.size;
                self.settings.save();
            }
            ui.separator();

            let mut changed = false;
            egui::ComboBox::from_label("Method")
                .selected_text(self.settings.inpaint_method.label())
                .show_ui(ui, |ui| {
                    for m in InpaintMethod::all() {
                        changed |= ui
                            .selectable_value(&mut self.settings.inpaint_method, *m, m.label())
                            .changed();
                    }
                });
            ui.horizontal(|ui| {
                ui.label("Radius");
                let radius = egui::DragValue::new(&mut self.settings.inpaint_radius)
                    .clamp_range(1..=RADIUS_MAX);
                changed |= ui.add(radius).changed();
            });
            egui::ComboBox::from_label("Export format")
                .selected_text(self.file_handler.last_format.label())
                .show_ui(ui, |ui| {
                    for f in SaveFormat::all() {
                        if ui
                            .selectable_value(&mut self.file_handler.last_format, *f, f.label())
                            .changed()
                        {
                            self.settings.export_format = *f;
                            changed = true;
                        }
                    }
                });
            if changed {
                self.settings.save();
            }
            ui.separator();

            let busy = self.project.as_ref().is_some_and(|p| p.is_processing());
            let can_edit = self.project.is_some() && !busy;
            ui.horizontal(|ui| {
                let can_undo =
                    can_edit && self.project.as_ref().is_some_and(|p| p.history.can_undo());
                if ui.add_enabled(can_undo, egui::Button::new("Undo")).clicked()
                    && let Some(p) = self.project.as_mut()
                {
                    p.undo();
                }
                if ui.add_enabled(can_edit, egui::Button::new("Reset")).clicked()
                    && let Some(p) = self.project.as_mut()
                {
                    p.reset();
                }
            });

            let can_remove = can_edit && self.engine.is_ready();
            let label = if busy { "Processing…" } else { "Remove watermark" };
            if ui
                .add_enabled(can_remove, egui::Button::new(label).min_size(egui::vec2(180.0, 32.0)))
                .clicked()
            {
                self.request_removal(now);
            }

            ui.separator();
            match self.engine.status() {
                EngineStatus::Loading => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Loading engine…");
                    });
                }
                EngineStatus::Ready => {
                    ui.colored_label(Color32::from_rgb(60, 170, 90), "Engine ready");
                }
                EngineStatus::Failed(_) => {
                    ui.colored_label(Color32::from_rgb(220, 60, 60), "Engine unavailable");
                }
            }
            if let Some(project) = &self.project {
                self.history_panel.show(ui, &project.history);
            }
            if !self.status_line.is_empty() {
                ui.weak(&self.status_line);
            }
        });
    }

    fn show_canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(project) = self.project.as_mut() else {
                ui.centered_and_justified(|ui| {
                    if self.loading_file {
                        ui.spinner();
                    } else {
                        ui.label(
                            "Open or drop an image, paint over the watermark, then press Remove.",
                        );
                    }
                });
                return;
            };

            let events = self.canvas.show(ui, &project.canvas_state);
            for event in events {
                match event {
                    PointerEvent::Press(at) => project.press(at, self.brush.size),
                    PointerEvent::Move(at) => project.move_to(at),
                    PointerEvent::Release | PointerEvent::Leave => project.release(),
                }
            }

            if project.is_processing()
                && let Some(mapping) = self.canvas.last_mapping
            {
                let painter = ui.painter();
                painter.rect_filled(mapping.display, 0.0, Color32::from_black_alpha(140));
                painter.text(
                    mapping.display.center(),
                    Align2::CENTER_CENTER,
                    "Processing…",
                    FontId::proportional(22.0),
                    Color32::WHITE,
                );
                ctx.request_repaint();
            }
        });
    }

    fn show_error_notice(&mut self, ctx: &egui::Context) {
        let Some(message) = self.error_notice.clone() else { return };
        let mut open = true;
        egui::Window::new("Something went wrong")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .open(&mut open)
            .show(ctx, |ui| {
                ui.label(&message);
                if ui.button("OK").clicked() {
                    self.error_notice = None;
                }
            });
        if !open {
            self.error_notice = None;
        }
    }
}

impl eframe::App for DewatermarkApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = ctx.input(|i| i.time);

        let title = match &self.project {
            Some(p) => format!("Dewatermark - {}", p.display_title()),
            None => "Dewatermark".to_string(),
        };
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(title));

        self.poll_engine(ctx, now);
        self.receive_io();
        self.receive_jobs();
        self.start_pending_job(ctx, now);
        self.handle_shortcuts(ctx, now);

        self.show_side_panel(ctx, now);
        self.show_canvas(ctx);
        self.show_error_notice(ctx);

        if self.loading_file {
            ctx.request_repaint_after(std::time::Duration::from_millis(50));
        }
    }
}
