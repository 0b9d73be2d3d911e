//! Tessera - a zoomable treemap visualizer for source code repositories
//!
//! The whole repository is one continuously navigable mosaic: directories
//! nest as squares sized by weight, and file contents stream in as colored
//! token geometry once they are large enough on screen.

use eframe::egui;
use glam::Vec2;
use tessera::gpu::{TreemapCallback, TreemapRenderer};
use tessera::highlight::PlainHighlighter;
use tessera::overlay::SearchHit;
use tessera::provider::DiskProvider;
use tessera::session::{EngineConfig, Session};
use tessera::theme;

/// Main application state
struct TesseraApp {
    session: Option<Session>,
    search_text: String,
    status: String,
}

impl TesseraApp {
    fn new(cc: &eframe::CreationContext<'_>) -> Self {
        // the renderer lives in egui's callback resources, not a global
        if let Some(render_state) = cc.wgpu_render_state.as_ref() {
            let renderer = TreemapRenderer::new(&render_state.device, render_state.target_format);
            render_state
                .renderer
                .write()
                .callback_resources
                .insert(renderer);
        }

        let mut app = Self {
            session: None,
            search_text: String::new(),
            status: "open a repository to begin".to_string(),
        };
        if let Some(path) = std::env::args().nth(1) {
            app.open(path.into());
        }
        app
    }

    fn open(&mut self, path: std::path::PathBuf) {
        let provider = Box::new(DiskProvider::new(path.clone()));
        match Session::new(
            provider,
            Box::new(PlainHighlighter),
            EngineConfig::default(),
        ) {
            Ok(session) => {
                self.status = path.display().to_string();
                self.session = Some(session);
            }
            Err(err) => {
                log::error!("failed to open {}: {err}", path.display());
                self.status = format!("failed to open: {err}");
            }
        }
    }

    /// Path-substring search; hits highlight whole nodes
    fn run_search(&mut self) {
        let Some(session) = &mut self.session else {
            return;
        };
        let needle = self.search_text.to_lowercase();
        if needle.is_empty() {
            session.set_search_results(Vec::new());
            return;
        }
        let tree = &session.engine.tree;
        let hits: Vec<SearchHit> = tree
            .subtree_ids(tree.root())
            .into_iter()
            .filter(|&id| {
                !tree.entry(id).is_dir() && tree.entry(id).name.to_lowercase().contains(&needle)
            })
            .map(|id| SearchHit {
                path: tree.full_path(id),
                line: 0,
            })
            .collect();
        session.set_search_results(hits);
    }

    fn canvas(&mut self, ui: &mut egui::Ui) {
        let Some(session) = &mut self.session else {
            ui.centered_and_justified(|ui| {
                ui.label(egui::RichText::new(self.status.clone()).weak());
            });
            return;
        };

        let rect = ui.available_rect_before_wrap();
        let response = ui.allocate_rect(rect, egui::Sense::click_and_drag());
        let aspect = rect.width() / rect.height().max(1.0);
        session.set_viewport_aspect(aspect);

        let window = session.camera.window(aspect);
        let world_per_px = window.height() / rect.height().max(1.0);
        let to_world = move |pos: egui::Pos2| {
            Vec2::new(
                window.min.x + (pos.x - rect.min.x) * world_per_px,
                window.max.y - (pos.y - rect.min.y) * world_per_px,
            )
        };

        if response.dragged() {
            let d = response.drag_delta();
            session
                .camera
                .pan(Vec2::new(-d.x * world_per_px, d.y * world_per_px));
        }
        let scroll = ui.input(|i| i.raw_scroll_delta.y);
        if scroll.abs() > 0.0 {
            if let Some(hover) = response.hover_pos() {
                session.camera.zoom_at(to_world(hover), 0.998f32.powf(scroll));
            }
        }
        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                session.click(to_world(pos));
            }
        }

        let dt = ui.input(|i| i.stable_dt).min(0.1);
        if session.tick(dt) {
            ui.ctx().request_repaint();
        }

        let uploads = session.frame_uploads();
        ui.painter().add(egui_wgpu::Callback::new_paint_callback(
            rect,
            TreemapCallback { uploads },
        ));
    }
}

impl eframe::App for TesseraApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("tessera_topbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Open…").clicked() {
                    if let Some(path) = rfd::FileDialog::new().pick_folder() {
                        self.open(path);
                    }
                }

                let breadcrumb = self
                    .session
                    .as_ref()
                    .map(|s| s.navigation_target().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| self.status.clone());
                ui.label(
                    egui::RichText::new(breadcrumb).color(theme::colors().breadcrumb_text),
                );

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let search = ui.text_edit_singleline(&mut self.search_text);
                    if search.changed() {
                        self.run_search();
                    }
                    ui.label("find:");
                });
            });
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(theme::colors().main_background))
            .show(ctx, |ui| self.canvas(ui));
    }
}

/// Application entry point.
fn main() -> Result<(), eframe::Error> {
    env_logger::init();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Tessera")
            .with_inner_size([1280.0, 800.0]),
        renderer: eframe::Renderer::Wgpu,
        ..Default::default()
    };

    eframe::run_native(
        "Tessera",
        options,
        Box::new(|cc| Ok(Box::new(TesseraApp::new(cc)))),
    )
}
