//! Main application module

mod settings;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use eframe::egui;
use shared::{FeatureProperties, LngLat, MapLayerPatch, ViewState};

use opsmap_canvas_lib::draw::freehand::FreehandDraw;
use opsmap_canvas_lib::draw::DrawMode;
use opsmap_canvas_lib::host::{CanvasEvent, EnginePhase, MapEngineHost};
use opsmap_canvas_lib::input::PointerEvent;
use opsmap_canvas_lib::store::http::HttpStore;
use opsmap_canvas_lib::store::{command_channel, event_channel, EventReceiver};
use opsmap_canvas_lib::surface::{RenderSurface, SurfaceHandle};

use crate::map_view::MapView;
use settings::AppSettings;

/// Camera settle time before the view is persisted
const VIEW_SAVE_DELAY: Duration = Duration::from_secs(2);

/// Edit buffer for the open markup draft
struct DraftEditor {
    name: String,
    kind: String,
    color: String,
    notes: String,
}

impl DraftEditor {
    fn from_properties(p: &FeatureProperties) -> Self {
        Self {
            name: p.name.clone(),
            kind: p.kind.clone(),
            color: p.color.clone(),
            notes: p.notes.clone(),
        }
    }

    fn to_properties(&self) -> FeatureProperties {
        FeatureProperties {
            name: self.name.trim().to_string(),
            kind: self.kind.clone(),
            color: self.color.clone(),
            notes: self.notes.clone(),
            ..FeatureProperties::default()
        }
    }
}

struct Inspector {
    pos: egui::Pos2,
    title: String,
    subtitle: String,
}

/// Main application
pub struct CanvasApp {
    _runtime: tokio::runtime::Runtime,
    view: Arc<Mutex<MapView>>,
    host: MapEngineHost<FreehandDraw>,
    store_rx: EventReceiver,
    settings: AppSettings,
    /// True while the current drag gesture belongs to the engine
    drag_claimed: bool,
    draft_editor: Option<DraftEditor>,
    inspector: Option<Inspector>,
    status_error: Option<String>,
    surface_announced: bool,
    pending_view_save: Option<Instant>,
    last_saved_view: ViewState,
}

impl CanvasApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        server_override: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut settings = AppSettings::load();
        if let Some(url) = server_override {
            settings.server_url = url;
        }

        let view = Arc::new(Mutex::new(MapView::new(
            LngLat::new(settings.view.center_lng, settings.view.center_lat),
            settings.view.zoom,
        )));
        let surface: Arc<Mutex<dyn RenderSurface>> = view.clone();
        let handle = SurfaceHandle::new(surface);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let (cmd_tx, cmd_rx) = command_channel();
        let (event_tx, store_rx) = event_channel();
        let store = HttpStore::new(settings.server_url.clone(), event_tx);
        runtime.spawn(store.run(cmd_rx));

        let mut host = MapEngineHost::new(handle, cmd_tx);
        host.construct(Instant::now());

        let last_saved_view = settings.view.clone();
        Ok(Self {
            _runtime: runtime,
            view,
            host,
            store_rx,
            settings,
            drag_claimed: false,
            draft_editor: None,
            inspector: None,
            status_error: None,
            surface_announced: false,
            pending_view_save: None,
            last_saved_view,
        })
    }

    fn current_view(&self) -> ViewState {
        let view = match self.view.lock() {
            Ok(v) => v,
            Err(_) => return self.last_saved_view.clone(),
        };
        ViewState {
            center_lat: view.center.lat,
            center_lng: view.center.lng,
            zoom: view.zoom,
            bearing: 0.0,
            pitch: 0.0,
        }
    }

    fn drain_engine_events(&mut self) {
        for event in self.host.drain_events() {
            match event {
                CanvasEvent::Loaded => {
                    tracing::info!("map canvas ready");
                    self.status_error = None;
                }
                CanvasEvent::LoadFailed { error } => {
                    self.status_error = Some(error);
                }
                CanvasEvent::WriteFailed { message } => {
                    self.status_error = Some(message);
                }
                CanvasEvent::DraftOpened(draft) => {
                    self.inspector = None;
                    self.draft_editor = Some(DraftEditor::from_properties(&draft.properties));
                }
                CanvasEvent::InspectEntity { at, title, subtitle } => {
                    self.inspector = Some(Inspector {
                        pos: egui::pos2(at.x, at.y),
                        title,
                        subtitle,
                    });
                }
                CanvasEvent::ViewLoaded(view) => {
                    if let Ok(mut v) = self.view.lock() {
                        v.jump_to(LngLat::new(view.center_lng, view.center_lat), view.zoom);
                    }
                    self.last_saved_view = view;
                }
            }
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui, now: Instant) {
        ui.horizontal(|ui| {
            let mut editing = self.host.is_editing();
            if ui.toggle_value(&mut editing, "✏ Edit").changed() {
                self.host.set_editing(editing, now);
                if !editing {
                    self.draft_editor = None;
                }
            }
            if self.host.is_editing() {
                ui.separator();
                let mode = self.host.draw_mode();
                for (label, m) in [
                    ("Select", DrawMode::SimpleSelect),
                    ("Point", DrawMode::DrawPoint),
                    ("Line", DrawMode::DrawLine),
                    ("Area", DrawMode::DrawPolygon),
                ] {
                    if ui.selectable_label(mode == m, label).clicked() {
                        self.host.set_draw_mode(m);
                    }
                }
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(
                    egui::RichText::new(&self.settings.server_url)
                        .small()
                        .weak(),
                );
            });
        });
    }

    fn layer_sidebar(&mut self, ui: &mut egui::Ui) {
        ui.heading("Imagery");
        ui.separator();
        let layers: Vec<_> = self
            .host
            .layers()
            .iter()
            .map(|l| (l.id, l.name.clone(), l.enabled, l.opacity))
            .collect();
        for (id, name, enabled, opacity) in layers {
            let mut enabled = enabled;
            let mut opacity = opacity as f32;
            ui.horizontal(|ui| {
                if ui.checkbox(&mut enabled, name).changed() {
                    self.host.update_layer(
                        id,
                        MapLayerPatch { enabled: Some(enabled), ..Default::default() },
                    );
                }
            });
            let slider = ui.add(
                egui::Slider::new(&mut opacity, 0.0..=1.0)
                    .show_value(false)
                    .text("opacity"),
            );
            if slider.drag_stopped() || (slider.changed() && !slider.dragged()) {
                self.host.update_layer(
                    id,
                    MapLayerPatch { opacity: Some(opacity as f64), ..Default::default() },
                );
            }
            ui.add_space(4.0);
        }
        if self.host.layers().is_empty() {
            ui.label(egui::RichText::new("no imagery configured").weak());
        }
    }

    fn status_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if let Some(report) = self.host.camera_report() {
                ui.label(format!(
                    "{:.4}, {:.4}  z{:.1}",
                    report.pose.center.lat, report.pose.center.lng, report.pose.zoom
                ));
                if let Some(alt) = report.eye_altitude_ft {
                    ui.separator();
                    ui.label(format!("eye {:.0} ft", alt));
                }
                if let Some(h) = report.viewport_height_ft {
                    ui.separator();
                    ui.label(format!("view {:.0} ft", h));
                }
            }
            if self.host.has_unsaved_edits() {
                ui.separator();
                ui.label(egui::RichText::new("saving…").weak());
            }
            if let Some(error) = self.status_error.clone() {
                let mut dismissed = false;
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("✕").clicked() {
                        dismissed = true;
                    } else {
                        ui.colored_label(egui::Color32::LIGHT_RED, error);
                    }
                });
                if dismissed {
                    self.status_error = None;
                }
            }
        });
    }

    fn draft_window(&mut self, ctx: &egui::Context) {
        let Some(editor) = &mut self.draft_editor else {
            return;
        };
        let mut open = true;
        let mut confirmed = false;
        let mut cancelled = false;
        egui::Window::new("Markup")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                egui::Grid::new("draft_grid").num_columns(2).show(ui, |ui| {
                    ui.label("Name");
                    ui.text_edit_singleline(&mut editor.name);
                    ui.end_row();
                    ui.label("Kind");
                    egui::ComboBox::from_id_salt("draft_kind")
                        .selected_text(editor.kind.clone())
                        .show_ui(ui, |ui| {
                            for kind in ["hardware", "utility", "field", "note"] {
                                ui.selectable_value(&mut editor.kind, kind.to_string(), kind);
                            }
                        });
                    ui.end_row();
                    ui.label("Color");
                    ui.text_edit_singleline(&mut editor.color);
                    ui.end_row();
                    ui.label("Notes");
                    ui.text_edit_multiline(&mut editor.notes);
                    ui.end_row();
                });
                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        confirmed = true;
                    }
                    if ui.button("Cancel").clicked() {
                        cancelled = true;
                    }
                });
            });

        if confirmed {
            let properties = editor.to_properties();
            self.host.confirm_draft(properties);
            self.draft_editor = None;
        } else if cancelled || !open {
            self.host.cancel_draft();
            self.draft_editor = None;
        }
    }

    fn inspector_popup(&mut self, ctx: &egui::Context) {
        let Some(inspector) = &self.inspector else {
            return;
        };
        let mut open = true;
        egui::Window::new(inspector.title.clone())
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .default_pos(inspector.pos + egui::vec2(12.0, 12.0))
            .show(ctx, |ui| {
                ui.label(inspector.subtitle.clone());
            });
        if !open {
            self.inspector = None;
        }
    }

    fn map_panel(&mut self, ui: &mut egui::Ui, now: Instant) {
        let (events, input) = match self.view.lock() {
            Ok(mut view) => view.frame(ui),
            Err(_) => return,
        };

        if !self.surface_announced {
            self.surface_announced = true;
            self.host.notify_surface_loaded(now);
        }

        for event in &events {
            let consumed = self.host.pointer(*event, now);
            match event {
                PointerEvent::Down { .. } => self.drag_claimed = consumed,
                PointerEvent::Up { .. } | PointerEvent::Cancel => self.drag_claimed = false,
                _ => {}
            }
        }

        let mut camera_moved = false;
        if let Ok(mut view) = self.view.lock() {
            if !self.drag_claimed && view.pan_enabled() && input.drag_delta != egui::Vec2::ZERO {
                view.pan(input.drag_delta);
                camera_moved = true;
            }
            if input.scroll_delta != 0.0 && ui.rect_contains_pointer(ui.max_rect()) {
                view.zoom_by(input.scroll_delta, input.hover_pos);
                camera_moved = true;
            }
        }
        if camera_moved {
            self.inspector = None;
            self.pending_view_save = Some(now + VIEW_SAVE_DELAY);
        }
    }

    fn maybe_save_view(&mut self, now: Instant) {
        let Some(due) = self.pending_view_save else {
            return;
        };
        if now < due || self.host.phase() != EnginePhase::Ready {
            return;
        }
        self.pending_view_save = None;
        let view = self.current_view();
        if view != self.last_saved_view {
            self.host.save_view(view.clone());
            self.last_saved_view = view;
        }
    }
}

impl eframe::App for CanvasApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();

        while let Ok(event) = self.store_rx.try_recv() {
            self.host.handle_store_event(event, now);
        }
        self.host.tick(now);
        self.drain_engine_events();
        self.maybe_save_view(now);

        egui::TopBottomPanel::top("toolbar")
            .frame(
                egui::Frame::side_top_panel(&ctx.style())
                    .inner_margin(egui::Margin::symmetric(8, 4)),
            )
            .show(ctx, |ui| {
                self.toolbar(ui, now);
            });

        egui::SidePanel::left("layers")
            .default_width(220.0)
            .show(ctx, |ui| {
                self.layer_sidebar(ui);
            });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.status_bar(ui);
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                self.map_panel(ui, now);
            });

        self.draft_window(ctx);
        self.inspector_popup(ctx);

        // keep polling the store worker and the tile fetcher
        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.settings.view = self.current_view();
        self.settings.save();
        if self.host.phase() == EnginePhase::Ready {
            self.host.save_view(self.settings.view.clone());
        }
        self.host.teardown();
    }
}
