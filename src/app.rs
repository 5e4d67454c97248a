use std::sync::Arc;
use std::time::{Duration, Instant};

use egui::{Align2, Color32, FontId, Mesh, Pos2, Rect, Sense, TextureId, pos2, vec2};
use egui::emath::Rot2;

use crate::color;
use crate::config::Settings;
use crate::input::InputHandler;
use crate::pen::PenMode;
use crate::server::{Server, ServerEvent};
use crate::snippet::SnippetLibrary;
use crate::surface::{Surface, SvgRenderer};
use crate::texture_manager::TextureManager;
use crate::workspace::Workspace;

const DARK_BACKGROUND: Color32 = Color32::from_rgb(0x1d, 0x1f, 0x21);
const LIGHT_BACKGROUND: Color32 = Color32::from_rgb(0xfa, 0xfa, 0xf7);
pub const INITIAL_SIZE: egui::Vec2 = vec2(1280.0, 720.0);
const FRAME_INTERVAL: Duration = Duration::from_millis(16);
/// Frames during which a size change is attributed to a zoom change.
const ZOOM_SETTLE_FRAMES: u8 = 3;

pub struct BoardApp {
    workspace: Workspace,
    textures: TextureManager,
    input: InputHandler,
    server: Option<Server>,
    typeset_input: String,
    applied_zoom: f32,
    zoom_settling: u8,
    sent_size_request: Option<(u32, u32)>,
}

impl BoardApp {
    /// Called once before the first frame.
    pub fn new(cc: &eframe::CreationContext<'_>, settings: Settings) -> Self {
        let renderer = Arc::new(SvgRenderer::with_system_fonts());

        let ctx = cc.egui_ctx.clone();
        let server = match Server::spawn(&settings.listen_address, move || ctx.request_repaint()) {
            Ok(server) => Some(server),
            Err(err) => {
                log::error!(
                    "Cannot listen on {}: {}; running without a controller",
                    settings.listen_address,
                    err
                );
                None
            }
        };
        let replies = server
            .as_ref()
            .map(|server| server.replies.clone())
            .unwrap_or_default();

        let snippets = match settings.snippet_path() {
            Some(path) => SnippetLibrary::load(path).unwrap_or_else(|err| {
                log::error!("Could not load snippets: {}", err);
                SnippetLibrary::in_memory()
            }),
            None => SnippetLibrary::in_memory(),
        };
        log::info!("{} snippet(s) available", snippets.len());

        // The real size arrives with the first frame.
        let screen = Rect::from_min_size(Pos2::ZERO, INITIAL_SIZE);
        let (width, height) = board_size(screen);
        let workspace =
            Workspace::new(settings, width, height, renderer, Box::new(replies)).with_snippets(snippets);

        Self {
            workspace,
            textures: TextureManager::new(),
            input: InputHandler::new(screen),
            server,
            typeset_input: String::new(),
            applied_zoom: 1.0,
            zoom_settling: 0,
            sent_size_request: None,
        }
    }

    fn drain_controller(&mut self) {
        let Some(server) = &self.server else {
            return;
        };
        while let Ok(event) = server.events.try_recv() {
            match event {
                ServerEvent::Line(line) => self.workspace.handle_message(&line),
                ServerEvent::Connected(peer) => log::debug!("Controller {} attached", peer),
                ServerEvent::Disconnected => log::debug!("Controller detached"),
            }
        }
    }

    fn apply_zoom(&mut self, ctx: &egui::Context) {
        let zoom = self.workspace.state().zoom;
        if zoom != self.applied_zoom {
            ctx.set_zoom_factor(zoom);
            self.applied_zoom = zoom;
            self.zoom_settling = ZOOM_SETTLE_FRAMES;
        } else {
            self.zoom_settling = self.zoom_settling.saturating_sub(1);
        }
    }

    fn apply_size_request(&mut self, ctx: &egui::Context) {
        let requested = self.workspace.state().requested_size;
        if requested != self.sent_size_request {
            if let Some((w, h)) = requested {
                log::info!("Requesting window size {}x{}", w, h);
                ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(vec2(w as f32, h as f32)));
            }
            self.sent_size_request = requested;
        }
    }

    fn sync_board_size(&mut self, rect: Rect) {
        let (width, height) = board_size(rect);
        let current = self.workspace.layers().viewport_size();
        if current == vec2(width as f32, height as f32) {
            return;
        }
        if self.zoom_settling > 0 {
            self.workspace.resize_preserving(width, height);
        } else {
            self.workspace.resize(width, height);
        }
    }

    fn paint_layers(&mut self, ctx: &egui::Context, painter: &egui::Painter, origin: Pos2) {
        for surface in self.workspace.layers().iter() {
            if !surface.is_visible() || surface.width() == 0 || surface.height() == 0 {
                continue;
            }
            match self.textures.surface_texture(surface, ctx) {
                Ok(texture) => paint_surface(painter, texture, surface, origin),
                Err(err) => log::trace!("Skipping {}: {}", surface.layer().name(), err),
            }
        }
    }

    fn paint_status(&self, painter: &egui::Painter, rect: Rect) {
        let state = self.workspace.state();
        let pen = self.workspace.pen();
        let mut label = format!("pen {}", pen.name());
        if pen.mode() != PenMode::None {
            label.push_str(&format!(" · {:?}", pen.mode()).to_lowercase());
        }
        if !state.prompt.is_empty() {
            label.push_str("  ");
            label.push_str(&state.prompt);
        }
        let color = if state.light_mode {
            Color32::from_gray(60)
        } else {
            Color32::from_gray(200)
        };
        painter.text(
            rect.left_bottom() + vec2(8.0, -8.0),
            Align2::LEFT_BOTTOM,
            label,
            FontId::monospace(13.0),
            color,
        );
    }

    fn typeset_window(&mut self, ctx: &egui::Context) {
        if !self.workspace.state().typeset_prompt {
            return;
        }
        let mut submitted = None;
        let mut dismissed = false;
        egui::Window::new("Typeset")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_TOP, vec2(0.0, 24.0))
            .show(ctx, |ui| {
                ui.label("source;size");
                let response = ui.text_edit_singleline(&mut self.typeset_input);
                if response.lost_focus() {
                    if ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                        submitted = Some(std::mem::take(&mut self.typeset_input));
                    }
                } else {
                    response.request_focus();
                }
                if ui.input(|i| i.key_pressed(egui::Key::Escape)) {
                    dismissed = true;
                }
            });
        if let Some(input) = submitted {
            self.workspace.submit_typeset(&input);
        } else if dismissed {
            self.typeset_input.clear();
            self.workspace.state_mut().typeset_prompt = false;
        }
    }
}

impl eframe::App for BoardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_controller();
        self.apply_zoom(ctx);
        self.apply_size_request(ctx);

        let state = self.workspace.state();
        let fill = state
            .background_style
            .as_deref()
            .and_then(color::parse_css)
            .and_then(|paint| paint.color())
            .unwrap_or(if state.light_mode {
                LIGHT_BACKGROUND
            } else {
                DARK_BACKGROUND
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(fill))
            .show(ctx, |ui| {
                let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click_and_drag());
                let rect = response.rect;
                self.sync_board_size(rect);

                self.input.set_canvas_rect(rect);
                self.input.set_capture_keys(!self.workspace.state().typeset_prompt);
                for event in self.input.process_input(ctx) {
                    self.workspace.handle_input(event);
                }
                self.workspace.poll(Instant::now());

                self.paint_layers(ctx, &painter, rect.min);
                self.paint_status(&painter, rect);
            });

        self.typeset_window(ctx);

        if self.workspace.is_animating() {
            ctx.request_repaint_after(FRAME_INTERVAL);
        }
    }
}

fn board_size(rect: Rect) -> (u32, u32) {
    (
        rect.width().round().max(1.0) as u32,
        rect.height().round().max(1.0) as u32,
    )
}

/// Draws a surface at its position, rotated about its center.
fn paint_surface(painter: &egui::Painter, texture: TextureId, surface: &Surface, origin: Pos2) {
    let rect = surface.rect().translate(origin.to_vec2());
    let uv = Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0));
    if surface.rotation() == 0.0 {
        painter.image(texture, rect, uv, Color32::WHITE);
        return;
    }
    let mut mesh = Mesh::with_texture(texture);
    mesh.add_rect_with_uv(rect, uv, Color32::WHITE);
    mesh.rotate(Rot2::from_angle(-surface.rotation()), rect.center());
    painter.add(mesh);
}
