//! The pen: one state machine per named pen, routing pointer input and
//! discrete commands to the brush, line, selection, shape and typeset tools.
//!
//! A pen owns its brush, history and local registers. Surfaces, the shared
//! clipboard and the application flags are borrowed per call through
//! [`PenContext`]. Only the pen takes history snapshots, exactly one after
//! each completed edit.

pub mod action;

pub use action::PenAction;

use egui::{Pos2, pos2, vec2};

use crate::brush::{Brush, BrushPoint};
use crate::clipboard::{Clipboard, Registers};
use crate::config::Settings;
use crate::history::History;
use crate::input::PointerSample;
use crate::line::{Line, LineStyle, LineStyles};
use crate::selection::{Selection, SelectionBounds};
use crate::shape::{Shape, ShapeKind, ShapeStyle};
use crate::snippet::{MacroPoint, Snippet};
use crate::state::AppState;
use crate::surface::{Fragment, Layers, Surface};
use crate::typeset::{PendingTypeset, TypesetBlock, TypesetRequest, Typesetter};

/// Where the brush swatch sits on screen.
const SWATCH_POSITION: Pos2 = pos2(10.0, 10.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenMode {
    None,
    Brush,
    Line,
    ContinuousLine,
    Selection,
    ContinuousSelection,
    Capture,
    Shape,
    Typeset,
    Rotation,
}

/// The one tool a pen can hold besides its brush.
#[derive(Debug, Default)]
enum ActiveTool {
    #[default]
    None,
    Selection(Selection),
    Shape(Shape),
    Line(Line),
}

/// A typeset render on its way to the pointer.
#[derive(Debug)]
struct TypesetJob {
    pending: PendingTypeset,
    block: Option<TypesetBlock>,
}

/// Everything a pen acts on that it does not own.
pub struct PenContext<'a> {
    pub layers: &'a mut Layers,
    pub clipboard: &'a mut Clipboard,
    pub state: &'a mut AppState,
    pub typesetter: &'a dyn Typesetter,
}

#[derive(Debug)]
pub struct Pen {
    name: char,
    enabled: bool,
    mode: PenMode,
    /// Mode to go back to when a rotation ends.
    resume: PenMode,
    brush: Brush,
    tool: ActiveTool,
    history: History,
    registers: Registers,
    styles: LineStyles,
    current_point: Pos2,
    font_size: f32,
    typeset: Option<TypesetJob>,
}

impl Pen {
    /// A disabled pen whose history starts from the content of `surface`.
    pub fn new(name: char, settings: &Settings, surface: &Surface) -> Self {
        Self {
            name,
            enabled: false,
            mode: PenMode::None,
            resume: PenMode::None,
            brush: Brush::new(&settings.brush),
            tool: ActiveTool::None,
            history: History::new(settings.history_capacity, surface),
            registers: Registers::default(),
            styles: LineStyles::default(),
            current_point: Pos2::ZERO,
            font_size: settings.default_font_size,
            typeset: None,
        }
    }

    pub fn name(&self) -> char {
        self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn mode(&self) -> PenMode {
        self.mode
    }

    pub fn is_idle(&self) -> bool {
        self.mode == PenMode::None
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn styles(&self) -> &LineStyles {
        &self.styles
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    pub fn current_point(&self) -> Pos2 {
        self.current_point
    }

    pub fn set_current_point(&mut self, point: Pos2) {
        self.current_point = point;
    }

    pub fn selection(&self) -> Option<&Selection> {
        match &self.tool {
            ActiveTool::Selection(selection) => Some(selection),
            _ => None,
        }
    }

    pub fn shape(&self) -> Option<&Shape> {
        match &self.tool {
            ActiveTool::Shape(shape) => Some(shape),
            _ => None,
        }
    }

    pub fn has_completed_selection(&self) -> bool {
        self.selection().is_some_and(Selection::is_completed)
    }

    fn accepts_pointer(&self, state: &AppState, sample: &PointerSample) -> bool {
        self.enabled && sample.primary && !state.awaiting_event
    }

    fn snapshot(&mut self, pen: &Surface) {
        self.history.take_snapshot(pen);
    }

    pub fn pointer_down(&mut self, ctx: &mut PenContext<'_>, sample: PointerSample) {
        if !self.accepts_pointer(ctx.state, &sample) {
            return;
        }
        let pos = sample.pos;
        let Layers {
            pen,
            selection,
            shape: shape_overlay,
            ..
        } = &mut *ctx.layers;

        match self.mode {
            PenMode::Capture | PenMode::Selection | PenMode::ContinuousSelection => {
                if let ActiveTool::Selection(sel) = &mut self.tool {
                    if !sel.is_completed() {
                        sel.start(pos, selection);
                    }
                }
            }
            PenMode::Line | PenMode::ContinuousLine => {
                if let ActiveTool::Line(line) = &mut self.tool {
                    line.start(pos);
                }
            }
            PenMode::Shape => {
                let ActiveTool::Shape(shape) = &mut self.tool else {
                    self.mode = PenMode::None;
                    return;
                };
                if shape.switch_phase(shape_overlay, pen) == 0 {
                    self.tool = ActiveTool::None;
                    self.mode = PenMode::None;
                    self.snapshot(pen);
                }
            }
            PenMode::Rotation => {
                self.end_rotation(ctx.state);
                self.pointer_down(ctx, sample);
            }
            PenMode::Typeset => self.commit_typeset(ctx),
            PenMode::None => {
                self.mode = PenMode::Brush;
                self.brush.add_sample(
                    BrushPoint {
                        pos,
                        pressure: sample.pressure,
                    },
                    pen,
                    &mut self.history,
                    ctx.state.light_mode,
                );
            }
            PenMode::Brush => {}
        }
    }

    pub fn pointer_move(&mut self, ctx: &mut PenContext<'_>, sample: PointerSample) {
        self.current_point = sample.pos;
        if !self.enabled || ctx.state.awaiting_event {
            return;
        }
        let pos = sample.pos;
        let light_mode = ctx.state.light_mode;
        let Layers {
            pen,
            selection,
            shape: shape_overlay,
            typeset,
            ..
        } = &mut *ctx.layers;

        match (self.mode, &mut self.tool) {
            (
                PenMode::Capture | PenMode::Selection | PenMode::ContinuousSelection,
                ActiveTool::Selection(sel),
            ) => {
                if sel.is_completed() {
                    sel.move_to(pos, selection);
                } else if sel.is_started() {
                    sel.change(pos, selection);
                }
            }
            (PenMode::Line | PenMode::ContinuousLine, ActiveTool::Line(line)) => {
                line.update(pos, pen, &mut self.history, &self.styles, &self.brush, light_mode);
            }
            (PenMode::Shape, ActiveTool::Shape(shape)) => shape.update(pos, shape_overlay),
            (PenMode::Rotation, ActiveTool::Shape(shape)) => {
                shape.rotate_towards(pos);
                shape.render(shape_overlay);
            }
            (PenMode::Rotation, ActiveTool::Selection(sel)) => sel.rotate_towards(pos, selection),
            (PenMode::Typeset, _) => {
                if self.typeset.as_ref().is_some_and(|job| job.block.is_some()) {
                    let at = centered(pos, typeset);
                    typeset.move_to(at);
                }
            }
            (PenMode::Brush, _) if sample.primary => {
                self.brush.add_sample(
                    BrushPoint {
                        pos,
                        pressure: sample.pressure,
                    },
                    pen,
                    &mut self.history,
                    light_mode,
                );
            }
            _ => {}
        }
    }

    /// Ends the gesture under way. Returns the dragged bounds when a capture
    /// region was just completed.
    pub fn pointer_up(
        &mut self,
        ctx: &mut PenContext<'_>,
        sample: PointerSample,
    ) -> Option<SelectionBounds> {
        if !self.accepts_pointer(ctx.state, &sample) {
            return None;
        }
        let pos = sample.pos;
        let light_mode = ctx.state.light_mode;
        let Layers { pen, selection, .. } = &mut *ctx.layers;

        match self.mode {
            PenMode::Capture => {
                self.mode = PenMode::None;
                let ActiveTool::Selection(mut sel) = std::mem::take(&mut self.tool) else {
                    return None;
                };
                sel.end(pos, pen, selection);
                sel.cancel(selection);
                ctx.state.clear_prompt();
                return sel.bounds();
            }
            PenMode::Selection | PenMode::ContinuousSelection => {
                let ActiveTool::Selection(sel) = &mut self.tool else {
                    return None;
                };
                if sel.is_completed() {
                    sel.apply(selection, pen);
                    self.tool = if self.mode == PenMode::ContinuousSelection {
                        ActiveTool::Selection(Selection::new(false))
                    } else {
                        self.mode = PenMode::None;
                        ActiveTool::None
                    };
                    self.snapshot(pen);
                } else {
                    sel.end(pos, pen, selection);
                }
            }
            PenMode::Line | PenMode::ContinuousLine => {
                let drawn = match &self.tool {
                    ActiveTool::Line(line) if line.is_started() => {
                        line.update(pos, pen, &mut self.history, &self.styles, &self.brush, light_mode);
                        true
                    }
                    _ => false,
                };
                if drawn {
                    self.snapshot(pen);
                }
                if self.mode == PenMode::Line {
                    self.mode = PenMode::None;
                    self.tool = ActiveTool::None;
                } else {
                    self.tool = ActiveTool::Line(Line::new());
                }
            }
            PenMode::Brush => {
                self.mode = PenMode::None;
                self.brush.finish(pen, &mut self.history, light_mode);
                self.snapshot(pen);
            }
            _ => {}
        }
        None
    }

    /// Abandons the current gesture or tool and returns to idle.
    pub fn cancel(&mut self, ctx: &mut PenContext<'_>) {
        let light_mode = ctx.state.light_mode;
        match self.mode {
            PenMode::Selection | PenMode::ContinuousSelection => {
                let lifted = match &mut self.tool {
                    ActiveTool::Selection(sel) => {
                        let lifted = sel.has_lifted();
                        sel.cancel(&mut ctx.layers.selection);
                        lifted
                    }
                    _ => false,
                };
                self.tool = ActiveTool::None;
                if lifted {
                    self.roll_back(&mut ctx.layers.pen);
                }
            }
            PenMode::Capture => {
                if let ActiveTool::Selection(sel) = &mut self.tool {
                    sel.cancel(&mut ctx.layers.selection);
                }
                self.tool = ActiveTool::None;
                ctx.state.clear_prompt();
            }
            PenMode::Line | PenMode::ContinuousLine => {
                let started = matches!(&self.tool, ActiveTool::Line(line) if line.is_started());
                self.tool = ActiveTool::None;
                if started {
                    self.roll_back(&mut ctx.layers.pen);
                }
            }
            PenMode::Brush => {
                self.brush
                    .finish(&mut ctx.layers.pen, &mut self.history, light_mode);
                self.snapshot(&ctx.layers.pen);
            }
            PenMode::Shape => {
                if let ActiveTool::Shape(shape) = &mut self.tool {
                    shape.cancel(&mut ctx.layers.shape);
                }
                self.tool = ActiveTool::None;
            }
            PenMode::Rotation => {
                self.end_rotation(ctx.state);
                self.cancel(ctx);
            }
            PenMode::Typeset => {
                self.typeset = None;
                ctx.layers.typeset.clear();
                ctx.layers.typeset.hide();
            }
            PenMode::None => {}
        }
        self.mode = PenMode::None;
    }

    /// Snapshot then step back: the abandoned edit stays reachable as redo.
    fn roll_back(&mut self, pen: &mut Surface) {
        self.history.take_snapshot(pen);
        self.history.travel(-1, pen);
    }

    fn cancel_if_busy(&mut self, ctx: &mut PenContext<'_>) {
        if self.mode != PenMode::None {
            self.cancel(ctx);
        }
    }

    /// Clears the pen layer, recording the clear when enabled.
    pub fn clear(&mut self, ctx: &mut PenContext<'_>) {
        ctx.layers.pen.clear();
        if self.enabled {
            self.snapshot(&ctx.layers.pen);
        }
    }

    /// Switches the pen on or off, clearing its layer first. Whatever tool
    /// is active is cancelled before the pen goes off.
    pub fn toggle(&mut self, ctx: &mut PenContext<'_>) {
        if self.enabled {
            self.cancel_if_busy(ctx);
        }
        self.clear(ctx);
        self.enabled = !self.enabled;
        let layers = &mut *ctx.layers;
        if self.enabled {
            layers.pen.show();
            self.draw_swatch(layers, ctx.state.light_mode);
        } else {
            layers.pen.hide();
            layers.preview.hide();
        }
        ctx.state.zoom = 1.0;
        log::info!(
            "Pen `{}` {}",
            self.name,
            if self.enabled { "enabled" } else { "disabled" }
        );
    }

    /// Redraws the size/color swatch in the corner.
    pub fn draw_swatch(&self, layers: &mut Layers, light_mode: bool) {
        self.brush.draw_swatch(&mut layers.preview, light_mode);
        layers.preview.move_to(SWATCH_POSITION);
        if !self.enabled {
            layers.preview.hide();
        }
    }

    /// Runs a keymap action. Disabled pens ignore everything.
    pub fn apply(&mut self, action: PenAction, ctx: &mut PenContext<'_>) {
        if !self.enabled {
            return;
        }
        log::debug!("Pen `{}`: {}", self.name, action);
        let light_mode = ctx.state.light_mode;
        match action {
            PenAction::ToggleEraser => {
                self.brush.toggle_eraser();
                self.draw_swatch(ctx.layers, light_mode);
            }
            PenAction::Clear => self.clear(ctx),
            PenAction::NextColor => {
                self.brush.next_color();
                self.draw_swatch(ctx.layers, light_mode);
            }
            PenAction::PreviousColor => {
                self.brush.previous_color();
                self.draw_swatch(ctx.layers, light_mode);
            }
            PenAction::IncreaseBrushSize => {
                self.brush.increase_size();
                self.draw_swatch(ctx.layers, light_mode);
            }
            PenAction::DecreaseBrushSize => {
                self.brush.decrease_size();
                self.draw_swatch(ctx.layers, light_mode);
            }
            PenAction::IncreaseSensitivity => self.brush.increase_sensitivity(),
            PenAction::DecreaseSensitivity => self.brush.decrease_sensitivity(),
            PenAction::Undo => {
                self.history.travel(-1, &mut ctx.layers.pen);
            }
            PenAction::Redo => {
                self.history.travel(1, &mut ctx.layers.pen);
            }
            PenAction::Select => {
                self.cancel_if_busy(ctx);
                self.tool = ActiveTool::Selection(Selection::new(false));
                self.mode = PenMode::Selection;
            }
            PenAction::ContinuousSelection => match self.mode {
                PenMode::ContinuousSelection => self.cancel(ctx),
                PenMode::None => {
                    self.tool = ActiveTool::Selection(Selection::new(false));
                    self.mode = PenMode::ContinuousSelection;
                }
                _ => {}
            },
            PenAction::Yank => match self.mode {
                PenMode::None => {
                    self.tool = ActiveTool::Selection(Selection::new(true));
                    self.mode = PenMode::Selection;
                }
                PenMode::Selection => self.store_selection(ctx),
                _ => {}
            },
            PenAction::YankGlobal => {
                if self.mode == PenMode::Selection {
                    self.store_selection(ctx);
                }
            }
            PenAction::Delete => self.delete(ctx, 'd'),
            PenAction::DeleteGlobal => self.delete(ctx, 'D'),
            PenAction::DrawLine => {
                if self.mode == PenMode::None {
                    self.tool = ActiveTool::Line(Line::new());
                    self.mode = PenMode::Line;
                }
            }
            PenAction::ContinuousDrawLine => match self.mode {
                PenMode::ContinuousLine => self.cancel(ctx),
                PenMode::None => {
                    self.tool = ActiveTool::Line(Line::new());
                    self.mode = PenMode::ContinuousLine;
                }
                _ => {}
            },
            PenAction::Rotate => self.rotate(ctx.state),
            PenAction::Typeset => {
                if self.mode == PenMode::None {
                    ctx.state.typeset_prompt = true;
                }
            }
        }
    }

    /// Pushes a completed selection onto the clipboard ring and drops it.
    fn store_selection(&mut self, ctx: &mut PenContext<'_>) {
        let Some(buffer) = self
            .selection()
            .and_then(|sel| sel.buffer(&ctx.layers.selection))
        else {
            return;
        };
        ctx.clipboard.store(buffer);
        self.cancel(ctx);
    }

    /// Copies a completed selection into register `key` and drops it.
    pub fn yank_to(&mut self, ctx: &mut PenContext<'_>, key: char) {
        let Some(buffer) = self
            .selection()
            .and_then(|sel| sel.buffer(&ctx.layers.selection))
        else {
            return;
        };
        ctx.clipboard.register(key, buffer, &mut self.registers);
        self.cancel(ctx);
    }

    /// Removes a completed selection, keeping its pixels in register `key`.
    pub fn delete(&mut self, ctx: &mut PenContext<'_>, key: char) {
        if !self.has_completed_selection() {
            return;
        }
        if self.mode == PenMode::Rotation {
            self.end_rotation(ctx.state);
        }
        if let ActiveTool::Selection(sel) = &mut self.tool {
            sel.delete(
                Some(key),
                ctx.clipboard,
                &mut self.registers,
                &mut ctx.layers.selection,
            );
        }
        self.snapshot(&ctx.layers.pen);
        if self.mode == PenMode::ContinuousSelection {
            self.tool = ActiveTool::Selection(Selection::new(false));
        } else {
            self.mode = PenMode::Selection;
            self.cancel(ctx);
        }
    }

    /// Lifts buffer `key` under the pointer as a completed selection.
    pub fn paste(&mut self, ctx: &mut PenContext<'_>, key: char) {
        if !self.enabled {
            return;
        }
        let Some(buffer) = ctx.clipboard.paste(key, &self.registers) else {
            log::debug!("Nothing to paste from `{}`", key);
            return;
        };
        self.cancel_if_busy(ctx);
        let mut sel = Selection::new(false);
        sel.capture(&buffer, self.current_point, &mut ctx.layers.selection);
        self.tool = ActiveTool::Selection(sel);
        self.mode = PenMode::Selection;
        self.snapshot(&ctx.layers.pen);
    }

    /// Starts placing a shape named by `key` (`r`, `c`, `a`, `t`) under the
    /// pointer.
    pub fn create_shape(&mut self, ctx: &mut PenContext<'_>, key: char) {
        if !self.enabled {
            return;
        }
        let Some(kind) = ShapeKind::from_key(key) else {
            return;
        };
        self.cancel_if_busy(ctx);
        let style = ShapeStyle {
            color: self.brush.color(ctx.state.light_mode),
            stroke_width: self.brush.brush_size() * 4.0,
            fill: self.styles.has(LineStyle::ShapeFill),
        };
        let mut shape = Shape::new(kind, style);
        shape.place(self.current_point, &mut ctx.layers.shape);
        self.tool = ActiveTool::Shape(shape);
        self.mode = PenMode::Shape;
    }

    pub fn toggle_style(&mut self, key: char) {
        if let Some(style) = LineStyle::from_key(key) {
            self.styles.toggle(style);
        }
    }

    /// Enters rotation for the active selection or shape, or leaves it.
    pub fn rotate(&mut self, state: &mut AppState) {
        if self.mode == PenMode::Rotation {
            self.end_rotation(state);
            return;
        }
        match (&mut self.tool, self.mode) {
            (ActiveTool::Shape(shape), PenMode::Shape) => shape.begin_rotation(),
            (
                ActiveTool::Selection(sel),
                PenMode::Selection | PenMode::ContinuousSelection,
            ) if sel.is_completed() => sel.begin_rotation(),
            _ => return,
        }
        self.resume = self.mode;
        self.mode = PenMode::Rotation;
        state.set_prompt("ROTATING");
    }

    fn end_rotation(&mut self, state: &mut AppState) {
        state.clear_prompt();
        self.mode = match self.tool {
            ActiveTool::None | ActiveTool::Line(_) => PenMode::None,
            _ => self.resume,
        };
    }

    /// Asks the typesetter for `source` and follows the pointer with the
    /// result once it arrives.
    pub fn begin_typeset(&mut self, ctx: &mut PenContext<'_>, source: String, font_size: f32) {
        if !self.enabled {
            return;
        }
        self.cancel_if_busy(ctx);
        self.font_size = font_size;
        let pending = ctx.typesetter.render(TypesetRequest {
            source,
            font_size,
            color: self.brush.color(ctx.state.light_mode),
        });
        self.typeset = Some(TypesetJob {
            pending,
            block: None,
        });
        self.mode = PenMode::Typeset;
        self.poll_typeset(ctx);
    }

    /// Picks up a finished typeset render, if any. Called once per frame.
    pub fn poll_typeset(&mut self, ctx: &mut PenContext<'_>) {
        if self.mode != PenMode::Typeset {
            return;
        }
        let Some(job) = self.typeset.as_mut().filter(|job| job.block.is_none()) else {
            return;
        };
        let Some(result) = job.pending.poll() else {
            return;
        };
        let overlay = &mut ctx.layers.typeset;
        let rendered = result.map_err(|err| err.to_string()).and_then(|block| {
            let renderer = std::sync::Arc::clone(overlay.renderer());
            renderer
                .rasterize(&block.svg, block.width.ceil() as u32, block.height.ceil() as u32)
                .map(|pixels| (block, pixels))
                .map_err(|err| err.to_string())
        });
        match rendered {
            Ok((block, pixels)) => {
                overlay.load_pixmap(&pixels);
                let at = centered(self.current_point, overlay);
                overlay.move_to(at);
                overlay.show();
                job.block = Some(block);
            }
            Err(err) => {
                log::warn!("Typesetting failed: {}", err);
                self.typeset = None;
                self.mode = PenMode::None;
            }
        }
    }

    /// Drops the typeset block where it floats: as a vector fragment when
    /// it renders, as pixels otherwise.
    fn commit_typeset(&mut self, ctx: &mut PenContext<'_>) {
        let Some(block) = self.typeset.as_mut().and_then(|job| job.block.take()) else {
            return;
        };
        let Layers { pen, typeset, .. } = &mut *ctx.layers;
        let at = typeset.position();
        let committed = match Fragment::place(&block.svg, at) {
            Some(fragment) => match pen.commit_fragment(fragment) {
                Ok(()) => true,
                Err(err) => {
                    log::warn!("Typeset fragment rasterized instead: {}", err);
                    false
                }
            },
            None => false,
        };
        if !committed {
            if let Some(pixels) = typeset.canvas().pixmap().cloned() {
                pen.draw_pixmap(&pixels, at);
            }
        }
        typeset.clear();
        typeset.hide();
        self.typeset = None;
        self.mode = PenMode::None;
        self.snapshot(pen);
    }

    /// Starts a macro recording. History is frozen until it stops.
    pub fn start_recording(&mut self, ctx: &mut PenContext<'_>) {
        self.brush.start_recording();
        self.history.freeze();
        self.draw_swatch(ctx.layers, ctx.state.light_mode);
    }

    /// Stops recording and puts the surface back as it was before.
    pub fn stop_recording(&mut self, ctx: &mut PenContext<'_>) -> Vec<MacroPoint> {
        let points = self.brush.stop_recording();
        self.history.thaw(&mut ctx.layers.pen);
        self.draw_swatch(ctx.layers, ctx.state.light_mode);
        points
    }

    pub fn is_recording(&self) -> bool {
        self.brush.is_recording()
    }

    /// Draws `snippet` with its corner at the pointer.
    pub fn play_snippet(&mut self, ctx: &mut PenContext<'_>, snippet: &Snippet) {
        if !self.enabled {
            return;
        }
        snippet.draw(
            &mut ctx.layers.pen,
            &self.brush,
            self.current_point,
            ctx.state.light_mode,
        );
        self.snapshot(&ctx.layers.pen);
    }

    /// Arms the pen to drag out a capture region.
    pub fn begin_capture(&mut self, ctx: &mut PenContext<'_>) {
        self.cancel_if_busy(ctx);
        self.tool = ActiveTool::Selection(Selection::new(true));
        self.mode = PenMode::Capture;
        ctx.state.set_prompt("CAPTURE");
    }
}

fn centered(pointer: Pos2, overlay: &Surface) -> Pos2 {
    let half = vec2(overlay.width() as f32, overlay.height() as f32) / 2.0;
    let corner = pointer - half;
    pos2(corner.x.round(), corner.y.round())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use egui::{Color32, Rect};

    use super::*;
    use crate::surface::{LayerId, SvgRenderer, pixel_at};
    use crate::typeset::TextTypesetter;

    struct Rig {
        layers: Layers,
        clipboard: Clipboard,
        state: AppState,
        typesetter: TextTypesetter,
        pen: Pen,
    }

    impl Rig {
        fn new() -> Self {
            let layers = Layers::new(200, 200, Arc::new(SvgRenderer::default()));
            let mut pen = Pen::new('m', &Settings::default(), &layers.pen);
            pen.set_enabled(true);
            Self {
                layers,
                clipboard: Clipboard::new(10),
                state: AppState::default(),
                typesetter: TextTypesetter,
                pen,
            }
        }

        fn with<R>(&mut self, f: impl FnOnce(&mut Pen, &mut PenContext<'_>) -> R) -> R {
            let mut ctx = PenContext {
                layers: &mut self.layers,
                clipboard: &mut self.clipboard,
                state: &mut self.state,
                typesetter: &self.typesetter,
            };
            f(&mut self.pen, &mut ctx)
        }

        fn down(&mut self, x: f32, y: f32) {
            self.with(|pen, ctx| pen.pointer_down(ctx, PointerSample::at(pos2(x, y))));
        }

        fn moved(&mut self, x: f32, y: f32) {
            self.with(|pen, ctx| pen.pointer_move(ctx, PointerSample::at(pos2(x, y))));
        }

        fn up(&mut self, x: f32, y: f32) -> Option<SelectionBounds> {
            self.with(|pen, ctx| pen.pointer_up(ctx, PointerSample::at(pos2(x, y))))
        }

        fn act(&mut self, action: PenAction) {
            self.with(|pen, ctx| pen.apply(action, ctx));
        }

        fn fill(&mut self, rect: Rect, color: Color32) {
            self.layers.pen.canvas_mut().fill_rect(rect, color);
            self.pen.history_mut().take_snapshot(&self.layers.pen);
        }
    }

    fn square(x: f32, y: f32, side: f32) -> Rect {
        Rect::from_min_size(pos2(x, y), vec2(side, side))
    }

    #[test]
    fn tap_paints_a_dot_and_snapshots() {
        let mut rig = Rig::new();
        rig.down(50.0, 50.0);
        assert_eq!(rig.pen.mode(), PenMode::Brush);
        rig.up(50.0, 50.0);
        assert_eq!(rig.pen.mode(), PenMode::None);
        assert_eq!(rig.pen.history().len(), 2);
        assert_ne!(pixel_at(&rig.layers.pen, 50, 50).a(), 0);
    }

    #[test]
    fn disabled_pen_ignores_pointer() {
        let mut rig = Rig::new();
        rig.pen.set_enabled(false);
        rig.down(50.0, 50.0);
        rig.up(50.0, 50.0);
        assert_eq!(rig.pen.history().len(), 1);
        assert!(rig.layers.pen.is_blank());
    }

    #[test]
    fn awaiting_event_suspends_drawing_but_tracks_pointer() {
        let mut rig = Rig::new();
        rig.state.awaiting_event = true;
        rig.down(50.0, 50.0);
        rig.moved(60.0, 70.0);
        assert_eq!(rig.pen.mode(), PenMode::None);
        assert_eq!(rig.pen.current_point(), pos2(60.0, 70.0));
    }

    #[test]
    fn line_commits_once_on_release() {
        let mut rig = Rig::new();
        rig.act(PenAction::DrawLine);
        rig.down(10.0, 100.0);
        for x in [40.0, 80.0, 120.0] {
            rig.moved(x, 100.0);
        }
        rig.up(150.0, 100.0);
        assert_eq!(rig.pen.mode(), PenMode::None);
        assert_eq!(rig.pen.history().len(), 2);
        assert_eq!(rig.layers.pen.record().op_count(), 1);
        assert_ne!(pixel_at(&rig.layers.pen, 140, 100).a(), 0);
    }

    #[test]
    fn continuous_line_keeps_going_until_toggled() {
        let mut rig = Rig::new();
        rig.act(PenAction::ContinuousDrawLine);
        rig.down(10.0, 10.0);
        rig.up(50.0, 10.0);
        rig.down(10.0, 30.0);
        rig.up(50.0, 30.0);
        assert_eq!(rig.pen.mode(), PenMode::ContinuousLine);
        assert_eq!(rig.pen.history().len(), 3);
        rig.act(PenAction::ContinuousDrawLine);
        assert_eq!(rig.pen.mode(), PenMode::None);
    }

    #[test]
    fn selection_moves_pixels_on_apply() {
        let mut rig = Rig::new();
        rig.fill(square(10.0, 10.0, 20.0), Color32::RED);
        rig.act(PenAction::Select);
        rig.down(10.0, 10.0);
        rig.moved(20.0, 20.0);
        rig.up(30.0, 30.0);
        assert!(rig.pen.has_completed_selection());

        rig.moved(130.0, 130.0);
        rig.down(130.0, 130.0);
        rig.up(130.0, 130.0);
        assert_eq!(rig.pen.mode(), PenMode::None);
        assert_eq!(pixel_at(&rig.layers.pen, 115, 115), Color32::RED);
        assert_eq!(pixel_at(&rig.layers.pen, 15, 15).a(), 0);
    }

    #[test]
    fn cancelled_selection_restores_source() {
        let mut rig = Rig::new();
        rig.fill(square(10.0, 10.0, 20.0), Color32::RED);
        rig.act(PenAction::Select);
        rig.down(5.0, 5.0);
        rig.up(40.0, 40.0);
        assert_eq!(pixel_at(&rig.layers.pen, 15, 15).a(), 0);

        rig.with(|pen, ctx| pen.cancel(ctx));
        assert_eq!(rig.pen.mode(), PenMode::None);
        assert_eq!(pixel_at(&rig.layers.pen, 15, 15), Color32::RED);
        assert!(!rig.layers.selection.is_visible());
        assert!(rig.pen.history().can_redo());
    }

    #[test]
    fn delete_registers_and_keeps_the_hole() {
        let mut rig = Rig::new();
        rig.fill(square(10.0, 10.0, 20.0), Color32::RED);
        rig.act(PenAction::Select);
        rig.down(10.0, 10.0);
        rig.up(30.0, 30.0);
        rig.act(PenAction::Delete);

        assert_eq!(rig.pen.mode(), PenMode::None);
        assert_eq!(pixel_at(&rig.layers.pen, 15, 15).a(), 0);
        assert!(rig.pen.registers().get('d').is_some());
        assert_eq!(rig.clipboard.len(), 1);

        rig.act(PenAction::Undo);
        assert_eq!(pixel_at(&rig.layers.pen, 15, 15), Color32::RED);
    }

    #[test]
    fn yank_then_paste_lands_at_pointer() {
        let mut rig = Rig::new();
        rig.fill(square(10.0, 10.0, 20.0), Color32::RED);
        rig.act(PenAction::Yank);
        rig.down(10.0, 10.0);
        rig.up(30.0, 30.0);
        rig.act(PenAction::Yank);
        assert_eq!(rig.pen.mode(), PenMode::None);
        assert_eq!(rig.clipboard.len(), 1);
        assert_eq!(pixel_at(&rig.layers.pen, 15, 15), Color32::RED, "copy keeps source");

        rig.moved(100.0, 100.0);
        rig.with(|pen, ctx| pen.paste(ctx, 'p'));
        assert_eq!(rig.pen.mode(), PenMode::Selection);
        assert_eq!(rig.layers.selection.position(), pos2(100.0, 100.0));
        rig.down(100.0, 100.0);
        rig.up(100.0, 100.0);
        assert_eq!(pixel_at(&rig.layers.pen, 105, 105), Color32::RED);
    }

    #[test]
    fn rectangle_finalizes_with_one_snapshot() {
        let mut rig = Rig::new();
        rig.moved(100.0, 100.0);
        rig.with(|pen, ctx| pen.create_shape(ctx, 'r'));
        assert_eq!(rig.pen.mode(), PenMode::Shape);
        assert!(rig.layers.shape.is_visible());

        let phases = ShapeKind::Rectangle.default_lengths().len() + 2;
        for _ in 0..phases {
            rig.down(100.0, 100.0);
            rig.up(100.0, 100.0);
        }
        assert_eq!(rig.pen.mode(), PenMode::None);
        assert!(rig.pen.shape().is_none());
        assert_eq!(rig.pen.history().len(), 2);
        assert_eq!(rig.layers.pen.record().op_count(), 1);
        assert!(!rig.layers.shape.is_visible());
    }

    #[test]
    fn rotation_returns_to_the_underlying_tool() {
        let mut rig = Rig::new();
        rig.with(|pen, ctx| pen.rotate(ctx.state));
        assert_eq!(rig.pen.mode(), PenMode::None, "nothing to rotate");

        rig.fill(square(10.0, 10.0, 20.0), Color32::RED);
        rig.act(PenAction::ContinuousSelection);
        rig.down(10.0, 10.0);
        rig.up(30.0, 30.0);
        rig.act(PenAction::Rotate);
        assert_eq!(rig.pen.mode(), PenMode::Rotation);
        assert_eq!(rig.state.prompt, "ROTATING");

        rig.moved(60.0, 20.0);
        rig.moved(20.0, -20.0);
        assert!(rig.layers.selection.rotation().abs() > 0.1);

        rig.act(PenAction::Rotate);
        assert_eq!(rig.pen.mode(), PenMode::ContinuousSelection);
        assert!(rig.state.prompt.is_empty());
    }

    #[test]
    fn typeset_follows_pointer_then_commits_a_fragment() {
        let mut rig = Rig::new();
        rig.moved(100.0, 100.0);
        rig.with(|pen, ctx| pen.begin_typeset(ctx, "x+y".to_owned(), 12.0));
        assert_eq!(rig.pen.mode(), PenMode::Typeset);
        assert!(rig.layers.typeset.is_visible());

        rig.moved(120.0, 80.0);
        let center = rig.layers.typeset.rect().center();
        assert!((center - pos2(120.0, 80.0)).length() < 1.0);

        rig.down(120.0, 80.0);
        assert_eq!(rig.pen.mode(), PenMode::None);
        assert!(rig.layers.pen.record().has_fragments());
        assert!(!rig.layers.typeset.is_visible());
        assert_eq!(rig.pen.history().len(), 2);
    }

    #[test]
    fn pending_typeset_ignores_clicks_and_cancels_cleanly() {
        struct Never;
        impl Typesetter for Never {
            fn render(&self, _: TypesetRequest) -> PendingTypeset {
                let (sender, pending) = PendingTypeset::channel();
                std::mem::forget(sender);
                pending
            }
        }

        let mut rig = Rig::new();
        let never = Never;
        let mut ctx = PenContext {
            layers: &mut rig.layers,
            clipboard: &mut rig.clipboard,
            state: &mut rig.state,
            typesetter: &never,
        };
        rig.pen.begin_typeset(&mut ctx, "a".to_owned(), 12.0);
        rig.pen.pointer_down(&mut ctx, PointerSample::at(pos2(5.0, 5.0)));
        assert_eq!(rig.pen.mode(), PenMode::Typeset);
        rig.pen.cancel(&mut ctx);
        assert_eq!(rig.pen.mode(), PenMode::None);
        assert_eq!(rig.pen.history().len(), 1);
    }

    #[test]
    fn capture_reports_bounds_without_touching_pixels() {
        let mut rig = Rig::new();
        rig.fill(square(10.0, 10.0, 20.0), Color32::RED);
        rig.with(|pen, ctx| pen.begin_capture(ctx));
        assert_eq!(rig.state.prompt, "CAPTURE");
        rig.down(5.0, 5.0);
        rig.moved(25.0, 25.0);
        let bounds = rig.up(45.0, 35.0).unwrap();
        assert_eq!(bounds.top_left, pos2(5.0, 5.0));
        assert_eq!((bounds.width, bounds.height), (40.0, 30.0));
        assert_eq!(pixel_at(&rig.layers.pen, 15, 15), Color32::RED);
        assert!(!rig.layers.selection.is_visible());
        assert_eq!(rig.pen.mode(), PenMode::None);
    }

    #[test]
    fn recording_freezes_history_and_rewinds_on_stop() {
        let mut rig = Rig::new();
        rig.with(|pen, ctx| pen.start_recording(ctx));
        rig.down(50.0, 50.0);
        rig.moved(60.0, 55.0);
        rig.up(60.0, 55.0);
        assert_eq!(rig.pen.history().len(), 1);

        let points = rig.with(|pen, ctx| pen.stop_recording(ctx));
        assert_eq!(points.len(), 2);
        assert!(rig.layers.pen.is_blank());

        let snippet = Snippet::from_recording(points).unwrap();
        rig.moved(100.0, 100.0);
        rig.with(|pen, ctx| pen.play_snippet(ctx, &snippet));
        assert_eq!(rig.pen.history().len(), 2);
        assert!(!rig.layers.pen.is_blank());
    }

    #[test]
    fn cancel_before_any_edit_keeps_redo() {
        let mut rig = Rig::new();
        rig.fill(square(10.0, 10.0, 20.0), Color32::RED);
        rig.act(PenAction::Undo);
        assert!(rig.pen.history().can_redo());

        rig.act(PenAction::Select);
        rig.with(|pen, ctx| pen.cancel(ctx));
        rig.act(PenAction::DrawLine);
        rig.with(|pen, ctx| pen.cancel(ctx));
        rig.act(PenAction::Yank);
        rig.down(5.0, 5.0);
        rig.up(40.0, 40.0);
        rig.with(|pen, ctx| pen.cancel(ctx));

        assert_eq!(rig.pen.history().len(), 2);
        assert!(rig.pen.history().can_redo());
        rig.act(PenAction::Redo);
        assert_eq!(pixel_at(&rig.layers.pen, 15, 15), Color32::RED);
    }

    #[test]
    fn toggle_off_drops_the_active_selection() {
        let mut rig = Rig::new();
        rig.fill(square(10.0, 10.0, 20.0), Color32::RED);
        rig.act(PenAction::Select);
        rig.down(5.0, 5.0);
        rig.up(40.0, 40.0);
        assert!(rig.layers.selection.is_visible());

        rig.with(|pen, ctx| pen.toggle(ctx));
        assert!(!rig.pen.is_enabled());
        assert_eq!(rig.pen.mode(), PenMode::None);
        assert!(!rig.layers.selection.is_visible());
        assert!(rig.pen.selection().is_none());
    }

    #[test]
    fn toggle_clears_and_resets_zoom() {
        let mut rig = Rig::new();
        rig.fill(square(10.0, 10.0, 20.0), Color32::RED);
        rig.state.zoom = 1.6;
        rig.with(|pen, ctx| pen.toggle(ctx));
        assert!(!rig.pen.is_enabled());
        assert!(rig.layers.pen.is_blank());
        assert!(!rig.layers.pen.is_visible());
        assert_eq!(rig.state.zoom, 1.0);
        assert_eq!(rig.layers.get(LayerId::Preview).is_visible(), false);
    }
}
