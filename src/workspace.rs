//! The board as a whole: layers, pens, clipboard, snippets, the controller
//! connection's pending requests and the playing sequence.
//!
//! Everything runs on the UI thread. The workspace is fed controller
//! commands, input events and a once-per-frame [`Workspace::poll`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use egui::{Pos2, Rect, vec2};
use parking_lot::Mutex;
use serde_json::Value;

use crate::clipboard::Clipboard;
use crate::config::Settings;
use crate::error::CaptureError;
use crate::input::{InputEvent, KeyPress};
use crate::keymap::{Binding, GeneralAction, KeyDispatcher, KeyOutcome, Keymap, Operator};
use crate::pen::{Pen, PenContext, PenMode};
use crate::primitive::Primitive;
use crate::protocol::{AwaitEventArgs, Command, SequenceArgs, expand_home};
use crate::sequence::{Sequence, Tick, draw_all};
use crate::snippet::SnippetLibrary;
use crate::state::{AppState, CaptureRequest};
use crate::surface::{
    Fragment, FragmentQueue, LayerId, Layers, SvgRenderer, encode_png, svg_document,
};
use crate::typeset::{PendingTypeset, TextTypesetter, TypesetRequest, Typesetter};

const ZOOM_STEP: f32 = 0.2;
const MIN_ZOOM: f32 = 1.0;

/// Where replies to the controller go.
pub trait ReplySink: Send {
    fn send(&self, values: &[Value]);
}

/// Keeps replies in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordedReplies {
    log: Arc<Mutex<Vec<Vec<Value>>>>,
}

impl RecordedReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything sent so far.
    pub fn take(&self) -> Vec<Vec<Value>> {
        std::mem::take(&mut *self.log.lock())
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }
}

impl ReplySink for RecordedReplies {
    fn send(&self, values: &[Value]) {
        self.log.lock().push(values.to_vec());
    }
}

/// A typeset draw from the controller waiting for its render.
#[derive(Debug)]
struct QueuedTypeset {
    pending: PendingTypeset,
    layer: LayerId,
    center: Pos2,
}

pub struct Workspace {
    settings: Settings,
    state: AppState,
    layers: Layers,
    pens: BTreeMap<char, Pen>,
    current: char,
    clipboard: Clipboard,
    snippets: SnippetLibrary,
    typesetter: Box<dyn Typesetter>,
    queued: FragmentQueue,
    typesets: Vec<QueuedTypeset>,
    subscription: Option<AwaitEventArgs>,
    sequence: Option<Sequence>,
    keys: KeyDispatcher,
    replies: Box<dyn ReplySink>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("pens", &self.pens.keys().collect::<Vec<_>>())
            .field("current", &self.current)
            .field("state", &self.state)
            .field("queued", &self.queued.len())
            .field("typesets", &self.typesets.len())
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// A board of `width`x`height` pixels. Bad keymap overrides are logged
    /// and the built-in table is used instead.
    pub fn new(
        settings: Settings,
        width: u32,
        height: u32,
        renderer: Arc<SvgRenderer>,
        replies: Box<dyn ReplySink>,
    ) -> Self {
        let keymap = Keymap::with_overrides(&settings.keymap).unwrap_or_else(|err| {
            log::warn!("Ignoring keymap overrides: {}", err);
            Keymap::with_overrides(&BTreeMap::new()).unwrap_or_default()
        });
        let layers = Layers::new(width, height, renderer);
        let current = settings.default_pen;
        let mut pens = BTreeMap::new();
        pens.insert(current, Pen::new(current, &settings, &layers.pen));
        Self {
            clipboard: Clipboard::new(settings.clipboard_capacity),
            snippets: SnippetLibrary::in_memory(),
            typesetter: Box::new(TextTypesetter),
            queued: FragmentQueue::default(),
            typesets: Vec::new(),
            subscription: None,
            sequence: None,
            keys: KeyDispatcher::new(keymap),
            state: AppState::default(),
            layers,
            pens,
            current,
            settings,
            replies,
        }
    }

    pub fn with_snippets(mut self, snippets: SnippetLibrary) -> Self {
        self.snippets = snippets;
        self
    }

    pub fn with_typesetter(mut self, typesetter: Box<dyn Typesetter>) -> Self {
        self.typesetter = typesetter;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    pub fn layers(&self) -> &Layers {
        &self.layers
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn snippets(&self) -> &SnippetLibrary {
        &self.snippets
    }

    pub fn keys(&self) -> &KeyDispatcher {
        &self.keys
    }

    pub fn sequence(&self) -> Option<&Sequence> {
        self.sequence.as_ref()
    }

    pub fn queued_fragments(&self) -> usize {
        self.queued.len()
    }

    pub fn pen(&self) -> &Pen {
        // `current` always names an entry; see `with_pen`.
        &self.pens[&self.current]
    }

    pub fn pen_names(&self) -> impl Iterator<Item = char> + '_ {
        self.pens.keys().copied()
    }

    /// Whether anything needs polling on the next frame even without input.
    pub fn is_animating(&self) -> bool {
        self.sequence.is_some()
            || !self.typesets.is_empty()
            || self.pen().mode() == PenMode::Typeset
    }

    /// Runs `f` on the current pen with the shared context.
    fn with_pen<R>(&mut self, f: impl FnOnce(&mut Pen, &mut PenContext<'_>) -> R) -> R {
        let pen = self
            .pens
            .entry(self.current)
            .or_insert_with(|| Pen::new(self.current, &self.settings, &self.layers.pen));
        let mut ctx = PenContext {
            layers: &mut self.layers,
            clipboard: &mut self.clipboard,
            state: &mut self.state,
            typesetter: self.typesetter.as_ref(),
        };
        f(pen, &mut ctx)
    }

    fn reply(&self, values: &[Value]) {
        log::debug!("Reply: {:?}", values);
        self.replies.send(values);
    }

    /// Parses and runs one framed controller line. Bad lines are logged and
    /// dropped.
    pub fn handle_message(&mut self, line: &str) {
        match Command::parse(line) {
            Ok(command) => self.handle_command(command),
            Err(err) => log::warn!("Dropping message: {}", err),
        }
    }

    pub fn handle_command(&mut self, command: Command) {
        log::debug!("Command `{}`", command.name());
        let font_size = self.settings.default_font_size;
        match command {
            Command::Draw { layer, primitive } => self.draw(layer, std::slice::from_ref(&primitive)),
            Command::DrawGroup { layer, primitives } => self.draw(layer, &primitives),
            Command::Clear(args) => {
                self.layers.main.clear();
                if args.background {
                    self.layers.background.clear();
                }
            }
            Command::ClearVectorOverlay => {
                self.queued.clear();
                self.layers.main.clear_fragments();
                self.layers.background.clear_fragments();
            }
            Command::AwaitEvent(args) => {
                if let Some(previous) = self.subscription.replace(args) {
                    log::warn!("Replacing pending awaitEvent `{}`", previous.kind);
                }
                self.state.awaiting_event = true;
            }
            Command::AwaitProperties(args) => {
                let values: Vec<Value> = args.keys.iter().map(|key| self.property(key)).collect();
                self.reply(&values);
            }
            Command::RenderSequence(args) => self.play_sequence(args, font_size),
            Command::ToggleBackground => {
                let light = !self.state.light_mode;
                self.set_light_mode(light);
            }
            Command::SetLightMode => self.set_light_mode(true),
            Command::SetDarkMode => self.set_light_mode(false),
            Command::SetBackgroundStyle(args) => {
                self.state.background_style = Some(args.background);
            }
            Command::CaptureArea(args) => {
                self.state.capture = Some(CaptureRequest {
                    save_path: args.save_path,
                    awaits_reply: args.awaits_reply,
                    region: None,
                });
                self.with_pen(|pen, ctx| {
                    if !pen.is_enabled() {
                        pen.toggle(ctx);
                    }
                    pen.begin_capture(ctx);
                });
            }
            Command::ResizeWindow(args) => {
                let size = self.layers.viewport_size();
                if size == vec2(args.width as f32, args.height as f32) {
                    self.reply(&[]);
                } else {
                    self.state.requested_size = Some((args.width, args.height));
                    self.state.resize_reply_pending = true;
                }
            }
        }
    }

    fn draw(&mut self, layer: LayerId, primitives: &[Primitive]) {
        let font_size = self.settings.default_font_size;
        let typesets = draw_all(primitives, self.layers.get_mut(layer), font_size);
        self.queue_typesets(layer, typesets);
    }

    fn queue_typesets(&mut self, layer: LayerId, typesets: Vec<(TypesetRequest, Pos2)>) {
        for (request, center) in typesets {
            let pending = self.typesetter.render(request);
            self.typesets.push(QueuedTypeset {
                pending,
                layer,
                center,
            });
        }
    }

    fn play_sequence(&mut self, args: SequenceArgs, font_size: f32) {
        self.stop_sequence();
        let mut sequence = Sequence::new(args);
        sequence.start(&mut self.layers, font_size);
        self.sequence = Some(sequence);
    }

    /// Stops playback right away, owing no frames but still completing.
    fn stop_sequence(&mut self) {
        if let Some(mut sequence) = self.sequence.take() {
            sequence.stop();
            if sequence.awaits_completion() {
                self.reply(&[Value::from("completed")]);
            }
        }
    }

    fn set_light_mode(&mut self, light: bool) {
        self.state.light_mode = light;
        let pen = &self.pens[&self.current];
        pen.draw_swatch(&mut self.layers, light);
    }

    /// Reads a property for `awaitProperties`. Unknown names are `null`.
    pub fn property(&self, key: &str) -> Value {
        let size = self.layers.viewport_size();
        match key {
            "width" => Value::from(size.x.round() as i64),
            "height" => Value::from(size.y.round() as i64),
            "isLightMode" => Value::from(self.state.light_mode),
            "awaitingEvent" => Value::from(self.state.awaiting_event),
            "zoom" => Value::from(f64::from(self.state.zoom)),
            "penEnabled" => Value::from(self.pen().is_enabled()),
            "currentPen" => Value::from(self.current.to_string()),
            "isPlaying" => Value::from(self.sequence.as_ref().is_some_and(Sequence::is_playing)),
            "backgroundStyle" => self
                .state
                .background_style
                .clone()
                .map(Value::from)
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Routes one input event: to a pending `awaitEvent` first, otherwise to
    /// the key dispatcher or the current pen.
    pub fn handle_input(&mut self, event: InputEvent) {
        if let InputEvent::PointerDown(s) | InputEvent::PointerMove(s) | InputEvent::PointerUp(s) = &event {
            self.state.pointer = s.pos;
        }
        if let Some(sub) = self.subscription.take_if(|sub| event.matches(&sub.kind)) {
            let values: Vec<Value> = sub.data_keys.iter().map(|key| event.field(key)).collect();
            self.state.awaiting_event = false;
            self.reply(&values);
            return;
        }
        match event {
            InputEvent::PointerDown(sample) => self.with_pen(|pen, ctx| pen.pointer_down(ctx, sample)),
            InputEvent::PointerMove(sample) => self.with_pen(|pen, ctx| pen.pointer_move(ctx, sample)),
            InputEvent::PointerUp(sample) => {
                let capturing = self.pen().mode() == PenMode::Capture;
                let bounds = self.with_pen(|pen, ctx| pen.pointer_up(ctx, sample));
                if !capturing || self.pen().mode() == PenMode::Capture {
                    return;
                }
                match bounds {
                    Some(bounds) => {
                        if let Some(capture) = self.state.capture.as_mut() {
                            capture.region = Some(bounds.rect());
                            self.state.set_prompt("ENTER TO CONFIRM");
                        }
                    }
                    // A click without a drag selects nothing.
                    None => self.abandon_capture("empty region"),
                }
            }
            InputEvent::Key(press) => self.handle_key(&press),
        }
    }

    pub fn handle_key(&mut self, press: &KeyPress) {
        let armed = self.keys.pending().is_some();
        let outcome = self.keys.handle(press);
        if armed {
            self.state.clear_prompt();
        }
        match outcome {
            KeyOutcome::Bound(Binding::General(action)) => self.general(action),
            KeyOutcome::Bound(Binding::Pen(action)) => self.with_pen(|pen, ctx| pen.apply(action, ctx)),
            KeyOutcome::Bound(Binding::Operator(op)) => self.arm(op),
            KeyOutcome::Argument(op, arg) => self.operate(op, arg),
            KeyOutcome::Unhandled => {}
        }
    }

    fn arm(&mut self, op: Operator) {
        if op == Operator::RecordMacro && self.snippets.is_recording() {
            self.stop_recording();
            return;
        }
        if op != Operator::SwitchPen && !self.pen().is_enabled() {
            return;
        }
        self.keys.arm(op);
        self.state.set_prompt(op.name());
    }

    fn operate(&mut self, op: Operator, arg: char) {
        log::debug!("{} `{}`", op.name(), arg);
        match op {
            Operator::RecordMacro => {
                self.snippets.begin_recording(arg);
                self.with_pen(|pen, ctx| pen.start_recording(ctx));
                self.state.set_prompt("RECORDING");
            }
            Operator::PlayMacro => {
                let Some(snippet) = self.snippets.get(arg).cloned() else {
                    log::debug!("No macro `{}`", arg);
                    return;
                };
                self.with_pen(|pen, ctx| pen.play_snippet(ctx, &snippet));
            }
            Operator::Paste => self.with_pen(|pen, ctx| pen.paste(ctx, arg)),
            Operator::PasteGlobal => {
                let key = arg.to_ascii_uppercase();
                self.with_pen(|pen, ctx| pen.paste(ctx, key));
            }
            Operator::YankTo => self.with_pen(|pen, ctx| pen.yank_to(ctx, arg)),
            Operator::DeleteTo => self.with_pen(|pen, ctx| pen.delete(ctx, arg)),
            Operator::SwitchPen => {
                if arg.is_alphanumeric() {
                    self.switch_pen(arg);
                }
            }
            Operator::CreateShape => self.with_pen(|pen, ctx| pen.create_shape(ctx, arg)),
            Operator::ToggleStyle => self.with_pen(|pen, _| pen.toggle_style(arg)),
        }
    }

    fn stop_recording(&mut self) {
        let points = self.with_pen(|pen, ctx| pen.stop_recording(ctx));
        self.snippets.finish_recording(points);
        self.state.clear_prompt();
    }

    fn general(&mut self, action: GeneralAction) {
        log::debug!("{}", action.name());
        match action {
            GeneralAction::StopSequence => self.stop_sequence(),
            GeneralAction::ClearCanvas => self.layers.main.clear(),
            GeneralAction::ToggleBackground => {
                let light = !self.state.light_mode;
                self.set_light_mode(light);
            }
            GeneralAction::TogglePen => {
                self.with_pen(|pen, ctx| pen.toggle(ctx));
                if !self.pen().is_enabled() {
                    self.abandon_capture("pen disabled");
                }
            }
            GeneralAction::ZoomIn => self.zoom(self.state.zoom + ZOOM_STEP),
            GeneralAction::ZoomOut => self.zoom(self.state.zoom - ZOOM_STEP),
            GeneralAction::ZoomReset => self.zoom(MIN_ZOOM),
            GeneralAction::ConfirmCapture => self.confirm_capture(),
            GeneralAction::ExportSvg => {
                let Some(path) = self.settings.export_path() else {
                    log::warn!("No export path configured");
                    return;
                };
                match self.export_svg_to(&path) {
                    Ok(()) => log::info!("Exported drawing to {}", path.display()),
                    Err(err) => log::error!("Export to {} failed: {}", path.display(), err),
                }
            }
            GeneralAction::ClearAll => self.clear_all(),
            GeneralAction::Cancel => self.cancel(),
        }
    }

    fn zoom(&mut self, factor: f32) {
        if self.pen().is_enabled() {
            self.state.zoom = factor.max(MIN_ZOOM);
        }
    }

    /// Escape: drops the pending operator, an unfinished macro, the prompt
    /// and whatever the pen is doing.
    fn cancel(&mut self) {
        self.keys.disarm();
        self.state.typeset_prompt = false;
        if self.snippets.is_recording() {
            self.with_pen(|pen, ctx| pen.stop_recording(ctx));
            self.snippets.cancel_recording();
        }
        self.with_pen(|pen, ctx| pen.cancel(ctx));
        self.state.clear_prompt();
        self.abandon_capture("canceled");
    }

    /// Drops a pending capture, answering an awaiting controller with `[]`.
    fn abandon_capture(&mut self, reason: &str) {
        if let Some(capture) = self.state.capture.take() {
            log::info!("Capture to {} abandoned: {}", capture.save_path, reason);
            if capture.awaits_reply {
                self.reply(&[]);
            }
        }
    }

    fn clear_all(&mut self) {
        self.layers.main.clear();
        self.layers.background.clear();
        self.layers.pen.clear();
        for pen in self.pens.values_mut() {
            pen.history_mut().take_snapshot(&self.layers.pen);
        }
    }

    /// Makes pen `name` current, creating it blank on first use. The
    /// pointer position and enabled flag carry over.
    pub fn switch_pen(&mut self, name: char) {
        if name == self.current {
            return;
        }
        let (point, enabled) = self.with_pen(|pen, ctx| {
            pen.cancel(ctx);
            (pen.current_point(), pen.is_enabled())
        });
        if !self.pens.contains_key(&name) {
            self.layers.pen.clear();
            self.pens
                .insert(name, Pen::new(name, &self.settings, &self.layers.pen));
        }
        self.current = name;
        let light_mode = self.state.light_mode;
        if let Some(pen) = self.pens.get_mut(&name) {
            pen.set_current_point(point);
            pen.set_enabled(enabled);
            pen.history_mut().travel(0, &mut self.layers.pen);
            pen.draw_swatch(&mut self.layers, light_mode);
        }
        log::info!("Switched to pen `{}`", name);
    }

    /// Submits the typeset prompt: `source`, optionally followed by `;` and
    /// a font size.
    pub fn submit_typeset(&mut self, input: &str) {
        self.state.typeset_prompt = false;
        let default = self.pen().font_size();
        let Some((source, size)) = crate::typeset::parse_prompt(input, default) else {
            return;
        };
        self.with_pen(|pen, ctx| pen.begin_typeset(ctx, source, size));
    }

    /// Writes the dragged capture region as PNG and answers the controller.
    pub fn confirm_capture(&mut self) {
        let Some(capture) = self.state.capture.take() else {
            return;
        };
        let Some(region) = capture.region else {
            self.state.capture = Some(capture);
            return;
        };
        self.state.clear_prompt();
        match self.write_capture(region, &capture.save_path) {
            Ok(()) => {
                log::info!("Captured {:?} to {}", region, capture.save_path);
                if capture.awaits_reply {
                    self.reply(&[
                        Value::from(region.min.x.round() as i64),
                        Value::from(region.min.y.round() as i64),
                        Value::from(region.width().round() as i64),
                        Value::from(region.height().round() as i64),
                    ]);
                }
            }
            Err(err) => {
                log::error!("Capture to {} failed: {}", capture.save_path, err);
                if capture.awaits_reply {
                    self.reply(&[]);
                }
            }
        }
    }

    fn write_capture(&self, region: Rect, save_path: &str) -> Result<(), CaptureError> {
        if region.width() < 1.0 || region.height() < 1.0 {
            return Err(CaptureError::Empty);
        }
        let pixels = self
            .layers
            .composite_region(region)
            .ok_or(CaptureError::Empty)?;
        std::fs::write(expand_home(save_path), encode_png(&pixels)?)?;
        Ok(())
    }

    /// The visible viewport layers as one SVG document. Queued controller
    /// fragments are merged in and then dropped.
    pub fn export_svg(&mut self) -> String {
        let size = self.layers.viewport_size();
        let renderer = Arc::clone(self.layers.main.renderer());
        let layers = &self.layers;
        svg_document(
            size.x,
            size.y,
            &[&layers.background, &layers.main, &layers.pen],
            self.queued.drain(),
            &renderer,
        )
    }

    pub fn export_svg_to(&mut self, path: &Path) -> Result<(), CaptureError> {
        let svg = self.export_svg();
        std::fs::write(path, svg)?;
        Ok(())
    }

    /// Applies a new viewport size. Main and background come back blank;
    /// the pen layer is restored from history.
    pub fn resize(&mut self, width: u32, height: u32) {
        let size = self.layers.viewport_size();
        if size != vec2(width as f32, height as f32) {
            log::info!("Resizing board to {}x{}", width, height);
            self.layers.resize_viewport(width, height);
            self.with_pen(|pen, ctx| {
                pen.history_mut().travel(0, &mut ctx.layers.pen);
            });
            if self.sequence.as_ref().is_some_and(Sequence::is_playing) {
                self.state.rerender_background = true;
            }
        }
        self.state.requested_size = None;
        if std::mem::take(&mut self.state.resize_reply_pending) {
            self.reply(&[]);
        }
    }

    /// Like [`resize`](Self::resize), but keeps main and background content
    /// where it was.
    pub fn resize_preserving(&mut self, width: u32, height: u32) {
        let background = self.layers.background.state();
        let main = self.layers.main.state();
        self.resize(width, height);
        self.layers.background.restore(&background);
        self.layers.main.restore(&main);
    }

    /// Once per frame: finishes typeset renders and advances the sequence.
    pub fn poll(&mut self, now: Instant) {
        self.with_pen(|pen, ctx| pen.poll_typeset(ctx));
        self.poll_typesets();

        let font_size = self.settings.default_font_size;
        let Some(sequence) = self.sequence.as_mut() else {
            return;
        };
        match sequence.tick(now, &mut self.layers, &mut self.state, font_size) {
            Tick::Waiting => {}
            Tick::Drew { typesets, .. } => self.queue_typesets(LayerId::Main, typesets),
            Tick::Finished { awaits_completion } => {
                self.sequence = None;
                if awaits_completion {
                    self.reply(&[Value::from("completed")]);
                }
            }
        }
    }

    fn poll_typesets(&mut self) {
        let mut done = Vec::new();
        let mut index = 0;
        while index < self.typesets.len() {
            match self.typesets[index].pending.poll() {
                Some(result) => {
                    let job = self.typesets.swap_remove(index);
                    done.push((job, result));
                }
                None => index += 1,
            }
        }
        for (job, result) in done {
            match result {
                Ok(block) => self.place_typeset(job.layer, job.center, &block.svg, block.width, block.height),
                Err(err) => log::warn!("Typeset draw failed: {}", err),
            }
        }
    }

    /// Rasterizes a controller typeset block centered on `center` and queues
    /// its vector form for export.
    fn place_typeset(&mut self, layer: LayerId, center: Pos2, svg: &str, width: f32, height: f32) {
        let surface = self.layers.get_mut(layer);
        let pixels = match surface
            .renderer()
            .rasterize(svg, width.ceil() as u32, height.ceil() as u32)
        {
            Ok(pixels) => pixels,
            Err(err) => {
                log::warn!("Typeset block failed to render: {}", err);
                return;
            }
        };
        let at = center - vec2(width, height) / 2.0;
        let at = Pos2::new(at.x.round(), at.y.round());
        match Fragment::place(svg, at) {
            Some(fragment) => {
                surface.canvas_mut().draw_pixmap(&pixels, at);
                self.queued.push(fragment.markup());
            }
            None => surface.draw_pixmap(&pixels, at),
        }
    }
}

#[cfg(test)]
mod tests {
    use egui::pos2;
    use serde_json::json;

    use super::*;
    use crate::input::PointerSample;
    use crate::surface::pixel_at;

    fn workspace() -> (Workspace, RecordedReplies) {
        let replies = RecordedReplies::new();
        let ws = Workspace::new(
            Settings::default(),
            200,
            100,
            Arc::new(SvgRenderer::default()),
            Box::new(replies.clone()),
        );
        (ws, replies)
    }

    fn key(chord: &str) -> InputEvent {
        InputEvent::Key(KeyPress::parse(chord).unwrap())
    }

    fn down(x: f32, y: f32) -> InputEvent {
        InputEvent::PointerDown(PointerSample::at(pos2(x, y)))
    }

    #[test]
    fn await_event_replies_once() {
        let (mut ws, replies) = workspace();
        ws.handle_message(r#"{"command":"awaitEvent","args":{"type":"pointerdown","dataKeys":["pageX","pageY"]}}"#);
        assert!(ws.state().awaiting_event);
        ws.handle_input(down(42.0, 17.0));
        ws.handle_input(down(50.0, 50.0));
        assert_eq!(replies.take(), vec![vec![json!(42), json!(17)]]);
        assert!(!ws.state().awaiting_event);
    }

    #[test]
    fn properties_and_modes() {
        let (mut ws, replies) = workspace();
        ws.handle_message(r#"{"command":"setLightMode"}"#);
        ws.handle_message(r#"{"command":"awaitProperties","args":{"keys":["width","height","isLightMode","bogus"]}}"#);
        assert_eq!(
            replies.take(),
            vec![vec![json!(200), json!(100), json!(true), Value::Null]]
        );
        ws.handle_message(r#"{"command":"toggleBackground"}"#);
        assert!(!ws.state().light_mode);
    }

    #[test]
    fn malformed_messages_are_dropped() {
        let (mut ws, replies) = workspace();
        ws.handle_message("not json");
        ws.handle_message(r#"{"command":"teleport"}"#);
        ws.handle_message(r#"{"command":"draw","args":{"type":"rect"}}"#);
        assert!(replies.is_empty());
        assert!(ws.layers().main.is_blank());
    }

    #[test]
    fn draws_land_on_their_layer() {
        let (mut ws, _) = workspace();
        ws.handle_message(
            r##"{"command":"draw","args":{"type":"rect","point":[20,20],"width":10,"height":10,"fillColor":"#ff0000","background":true}}"##,
        );
        assert!(!ws.layers().background.is_blank());
        assert!(ws.layers().main.is_blank());
        ws.handle_message(r#"{"command":"clear","args":{"background":false}}"#);
        assert!(!ws.layers().background.is_blank());
        ws.handle_message(r#"{"command":"clear"}"#);
        assert!(ws.layers().background.is_blank());
    }

    #[test]
    fn resize_reply_waits_for_the_resize() {
        let (mut ws, replies) = workspace();
        ws.handle_message(r#"{"command":"resizeWindow","args":{"width":200,"height":100}}"#);
        assert_eq!(replies.take(), vec![Vec::<Value>::new()]);

        ws.handle_message(r#"{"command":"resizeWindow","args":{"width":300,"height":120}}"#);
        assert!(replies.is_empty());
        assert_eq!(ws.state().requested_size, Some((300, 120)));
        ws.resize(300, 120);
        assert_eq!(replies.take(), vec![Vec::<Value>::new()]);
        assert_eq!(ws.property("width"), json!(300));
    }

    #[test]
    fn resize_restores_the_pen_layer() {
        let (mut ws, _) = workspace();
        ws.handle_input(key("Control+p"));
        ws.handle_input(down(30.0, 30.0));
        ws.handle_input(InputEvent::PointerUp(PointerSample::at(pos2(30.0, 30.0))));
        assert!(!ws.layers().pen.is_blank());
        ws.resize(240, 140);
        assert!(!ws.layers().pen.is_blank());
        assert_ne!(pixel_at(&ws.layers().pen, 30, 30), egui::Color32::TRANSPARENT);
    }

    #[test]
    fn sequence_completion_and_stop() {
        let (mut ws, replies) = workspace();
        ws.handle_message(
            r#"{"command":"renderSequence","args":{"frames":[[{"type":"rect","point":[5,5],"width":4,"height":4}]],"frameDuration":0,"awaitsCompletion":true}}"#,
        );
        let now = Instant::now();
        ws.poll(now);
        assert!(ws.sequence().is_some());
        ws.poll(now);
        assert!(ws.sequence().is_none());
        assert_eq!(replies.take(), vec![vec![json!("completed")]]);

        ws.handle_message(
            r#"{"command":"renderSequence","args":{"frames":[[],[]],"frameDuration":10,"awaitsCompletion":true}}"#,
        );
        ws.handle_input(key("Control+c"));
        assert_eq!(replies.take(), vec![vec![json!("completed")]]);
        assert!(ws.sequence().is_none());
    }

    #[test]
    fn zoom_needs_the_pen() {
        let (mut ws, _) = workspace();
        ws.handle_input(key("="));
        assert_eq!(ws.state().zoom, 1.0);
        ws.handle_input(key("Control+p"));
        ws.handle_input(key("="));
        ws.handle_input(key("="));
        assert!((ws.state().zoom - 1.4).abs() < 1e-5);
        ws.handle_input(key("-"));
        ws.handle_input(key("-"));
        ws.handle_input(key("-"));
        assert_eq!(ws.state().zoom, 1.0);
    }

    #[test]
    fn switching_pens_keeps_their_drawings() {
        let (mut ws, _) = workspace();
        ws.handle_input(key("Control+p"));
        ws.handle_input(down(10.0, 10.0));
        ws.handle_input(InputEvent::PointerUp(PointerSample::at(pos2(10.0, 10.0))));
        assert!(!ws.layers().pen.is_blank());

        ws.handle_input(key("'"));
        ws.handle_input(key("b"));
        assert_eq!(ws.pen().name(), 'b');
        assert!(ws.pen().is_enabled());
        assert!(ws.layers().pen.is_blank());
        assert_eq!(ws.pen().current_point(), pos2(10.0, 10.0));

        ws.handle_input(key("'"));
        ws.handle_input(key("m"));
        assert!(!ws.layers().pen.is_blank());
        assert_eq!(ws.pen_names().collect::<Vec<_>>(), vec!['b', 'm']);
    }

    #[test]
    fn capture_writes_png_and_replies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let (mut ws, replies) = workspace();
        ws.handle_message(
            r##"{"command":"draw","args":{"type":"rect","point":[50,50],"width":40,"height":40,"fillColor":"#00ff00"}}"##,
        );
        ws.handle_command(Command::CaptureArea(crate::protocol::CaptureArgs {
            save_path: path.display().to_string(),
            awaits_reply: true,
        }));
        assert_eq!(ws.pen().mode(), PenMode::Capture);
        ws.handle_input(down(30.0, 30.0));
        ws.handle_input(InputEvent::PointerMove(PointerSample::at(pos2(70.0, 60.0))));
        ws.handle_input(InputEvent::PointerUp(PointerSample::at(pos2(70.0, 60.0))));
        assert!(replies.is_empty());
        ws.handle_input(key("Enter"));
        assert_eq!(replies.take(), vec![vec![json!(30), json!(30), json!(40), json!(30)]]);
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[test]
    fn canceled_capture_still_replies() {
        let (mut ws, replies) = workspace();
        ws.handle_message(r#"{"command":"captureArea","args":{"savePath":"/tmp/never.png","awaitsReply":true}}"#);
        ws.handle_input(key("Escape"));
        assert_eq!(replies.take(), vec![Vec::<Value>::new()]);
        assert!(ws.state().capture.is_none());
    }

    #[test]
    fn click_without_drag_abandons_capture() {
        let (mut ws, replies) = workspace();
        ws.handle_message(r#"{"command":"captureArea","args":{"savePath":"/tmp/never.png","awaitsReply":true}}"#);
        ws.handle_input(down(40.0, 40.0));
        ws.handle_input(InputEvent::PointerUp(PointerSample::at(pos2(40.0, 40.0))));
        assert_eq!(replies.take(), vec![Vec::<Value>::new()]);
        assert!(ws.state().capture.is_none());
        assert_eq!(ws.pen().mode(), PenMode::None);

        ws.handle_input(key("Enter"));
        assert!(replies.is_empty());
    }

    #[test]
    fn macros_record_and_play() {
        let (mut ws, _) = workspace();
        ws.handle_input(key("Control+p"));
        ws.handle_input(key("q"));
        ws.handle_input(key("a"));
        assert!(ws.snippets().is_recording());
        ws.handle_input(down(10.0, 10.0));
        ws.handle_input(InputEvent::PointerUp(PointerSample::at(pos2(10.0, 10.0))));
        ws.handle_input(key("q"));
        assert!(!ws.snippets().is_recording());
        assert!(ws.snippets().get('a').is_some());
        // Stopping rewinds to the state before recording.
        assert!(ws.layers().pen.is_blank());

        ws.handle_input(InputEvent::PointerMove(PointerSample::at(pos2(100.0, 50.0))));
        ws.handle_input(key("Space"));
        ws.handle_input(key("a"));
        assert!(!ws.layers().pen.is_blank());
    }

    #[test]
    fn operators_need_an_enabled_pen() {
        let (mut ws, _) = workspace();
        ws.handle_input(key("p"));
        assert_eq!(ws.keys().pending(), None);
        ws.handle_input(key("Control+p"));
        ws.handle_input(key("p"));
        assert_eq!(ws.keys().pending(), Some(Operator::Paste));
        assert_eq!(ws.state().prompt, "paste");
        ws.handle_input(key("p"));
        assert_eq!(ws.keys().pending(), None);
        assert!(ws.state().prompt.is_empty());
    }

    #[test]
    fn export_merges_queued_fragments_once() {
        let (mut ws, _) = workspace();
        ws.handle_message(
            r#"{"command":"draw","args":{"type":"latex","source":"x","point":[50,50]}}"#,
        );
        ws.poll(Instant::now());
        assert_eq!(ws.queued_fragments(), 1);
        let svg = ws.export_svg();
        assert!(svg.starts_with("<svg"));
        assert_eq!(ws.queued_fragments(), 0);
    }
}
