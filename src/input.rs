use egui::{Context, Key, Modifiers, PointerButton, Pos2, Rect};
use serde_json::Value;

/// Pressure reported for devices without a pressure sensor.
pub const DEFAULT_PRESSURE: f32 = 0.5;

/// One pointer reading in board coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub pos: Pos2,
    pub pressure: f32,
    /// Whether the primary button (or a touch/pen contact) is involved.
    pub primary: bool,
}

impl PointerSample {
    /// A primary-button sample at default pressure.
    pub fn at(pos: Pos2) -> Self {
        Self {
            pos,
            pressure: DEFAULT_PRESSURE,
            primary: true,
        }
    }
}

/// A key press, spelled the way keymap chords spell it: modifiers plus a
/// key name such as `z`, `Enter`, `[` or `Space`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPress {
    pub key: String,
    pub control: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyPress {
    pub fn new(key: &str) -> Self {
        Self {
            key: normalize_key_name(key),
            control: false,
            shift: false,
            alt: false,
            meta: false,
        }
    }

    /// Parses `Control+Shift+z` style text. Returns `None` for an empty key
    /// or an unknown modifier.
    pub fn parse(chord: &str) -> Option<Self> {
        let chord = chord.trim();
        // A lone `+` or a chord ending in `++` names the plus key itself.
        let (modifiers, key) = match chord.strip_suffix("++") {
            Some(rest) => (rest, "+"),
            None if chord == "+" => ("", "+"),
            None => match chord.rsplit_once('+') {
                Some((modifiers, key)) => (modifiers, key),
                None => ("", chord),
            },
        };
        if key.is_empty() {
            return None;
        }
        let mut press = KeyPress::new(key);
        for modifier in modifiers.split('+').filter(|m| !m.is_empty()) {
            match modifier {
                "Control" | "Ctrl" => press.control = true,
                "Shift" => press.shift = true,
                "Alt" => press.alt = true,
                "Meta" | "Cmd" => press.meta = true,
                _ => return None,
            }
        }
        Some(press)
    }

    pub fn from_egui(key: Key, modifiers: Modifiers) -> Self {
        Self {
            key: normalize_key_name(key.symbol_or_name()),
            control: modifiers.ctrl,
            shift: modifiers.shift,
            alt: modifiers.alt,
            meta: modifiers.mac_cmd,
        }
    }

    /// The character this press stands for when it is an operator argument:
    /// letters honor shift, `Space` is `' '`, named keys have none.
    pub fn argument(&self) -> Option<char> {
        if self.key == "Space" {
            return Some(' ');
        }
        let mut chars = self.key.chars();
        let c = chars.next()?;
        if chars.next().is_some() || self.control || self.meta || self.alt {
            return None;
        }
        Some(if self.shift { c.to_ascii_uppercase() } else { c })
    }

    /// The DOM-style `key` value reported to `awaitEvent` subscribers.
    pub fn dom_key(&self) -> String {
        match self.argument() {
            Some(c) => c.to_string(),
            None => self.key.clone(),
        }
    }
}

/// Single letters are lowercase; `" "` is `Space`; everything else as given.
fn normalize_key_name(name: &str) -> String {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(' '), None) => "Space".to_owned(),
        (Some(c), None) if c.is_ascii_alphabetic() => c.to_ascii_lowercase().to_string(),
        _ => name.to_owned(),
    }
}

/// Input as the board sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown(PointerSample),
    PointerMove(PointerSample),
    PointerUp(PointerSample),
    Key(KeyPress),
}

impl InputEvent {
    /// Whether this event answers an `awaitEvent` of DOM type `kind`.
    pub fn matches(&self, kind: &str) -> bool {
        match self {
            InputEvent::PointerDown(_) => matches!(kind, "pointerdown" | "mousedown"),
            InputEvent::PointerMove(_) => matches!(kind, "pointermove" | "mousemove"),
            InputEvent::PointerUp(_) => matches!(kind, "pointerup" | "mouseup" | "click"),
            InputEvent::Key(_) => matches!(kind, "keydown" | "keypress"),
        }
    }

    pub fn dom_type(&self) -> &'static str {
        match self {
            InputEvent::PointerDown(_) => "pointerdown",
            InputEvent::PointerMove(_) => "pointermove",
            InputEvent::PointerUp(_) => "pointerup",
            InputEvent::Key(_) => "keydown",
        }
    }

    /// Reads a DOM event property by name. Unknown properties are `null`.
    pub fn field(&self, name: &str) -> Value {
        if name == "type" {
            return Value::from(self.dom_type());
        }
        match self {
            InputEvent::PointerDown(sample)
            | InputEvent::PointerMove(sample)
            | InputEvent::PointerUp(sample) => match name {
                "pageX" | "clientX" | "screenX" | "offsetX" | "x" => {
                    Value::from(sample.pos.x.round() as i64)
                }
                "pageY" | "clientY" | "screenY" | "offsetY" | "y" => {
                    Value::from(sample.pos.y.round() as i64)
                }
                "pressure" => Value::from(f64::from(sample.pressure)),
                "button" => Value::from(if sample.primary { 0 } else { 2 }),
                _ => Value::Null,
            },
            InputEvent::Key(press) => match name {
                "key" => Value::from(press.dom_key()),
                "shiftKey" => Value::from(press.shift),
                "ctrlKey" => Value::from(press.control),
                "altKey" => Value::from(press.alt),
                "metaKey" => Value::from(press.meta),
                _ => Value::Null,
            },
        }
    }
}

/// Turns raw egui input into [`InputEvent`]s in board coordinates.
#[derive(Debug)]
pub struct InputHandler {
    last_pointer_pos: Option<Pos2>,
    canvas_rect: Rect,
    /// Events are dropped while a text field owns the keyboard.
    capture_keys: bool,
}

impl InputHandler {
    pub fn new(canvas_rect: Rect) -> Self {
        Self {
            last_pointer_pos: None,
            canvas_rect,
            capture_keys: true,
        }
    }

    /// Update the canvas rectangle (e.g. if window is resized)
    pub fn set_canvas_rect(&mut self, rect: Rect) {
        self.canvas_rect = rect;
    }

    pub fn set_capture_keys(&mut self, capture: bool) {
        self.capture_keys = capture;
    }

    fn to_board(&self, pos: Pos2) -> Pos2 {
        (pos - self.canvas_rect.min).to_pos2()
    }

    /// Collects this frame's events. Moves come before presses so a press
    /// always sees the latest position.
    pub fn process_input(&mut self, ctx: &Context) -> Vec<InputEvent> {
        let mut events = Vec::new();

        ctx.input(|input| {
            let pressure = input
                .raw
                .events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Touch { force, .. } => *force,
                    _ => None,
                })
                .last()
                .unwrap_or(DEFAULT_PRESSURE);
            let primary_down = input.pointer.button_down(PointerButton::Primary);

            if let Some(pos) = input.pointer.hover_pos() {
                if Some(pos) != self.last_pointer_pos {
                    events.push(InputEvent::PointerMove(PointerSample {
                        pos: self.to_board(pos),
                        pressure,
                        primary: primary_down || !input.pointer.any_down(),
                    }));
                }
                self.last_pointer_pos = Some(pos);
            }

            for button in [PointerButton::Primary, PointerButton::Secondary, PointerButton::Middle] {
                let Some(pos) = input.pointer.interact_pos().or(self.last_pointer_pos) else {
                    continue;
                };
                let sample = PointerSample {
                    pos: self.to_board(pos),
                    pressure,
                    primary: button == PointerButton::Primary,
                };
                if input.pointer.button_pressed(button) {
                    events.push(InputEvent::PointerDown(sample));
                }
                if input.pointer.button_released(button) {
                    events.push(InputEvent::PointerUp(sample));
                }
            }

            if !self.capture_keys {
                return;
            }
            for event in &input.raw.events {
                if let egui::Event::Key {
                    key,
                    pressed: true,
                    modifiers,
                    ..
                } = event
                {
                    events.push(InputEvent::Key(KeyPress::from_egui(*key, *modifiers)));
                }
            }
        });

        events
    }
}

#[cfg(test)]
mod tests {
    use egui::pos2;

    use super::*;

    #[test]
    fn chords_parse_modifiers_and_key() {
        let press = KeyPress::parse("Control+Shift+Z").unwrap();
        assert!(press.control && press.shift && !press.meta);
        assert_eq!(press.key, "z");
        assert_eq!(KeyPress::parse("Shift++").unwrap().key, "+");
        assert_eq!(KeyPress::parse("[").unwrap(), KeyPress::new("["));
        assert!(KeyPress::parse("Hyper+x").is_none());
        assert!(KeyPress::parse("").is_none());
    }

    #[test]
    fn egui_keys_match_chords() {
        let press = KeyPress::from_egui(Key::R, Modifiers::CTRL);
        assert_eq!(press, KeyPress::parse("Control+r").unwrap());
        let press = KeyPress::from_egui(Key::OpenBracket, Modifiers::NONE);
        assert_eq!(press, KeyPress::parse("[").unwrap());
    }

    #[test]
    fn operator_arguments() {
        assert_eq!(KeyPress::parse("a").unwrap().argument(), Some('a'));
        assert_eq!(KeyPress::parse("Shift+a").unwrap().argument(), Some('A'));
        assert_eq!(KeyPress::parse("Space").unwrap().argument(), Some(' '));
        assert_eq!(KeyPress::parse("3").unwrap().argument(), Some('3'));
        assert_eq!(KeyPress::parse("Enter").unwrap().argument(), None);
        assert_eq!(KeyPress::parse("Control+a").unwrap().argument(), None);
    }

    #[test]
    fn dom_fields() {
        let down = InputEvent::PointerDown(PointerSample::at(pos2(42.2, 16.8)));
        assert!(down.matches("pointerdown") && down.matches("mousedown"));
        assert!(!down.matches("keydown"));
        assert_eq!(down.field("pageX"), Value::from(42));
        assert_eq!(down.field("clientY"), Value::from(17));
        assert_eq!(down.field("nonsense"), Value::Null);

        let key = InputEvent::Key(KeyPress::new("Space"));
        assert_eq!(key.field("key"), Value::from(" "));
        assert_eq!(key.field("type"), Value::from("keydown"));
    }
}
