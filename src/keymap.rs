//! Declarative key bindings.
//!
//! A table entry maps a group of space-separated chords (`"u Meta+z"`) to an
//! action name. Chords written with a leading `~` bind operators, which take
//! the next key press as their argument.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::input::KeyPress;
use crate::pen::PenAction;

/// Board-wide actions that do not depend on the current pen's tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneralAction {
    StopSequence,
    ClearCanvas,
    ToggleBackground,
    TogglePen,
    ZoomIn,
    ZoomOut,
    ZoomReset,
    ConfirmCapture,
    ExportSvg,
    ClearAll,
    Cancel,
}

impl GeneralAction {
    pub const ALL: [GeneralAction; 11] = [
        GeneralAction::StopSequence,
        GeneralAction::ClearCanvas,
        GeneralAction::ToggleBackground,
        GeneralAction::TogglePen,
        GeneralAction::ZoomIn,
        GeneralAction::ZoomOut,
        GeneralAction::ZoomReset,
        GeneralAction::ConfirmCapture,
        GeneralAction::ExportSvg,
        GeneralAction::ClearAll,
        GeneralAction::Cancel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GeneralAction::StopSequence => "stop-sequence",
            GeneralAction::ClearCanvas => "clear-canvas",
            GeneralAction::ToggleBackground => "toggle-background",
            GeneralAction::TogglePen => "toggle-pen",
            GeneralAction::ZoomIn => "zoom-in",
            GeneralAction::ZoomOut => "zoom-out",
            GeneralAction::ZoomReset => "zoom-reset",
            GeneralAction::ConfirmCapture => "confirm-capture",
            GeneralAction::ExportSvg => "export-svg",
            GeneralAction::ClearAll => "clear-all",
            GeneralAction::Cancel => "cancel",
        }
    }
}

/// Actions that wait for one more key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    RecordMacro,
    PlayMacro,
    Paste,
    PasteGlobal,
    YankTo,
    DeleteTo,
    SwitchPen,
    CreateShape,
    ToggleStyle,
}

impl Operator {
    pub const ALL: [Operator; 9] = [
        Operator::RecordMacro,
        Operator::PlayMacro,
        Operator::Paste,
        Operator::PasteGlobal,
        Operator::YankTo,
        Operator::DeleteTo,
        Operator::SwitchPen,
        Operator::CreateShape,
        Operator::ToggleStyle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operator::RecordMacro => "record-macro",
            Operator::PlayMacro => "play-macro",
            Operator::Paste => "paste",
            Operator::PasteGlobal => "paste-global",
            Operator::YankTo => "yank-to",
            Operator::DeleteTo => "delete-to",
            Operator::SwitchPen => "switch-pen",
            Operator::CreateShape => "create-shape",
            Operator::ToggleStyle => "toggle-style",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    General(GeneralAction),
    Pen(PenAction),
    Operator(Operator),
}

impl Binding {
    pub fn name(self) -> &'static str {
        match self {
            Binding::General(action) => action.name(),
            Binding::Pen(action) => action.name(),
            Binding::Operator(op) => op.name(),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Binding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(action) = GeneralAction::ALL.into_iter().find(|a| a.name() == s) {
            return Ok(Binding::General(action));
        }
        if let Some(op) = Operator::ALL.into_iter().find(|o| o.name() == s) {
            return Ok(Binding::Operator(op));
        }
        s.parse::<PenAction>()
            .map(Binding::Pen)
            .map_err(ConfigError::UnknownAction)
    }
}

/// Built-in bindings, in the notation settings files use.
pub const DEFAULT_BINDINGS: &[(&str, &str)] = &[
    ("Control+c", "stop-sequence"),
    ("Control+u", "clear-canvas"),
    ("Control+b", "toggle-background"),
    ("Control+p", "toggle-pen"),
    ("=", "zoom-in"),
    ("-", "zoom-out"),
    ("0", "zoom-reset"),
    ("Enter", "confirm-capture"),
    ("Control+s", "export-svg"),
    ("Shift+c", "clear-all"),
    ("Escape Control+[", "cancel"),
    ("~q", "record-macro"),
    ("~Space", "play-macro"),
    ("~p", "paste"),
    ("~Shift+p", "paste-global"),
    ("~w", "yank-to"),
    ("~x", "delete-to"),
    ("~'", "switch-pen"),
    ("~o", "create-shape"),
    ("~i", "toggle-style"),
    ("e", "toggle-eraser"),
    ("c", "clear"),
    (".", "next-color"),
    (",", "previous-color"),
    ("]", "increase-brush-size"),
    ("[", "decrease-brush-size"),
    ("Shift+.", "increase-sensitivity"),
    ("Shift+,", "decrease-sensitivity"),
    ("u Meta+z", "undo"),
    ("Control+r Meta+Shift+z", "redo"),
    ("s", "select"),
    ("Shift+s", "continuous-selection"),
    ("y", "yank"),
    ("Shift+y", "yank-global"),
    ("d", "delete"),
    ("Shift+d", "delete-global"),
    ("l", "draw-line"),
    ("Shift+l", "continuous-draw-line"),
    ("r", "rotate"),
    ("t", "typeset"),
];

#[derive(Debug, Clone, Default)]
pub struct Keymap {
    bindings: HashMap<KeyPress, Binding>,
}

impl Keymap {
    /// The built-in table with `overrides` (chord group to action name)
    /// applied on top.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut keymap = Keymap::default();
        for (chords, name) in DEFAULT_BINDINGS {
            keymap.bind(chords, name)?;
        }
        for (chords, name) in overrides {
            keymap.bind(chords, name)?;
        }
        Ok(keymap)
    }

    /// Binds every chord of a space-separated group to `name`.
    pub fn bind(&mut self, chords: &str, name: &str) -> Result<(), ConfigError> {
        let binding: Binding = name.parse()?;
        for chord in chords.split(' ').filter(|c| !c.is_empty()) {
            let press = KeyPress::parse(chord.strip_prefix('~').unwrap_or(chord))
                .ok_or_else(|| ConfigError::InvalidChord(chord.to_owned()))?;
            self.bindings.insert(press, binding);
        }
        Ok(())
    }

    pub fn lookup(&self, press: &KeyPress) -> Option<Binding> {
        self.bindings.get(press).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// What a key press amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// A bound action. Operators still need [`KeyDispatcher::arm`].
    Bound(Binding),
    /// The argument for an armed operator.
    Argument(Operator, char),
    /// Unbound, or consumed by an operator that got no usable argument.
    Unhandled,
}

/// Resolves key presses against a keymap, tracking an armed operator.
#[derive(Debug, Clone)]
pub struct KeyDispatcher {
    keymap: Keymap,
    pending: Option<Operator>,
}

impl KeyDispatcher {
    pub fn new(keymap: Keymap) -> Self {
        Self {
            keymap,
            pending: None,
        }
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn pending(&self) -> Option<Operator> {
        self.pending
    }

    /// Makes the next key press the argument of `op`.
    pub fn arm(&mut self, op: Operator) {
        self.pending = Some(op);
    }

    pub fn disarm(&mut self) {
        self.pending = None;
    }

    pub fn handle(&mut self, press: &KeyPress) -> KeyOutcome {
        if let Some(op) = self.pending.take() {
            return match press.argument() {
                Some(arg) => KeyOutcome::Argument(op, arg),
                None => KeyOutcome::Unhandled,
            };
        }
        match self.keymap.lookup(press) {
            Some(binding) => KeyOutcome::Bound(binding),
            None => KeyOutcome::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(chord: &str) -> KeyPress {
        KeyPress::parse(chord).unwrap()
    }

    #[test]
    fn default_table_is_valid() {
        let keymap = Keymap::with_overrides(&BTreeMap::new()).unwrap();
        assert_eq!(
            keymap.lookup(&press("Meta+Shift+z")),
            Some(Binding::Pen(PenAction::Redo))
        );
        assert_eq!(
            keymap.lookup(&press("Control+[")),
            Some(Binding::General(GeneralAction::Cancel))
        );
        assert_eq!(
            keymap.lookup(&press("'")),
            Some(Binding::Operator(Operator::SwitchPen))
        );
        assert_eq!(keymap.lookup(&press("z")), None);
    }

    #[test]
    fn overrides_replace_and_validate() {
        let mut overrides = BTreeMap::new();
        overrides.insert("Control+z".to_owned(), "undo".to_owned());
        let keymap = Keymap::with_overrides(&overrides).unwrap();
        assert_eq!(
            keymap.lookup(&press("Control+z")),
            Some(Binding::Pen(PenAction::Undo))
        );

        overrides.insert("x".to_owned(), "levitate".to_owned());
        assert!(matches!(
            Keymap::with_overrides(&overrides),
            Err(ConfigError::UnknownAction(name)) if name == "levitate"
        ));

        let mut bad = BTreeMap::new();
        bad.insert("Super+x".to_owned(), "undo".to_owned());
        assert!(matches!(
            Keymap::with_overrides(&bad),
            Err(ConfigError::InvalidChord(_))
        ));
    }

    #[test]
    fn operators_take_the_next_key() {
        let mut keys = KeyDispatcher::new(Keymap::with_overrides(&BTreeMap::new()).unwrap());
        let outcome = keys.handle(&press("p"));
        assert_eq!(outcome, KeyOutcome::Bound(Binding::Operator(Operator::Paste)));
        keys.arm(Operator::Paste);

        // A key that is bound on its own is still just an argument.
        assert_eq!(keys.handle(&press("3")), KeyOutcome::Argument(Operator::Paste, '3'));
        assert_eq!(keys.pending(), None);

        keys.arm(Operator::YankTo);
        assert_eq!(keys.handle(&press("Enter")), KeyOutcome::Unhandled);
        assert_eq!(
            keys.handle(&press("Enter")),
            KeyOutcome::Bound(Binding::General(GeneralAction::ConfirmCapture))
        );
    }
}
