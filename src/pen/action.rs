use std::fmt;
use std::str::FromStr;

/// Discrete commands a pen understands, named the way keymap entries spell
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PenAction {
    ToggleEraser,
    Clear,
    NextColor,
    PreviousColor,
    IncreaseBrushSize,
    DecreaseBrushSize,
    IncreaseSensitivity,
    DecreaseSensitivity,
    Undo,
    Redo,
    Select,
    ContinuousSelection,
    Yank,
    /// Yank into the global register set.
    YankGlobal,
    Delete,
    /// Delete into the global register `D`.
    DeleteGlobal,
    DrawLine,
    ContinuousDrawLine,
    Rotate,
    Typeset,
}

impl PenAction {
    pub const ALL: [PenAction; 20] = [
        PenAction::ToggleEraser,
        PenAction::Clear,
        PenAction::NextColor,
        PenAction::PreviousColor,
        PenAction::IncreaseBrushSize,
        PenAction::DecreaseBrushSize,
        PenAction::IncreaseSensitivity,
        PenAction::DecreaseSensitivity,
        PenAction::Undo,
        PenAction::Redo,
        PenAction::Select,
        PenAction::ContinuousSelection,
        PenAction::Yank,
        PenAction::YankGlobal,
        PenAction::Delete,
        PenAction::DeleteGlobal,
        PenAction::DrawLine,
        PenAction::ContinuousDrawLine,
        PenAction::Rotate,
        PenAction::Typeset,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PenAction::ToggleEraser => "toggle-eraser",
            PenAction::Clear => "clear",
            PenAction::NextColor => "next-color",
            PenAction::PreviousColor => "previous-color",
            PenAction::IncreaseBrushSize => "increase-brush-size",
            PenAction::DecreaseBrushSize => "decrease-brush-size",
            PenAction::IncreaseSensitivity => "increase-sensitivity",
            PenAction::DecreaseSensitivity => "decrease-sensitivity",
            PenAction::Undo => "undo",
            PenAction::Redo => "redo",
            PenAction::Select => "select",
            PenAction::ContinuousSelection => "continuous-selection",
            PenAction::Yank => "yank",
            PenAction::YankGlobal => "yank-global",
            PenAction::Delete => "delete",
            PenAction::DeleteGlobal => "delete-global",
            PenAction::DrawLine => "draw-line",
            PenAction::ContinuousDrawLine => "continuous-draw-line",
            PenAction::Rotate => "rotate",
            PenAction::Typeset => "typeset",
        }
    }
}

impl fmt::Display for PenAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PenAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PenAction::ALL
            .into_iter()
            .find(|action| action.name() == s)
            .ok_or_else(|| s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for action in PenAction::ALL {
            assert_eq!(action.name().parse::<PenAction>(), Ok(action));
        }
        assert!("fly".parse::<PenAction>().is_err());
    }
}
