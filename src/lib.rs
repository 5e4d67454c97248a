#![warn(clippy::all, rust_2018_idioms)]

pub mod app;
pub mod brush;
pub mod clipboard;
pub mod color;
pub mod config;
pub mod error;
pub mod history;
pub mod input;
pub mod keymap;
pub mod line;
pub mod pen;
pub mod primitive;
pub mod protocol;
pub mod selection;
pub mod sequence;
pub mod server;
pub mod shape;
pub mod snippet;
pub mod state;
pub mod surface;
pub mod texture_manager;
pub mod typeset;
pub mod workspace;

pub use app::BoardApp;
pub use history::History;
pub use input::{InputEvent, KeyPress, PointerSample};
pub use pen::{Pen, PenAction, PenContext, PenMode};
pub use protocol::Command;
pub use state::AppState;
pub use surface::{LayerId, Layers, Surface};
pub use workspace::{RecordedReplies, ReplySink, Workspace};
