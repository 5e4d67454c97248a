//! Flags shared by the workspace, the pens and the UI shell.
//!
//! Each field documents who writes it; everyone else only reads.

use egui::{Pos2, Rect};

/// Where a confirmed capture goes and whether the controller waits for it.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub save_path: String,
    pub awaits_reply: bool,
    /// Filled in once the region has been dragged out.
    pub region: Option<Rect>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    /// Written by `setLightMode`, `setDarkMode` and `toggleBackground`.
    pub light_mode: bool,
    /// Written by the workspace while an `awaitEvent` subscription is
    /// pending. Pens ignore pointer input meanwhile.
    pub awaiting_event: bool,
    /// Written by `setBackgroundStyle`; read by the UI shell.
    pub background_style: Option<String>,
    /// Written by the zoom keys; read by the UI shell.
    pub zoom: f32,
    /// Set by the workspace when a resize was requested with a pending
    /// reply; cleared once the reply is sent.
    pub resize_reply_pending: bool,
    /// Set on resize while a sequence plays; cleared by the sequence once
    /// it has redrawn its background.
    pub rerender_background: bool,
    /// Written by `captureArea` and the capturing pen.
    pub capture: Option<CaptureRequest>,
    /// Set by the `typeset` action, cleared by the UI shell once the prompt
    /// is submitted or dismissed.
    pub typeset_prompt: bool,
    /// Transient status line (`ROTATING`, pending operator, ...). Written by
    /// pens and the key dispatcher.
    pub prompt: String,
    /// Last pointer position seen by the workspace.
    pub pointer: Pos2,
    /// Set whenever the window should be resized to this size.
    pub requested_size: Option<(u32, u32)>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            light_mode: false,
            awaiting_event: false,
            background_style: None,
            zoom: 1.0,
            resize_reply_pending: false,
            rerender_background: false,
            capture: None,
            typeset_prompt: false,
            prompt: String::new(),
            pointer: Pos2::ZERO,
            requested_size: None,
        }
    }
}

impl AppState {
    /// Shows `message` unless something else is already displayed.
    pub fn set_prompt(&mut self, message: &str) {
        if self.prompt.is_empty() {
            self.prompt = message.to_owned();
        }
    }

    pub fn clear_prompt(&mut self) {
        self.prompt.clear();
    }
}
