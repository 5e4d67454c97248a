//! Rectangular marquee selection lifted off a surface into its own overlay.

use std::sync::Arc;

use egui::{Color32, Pos2, Rect, Vec2, pos2, vec2};
use tiny_skia::Pixmap;

use crate::clipboard::{Buffer, Clipboard, Registers};
use crate::surface::{StrokeStyle, Surface};

/// Corners and size of a selection, as reported to capture requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionBounds {
    pub top_left: Pos2,
    pub top_right: Pos2,
    pub bottom_left: Pos2,
    pub bottom_right: Pos2,
    pub width: f32,
    pub height: f32,
}

impl SelectionBounds {
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            top_left: rect.left_top(),
            top_right: rect.right_top(),
            bottom_left: rect.left_bottom(),
            bottom_right: rect.right_bottom(),
            width: rect.width(),
            height: rect.height(),
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_min_max(self.top_left, self.bottom_right)
    }
}

/// Lifecycle: new → start → change* → end → (move | rotate)* → apply, or
/// delete/cancel at any point after start.
#[derive(Debug)]
pub struct Selection {
    start: Option<Pos2>,
    end: Option<Pos2>,
    copy: bool,
    completed: bool,
    /// Source pixels were cleared and now live only in the overlay.
    lifted: bool,
    /// Pointer offset inside the overlay while it is dragged.
    grab: Vec2,
    /// Offset between the pointer angle and the overlay angle during a
    /// rotation session.
    alpha: Option<f32>,
}

impl Selection {
    /// `copy` leaves the source pixels in place instead of lifting them.
    pub fn new(copy: bool) -> Self {
        Self {
            start: None,
            end: None,
            copy,
            completed: false,
            lifted: false,
            grab: Vec2::ZERO,
            alpha: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_copy(&self) -> bool {
        self.copy
    }

    pub fn has_lifted(&self) -> bool {
        self.lifted
    }

    pub fn start(&mut self, at: Pos2, overlay: &mut Surface) {
        self.start = Some(at);
        self.end = None;
        self.completed = false;
        overlay.resize(0, 0);
        overlay.move_to(at);
        overlay.set_rotation(0.0);
        overlay.show();
    }

    /// Grows the marquee towards `to`.
    pub fn change(&mut self, to: Pos2, overlay: &mut Surface) {
        let Some(start) = self.start else { return };
        let rect = Rect::from_two_pos(start, to);
        overlay.resize(rect.width().round() as u32, rect.height().round() as u32);
        overlay.move_to(rect.min);
        let border = Rect::from_min_size(pos2(0.5, 0.5), rect.size() - vec2(1.0, 1.0));
        overlay.canvas_mut().stroke_rect(
            border,
            &StrokeStyle {
                color: Color32::from_gray(160),
                width: 1.0,
                dashed: true,
            },
        );
    }

    /// Finishes the marquee at `to`, lifting (or copying) the pixels of
    /// `source` into the overlay. A marquee without area cancels the
    /// selection and returns false.
    pub fn end(&mut self, to: Pos2, source: &mut Surface, overlay: &mut Surface) -> bool {
        let Some(start) = self.start else { return false };
        let rect = whole_pixels(Rect::from_two_pos(start, to));
        if rect.width() < 1.0 || rect.height() < 1.0 {
            self.cancel(overlay);
            self.start = None;
            return false;
        }
        let Some(pixels) = source.copy_region(rect) else {
            self.cancel(overlay);
            self.start = None;
            return false;
        };
        overlay.load_pixmap(&pixels);
        overlay.move_to(rect.min);
        overlay.show();
        if !self.copy {
            source.clear_rect(rect);
        }
        self.end = Some(to);
        self.grab = to - rect.min;
        self.completed = true;
        self.lifted = !self.copy;
        true
    }

    /// Turns an existing buffer into a completed selection with its
    /// top-left corner at `at`, ready to be moved and applied.
    pub fn capture(&mut self, buffer: &Pixmap, at: Pos2, overlay: &mut Surface) {
        overlay.load_pixmap(buffer);
        overlay.move_to(at);
        overlay.set_rotation(0.0);
        overlay.show();
        self.start = Some(at + vec2(buffer.width() as f32, buffer.height() as f32));
        self.end = Some(at);
        self.grab = Vec2::ZERO;
        self.completed = true;
        self.lifted = false;
    }

    /// Drags the captured overlay so the grab point follows `to`.
    pub fn move_to(&mut self, to: Pos2, overlay: &mut Surface) {
        if self.completed {
            overlay.move_to(to - self.grab);
        }
    }

    /// Starts a rotation session; the overlay keeps its current angle.
    pub fn begin_rotation(&mut self) {
        self.alpha = None;
    }

    /// Rotates the overlay so that it follows the pointer's angle around
    /// the overlay center.
    pub fn rotate_towards(&mut self, pointer: Pos2, overlay: &mut Surface) {
        let theta = pointer_angle(overlay.rect().center(), pointer);
        let current = overlay.rotation();
        let alpha = *self.alpha.get_or_insert(current - theta);
        overlay.set_rotation(theta + alpha);
    }

    /// Composites the overlay onto `target` at its current place and angle,
    /// then clears and hides the overlay.
    pub fn apply(&mut self, overlay: &mut Surface, target: &mut Surface) -> bool {
        if !self.completed {
            return false;
        }
        let angle = overlay.rotation();
        if angle.abs() > f32::EPSILON {
            overlay.rotate_redraw(angle);
        }
        if let Some(pixels) = overlay.canvas().pixmap().cloned() {
            target.draw_pixmap(&pixels, overlay.position());
        }
        self.finish(overlay);
        true
    }

    /// Registers the overlay content under `key` (if any) and discards it.
    pub fn delete(
        &mut self,
        key: Option<char>,
        clipboard: &mut Clipboard,
        registers: &mut Registers,
        overlay: &mut Surface,
    ) {
        if let (Some(key), Some(buffer)) = (key, self.buffer(overlay)) {
            clipboard.register(key, buffer, registers);
        }
        self.finish(overlay);
    }

    /// Discards the overlay without touching the source.
    pub fn cancel(&mut self, overlay: &mut Surface) {
        self.finish(overlay);
    }

    fn finish(&mut self, overlay: &mut Surface) {
        overlay.clear();
        overlay.set_rotation(0.0);
        overlay.hide();
        self.completed = false;
        self.lifted = false;
    }

    /// The captured pixels, unrotated.
    pub fn buffer(&self, overlay: &Surface) -> Option<Buffer> {
        if !self.completed {
            return None;
        }
        overlay.canvas().pixmap().cloned().map(Arc::new)
    }

    pub fn bounds(&self) -> Option<SelectionBounds> {
        let (start, end) = (self.start?, self.end?);
        Some(SelectionBounds::from_rect(Rect::from_two_pos(start, end)))
    }
}

fn whole_pixels(rect: Rect) -> Rect {
    Rect::from_min_max(
        pos2(rect.min.x.round(), rect.min.y.round()),
        pos2(rect.max.x.round(), rect.max.y.round()),
    )
}

/// Counter-clockwise angle of `pointer` around `center`, in screen space.
pub fn pointer_angle(center: Pos2, pointer: Pos2) -> f32 {
    (center.y - pointer.y).atan2(pointer.x - center.x)
}
