use std::collections::VecDeque;

use crate::surface::{Surface, SurfaceState};

/// Immutable copy of a surface taken at a commit boundary.
#[derive(Debug, Clone)]
pub struct Snapshot {
    state: SurfaceState,
}

impl Snapshot {
    fn take(surface: &Surface) -> Self {
        Self {
            state: surface.state(),
        }
    }

    pub fn state(&self) -> &SurfaceState {
        &self.state
    }
}

/// Snapshot-based undo/redo for one surface.
///
/// The cursor always points at a stored snapshot. Taking a snapshot while
/// the cursor is not at the end discards the redo tail; going over capacity
/// evicts the oldest snapshot. While frozen, snapshots and travel are
/// ignored.
#[derive(Debug)]
pub struct History {
    snapshots: VecDeque<Snapshot>,
    cursor: usize,
    capacity: usize,
    frozen: bool,
}

impl History {
    /// Creates a history whose only snapshot is the current content of
    /// `surface`.
    pub fn new(capacity: usize, surface: &Surface) -> Self {
        let mut history = Self {
            snapshots: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
            frozen: false,
        };
        history.reset(surface);
        history
    }

    /// Drops every snapshot and starts over from the current content.
    pub fn reset(&mut self, surface: &Surface) {
        self.snapshots.clear();
        self.snapshots.push_back(Snapshot::take(surface));
        self.cursor = 0;
        self.frozen = false;
    }

    pub fn take_snapshot(&mut self, surface: &Surface) {
        if self.frozen {
            return;
        }
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push_back(Snapshot::take(surface));
        if self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
        self.cursor = self.snapshots.len() - 1;
        log::debug!(
            "Snapshot {} of {} ({} max)",
            self.cursor,
            self.snapshots.len(),
            self.capacity
        );
    }

    /// Moves the cursor by `delta` and restores that snapshot onto
    /// `surface`. A target outside the stored range is ignored; `travel(0)`
    /// redraws the current snapshot, discarding any uncommitted preview.
    ///
    /// Returns whether the surface was restored.
    pub fn travel(&mut self, delta: isize, surface: &mut Surface) -> bool {
        if self.frozen {
            return false;
        }
        let Some(target) = self.cursor.checked_add_signed(delta) else {
            return false;
        };
        let Some(snapshot) = self.snapshots.get(target) else {
            return false;
        };
        surface.restore(&snapshot.state);
        self.cursor = target;
        true
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Unfreezes and redraws the current snapshot.
    pub fn thaw(&mut self, surface: &mut Surface) {
        self.frozen = false;
        self.travel(0, surface);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.snapshots.get(self.cursor)
    }

    /// Returns true if there is an earlier snapshot to go back to
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    /// Returns true if there is a later snapshot to go forward to
    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use egui::{Color32, pos2};

    use super::*;
    use crate::color::Paint;
    use crate::surface::{LayerId, SvgRenderer, pixel_at};

    fn surface() -> Surface {
        Surface::new(LayerId::Pen, 16, 16, Arc::new(SvgRenderer::default()))
    }

    fn dot(surface: &mut Surface, x: f32) {
        surface.draw_circle(pos2(x, 8.0), 1.5, Paint::solid(Color32::WHITE), None);
    }

    #[test]
    fn undo_and_redo_restore_content() {
        let mut s = surface();
        let mut history = History::new(10, &s);
        dot(&mut s, 4.0);
        history.take_snapshot(&s);

        assert!(history.travel(-1, &mut s));
        assert!(s.is_blank());
        assert!(history.travel(1, &mut s));
        assert_eq!(pixel_at(&s, 4, 8).a(), 255);
    }

    #[test]
    fn out_of_range_travel_is_ignored() {
        let mut s = surface();
        let mut history = History::new(10, &s);
        dot(&mut s, 4.0);
        assert!(!history.travel(-1, &mut s));
        assert!(!history.travel(1, &mut s));
        assert_eq!(history.cursor(), 0);
        assert!(!s.is_blank(), "a rejected travel leaves the surface alone");
    }

    #[test]
    fn travel_zero_discards_preview() {
        let mut s = surface();
        let mut history = History::new(10, &s);
        s.canvas_mut().fill_circle(pos2(8.0, 8.0), 3.0, Color32::RED);
        assert!(history.travel(0, &mut s));
        assert!(s.is_blank());
    }

    #[test]
    fn frozen_history_ignores_everything_until_thaw() {
        let mut s = surface();
        let mut history = History::new(10, &s);
        history.freeze();
        dot(&mut s, 4.0);
        history.take_snapshot(&s);
        assert_eq!(history.len(), 1);
        assert!(!history.travel(0, &mut s));
        assert!(!s.is_blank());

        history.thaw(&mut s);
        assert!(s.is_blank());
    }

    #[test]
    fn reset_keeps_single_snapshot() {
        let mut s = surface();
        let mut history = History::new(10, &s);
        for x in [2.0, 6.0, 10.0] {
            dot(&mut s, x);
            history.take_snapshot(&s);
        }
        history.reset(&s);
        assert_eq!((history.len(), history.cursor()), (1, 0));
        assert!(!history.can_undo() && !history.can_redo());
    }
}
