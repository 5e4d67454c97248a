use std::sync::Arc;

use egui::{Color32, Rect, pos2, vec2};
use maxwell_board::color::Paint;
use maxwell_board::config::Settings;
use maxwell_board::selection::Selection;
use maxwell_board::shape::{Shape, ShapeKind, ShapeStyle};
use maxwell_board::surface::{LayerId, Surface, SvgRenderer, pixel_at};
use maxwell_board::{InputEvent, KeyPress, PenMode, PointerSample, RecordedReplies, Workspace};
use serde_json::json;

fn workspace() -> (Workspace, RecordedReplies) {
    let replies = RecordedReplies::new();
    let ws = Workspace::new(
        Settings::default(),
        200,
        160,
        Arc::new(SvgRenderer::default()),
        Box::new(replies.clone()),
    );
    (ws, replies)
}

fn press(ws: &mut Workspace, chord: &str) {
    ws.handle_input(InputEvent::Key(KeyPress::parse(chord).unwrap()));
}

fn down(ws: &mut Workspace, x: f32, y: f32) {
    ws.handle_input(InputEvent::PointerDown(PointerSample::at(pos2(x, y))));
}

fn moved(ws: &mut Workspace, x: f32, y: f32) {
    ws.handle_input(InputEvent::PointerMove(PointerSample::at(pos2(x, y))));
}

fn up(ws: &mut Workspace, x: f32, y: f32) {
    ws.handle_input(InputEvent::PointerUp(PointerSample::at(pos2(x, y))));
}

fn tap(ws: &mut Workspace, x: f32, y: f32) {
    down(ws, x, y);
    up(ws, x, y);
}

fn overlay(layer: LayerId) -> Surface {
    Surface::new(layer, 0, 0, Arc::new(SvgRenderer::default()))
}

#[test]
fn test_tap_paints_a_disc() {
    let (mut ws, _) = workspace();
    press(&mut ws, "Control+p");
    assert!(ws.pen().is_enabled());
    assert_eq!(ws.pen().history().len(), 1);

    tap(&mut ws, 80.0, 60.0);
    assert_eq!(ws.pen().history().len(), 2);
    assert_ne!(pixel_at(&ws.layers().pen, 80, 60).a(), 0);
    assert_eq!(pixel_at(&ws.layers().pen, 120, 60).a(), 0);
}

#[test]
fn test_rectangle_finalizes_after_four_presses() {
    let (mut ws, _) = workspace();
    press(&mut ws, "Control+p");
    moved(&mut ws, 100.0, 80.0);
    press(&mut ws, "o");
    press(&mut ws, "r");
    assert_eq!(ws.pen().mode(), PenMode::Shape);
    assert_eq!(ws.pen().shape().map(Shape::phase), Some(4));

    for expected in [3, 2, 1] {
        down(&mut ws, 100.0, 80.0);
        up(&mut ws, 100.0, 80.0);
        assert_eq!(ws.pen().shape().map(Shape::phase), Some(expected));
        assert!(ws.layers().pen.is_blank());
    }

    down(&mut ws, 100.0, 80.0);
    up(&mut ws, 100.0, 80.0);
    assert!(ws.pen().shape().is_none());
    assert_eq!(ws.pen().mode(), PenMode::None);
    assert!(!ws.layers().pen.is_blank());
    assert_eq!(ws.pen().history().len(), 2, "exactly one snapshot for the shape");
    assert!(ws.layers().shape.is_blank());
}

#[test]
fn test_switch_phase_is_bounded() {
    let style = ShapeStyle {
        color: Color32::WHITE,
        stroke_width: 2.0,
        fill: false,
    };
    for kind in [
        ShapeKind::Rectangle,
        ShapeKind::Circle,
        ShapeKind::Arc,
        ShapeKind::RightTriangle,
    ] {
        let mut shape = Shape::new(kind, style);
        let mut over = overlay(LayerId::Shape);
        let mut owner = Surface::new(LayerId::Pen, 200, 200, Arc::new(SvgRenderer::default()));
        shape.place(pos2(100.0, 100.0), &mut over);

        let budget = kind.default_lengths().len() + 2;
        let mut calls = 0;
        while shape.switch_phase(&mut over, &mut owner) != 0 {
            calls += 1;
            assert!(calls < budget, "{:?} did not finalize", kind);
        }
        assert!(!owner.is_blank(), "{:?} was not drawn", kind);
        assert_eq!(shape.switch_phase(&mut over, &mut owner), 0);
    }
}

#[test]
fn test_lift_then_apply_in_place_is_identity() {
    let renderer = Arc::new(SvgRenderer::default());
    let mut target = Surface::new(LayerId::Pen, 64, 64, Arc::clone(&renderer));
    target.draw_rect(
        Rect::from_min_size(pos2(10.0, 12.0), vec2(20.0, 8.0)),
        Paint::solid(Color32::from_rgb(200, 40, 40)),
        None,
    );
    target.draw_circle(pos2(40.0, 40.0), 6.5, Paint::solid(Color32::BLUE), None);
    let before = target.canvas().pixmap().cloned().unwrap();

    let mut over = overlay(LayerId::Selection);
    let mut selection = Selection::new(false);
    selection.start(pos2(8.0, 8.0), &mut over);
    assert!(selection.end(pos2(50.0, 50.0), &mut target, &mut over));
    assert_eq!(pixel_at(&target, 40, 40).a(), 0);

    assert!(selection.apply(&mut over, &mut target));
    assert_eq!(target.canvas().pixmap().cloned().unwrap(), before);
    assert!(!over.is_visible());
}

#[test]
fn test_delete_selection_then_undo() {
    let (mut ws, _) = workspace();
    press(&mut ws, "Control+p");
    tap(&mut ws, 50.0, 50.0);

    press(&mut ws, "s");
    down(&mut ws, 30.0, 30.0);
    moved(&mut ws, 70.0, 70.0);
    up(&mut ws, 70.0, 70.0);
    assert!(ws.pen().has_completed_selection());
    assert_eq!(pixel_at(&ws.layers().pen, 50, 50).a(), 0, "selection lifts the pixels");

    press(&mut ws, "d");
    assert!(!ws.pen().has_completed_selection());
    assert_eq!(pixel_at(&ws.layers().pen, 50, 50).a(), 0);
    assert_eq!(ws.pen().history().cursor(), 2);
    assert!(ws.pen().registers().get('d').is_some());

    press(&mut ws, "u");
    assert_ne!(pixel_at(&ws.layers().pen, 50, 50).a(), 0);
    press(&mut ws, "Control+r");
    assert_eq!(pixel_at(&ws.layers().pen, 50, 50).a(), 0);
}

#[test]
fn test_yank_goes_to_the_shared_ring() {
    let (mut ws, _) = workspace();
    press(&mut ws, "Control+p");
    tap(&mut ws, 50.0, 50.0);

    press(&mut ws, "y");
    down(&mut ws, 40.0, 40.0);
    moved(&mut ws, 60.0, 60.0);
    up(&mut ws, 60.0, 60.0);
    assert_ne!(pixel_at(&ws.layers().pen, 50, 50).a(), 0, "yank copies");
    press(&mut ws, "y");
    assert_eq!(ws.clipboard().len(), 1);

    moved(&mut ws, 150.0, 120.0);
    press(&mut ws, "p");
    press(&mut ws, "p");
    assert!(ws.pen().has_completed_selection());
    up(&mut ws, 150.0, 120.0);
    assert!(!ws.pen().has_completed_selection());
    assert_ne!(pixel_at(&ws.layers().pen, 160, 130).a(), 0);
}

#[test]
fn test_await_event_consumes_the_pointer_event() {
    let (mut ws, replies) = workspace();
    press(&mut ws, "Control+p");
    ws.handle_message(
        r#"{"command":"awaitEvent","args":{"type":"pointerdown","dataKeys":["pageX","pageY"]}}"#,
    );
    tap(&mut ws, 40.0, 30.0);
    assert_eq!(replies.take(), vec![vec![json!(40), json!(30)]]);
    assert!(ws.layers().pen.is_blank(), "the awaited press does not draw");

    tap(&mut ws, 40.0, 30.0);
    assert!(replies.is_empty());
    assert!(!ws.layers().pen.is_blank());
}
