use std::sync::Arc;
use std::time::{Duration, Instant};

use egui::Color32;
use maxwell_board::config::Settings;
use maxwell_board::protocol::{LineFramer, encode_reply};
use maxwell_board::surface::{SvgRenderer, pixel_at};
use maxwell_board::{Command, RecordedReplies, Workspace};
use serde_json::{Value, json};

fn workspace() -> (Workspace, RecordedReplies) {
    let replies = RecordedReplies::new();
    let ws = Workspace::new(
        Settings::default(),
        160,
        120,
        Arc::new(SvgRenderer::default()),
        Box::new(replies.clone()),
    );
    (ws, replies)
}

/// Feeds `chunks` through a framer into the workspace, as the listener does.
fn feed(ws: &mut Workspace, chunks: &[&str]) {
    let mut framer = LineFramer::new();
    for chunk in chunks {
        for line in framer.push(chunk) {
            ws.handle_message(&line);
        }
    }
    if let Some(rest) = framer.finish() {
        ws.handle_message(&rest);
    }
}

#[test]
fn test_lines_split_across_chunks() {
    let (mut ws, replies) = workspace();
    feed(
        &mut ws,
        &[
            "{\"command\":\"setLigh",
            "tMode\"}\r\n\n{\"command\":\"awaitProperties\",",
            "\"args\":{\"keys\":[\"isLightMode\",\"width\"]}}",
        ],
    );
    assert_eq!(replies.take(), vec![vec![json!(true), json!(160)]]);
}

#[test]
fn test_curve_with_infinity_break() {
    let (mut ws, _) = workspace();
    feed(
        &mut ws,
        &["{\"command\":\"draw\",\"args\":{\"type\":\"curve\",\"points\":[[10,10],[40,10],[-Infinity,0],[10,60],[40,60]],\"color\":\"#ffffff\",\"width\":3}}\n"],
    );
    let main = &ws.layers().main;
    assert_ne!(pixel_at(main, 25, 10).a(), 0);
    assert_ne!(pixel_at(main, 25, 60).a(), 0);
    assert_eq!(pixel_at(main, 25, 35).a(), 0, "no segment across the break");
}

#[test]
fn test_draw_group_skips_bad_primitives() {
    let (mut ws, _) = workspace();
    ws.handle_message(
        r##"{"command":"drawGroup","args":{"shapes":[
            {"type":"rect","point":[20,20],"width":10,"height":10,"fillColor":"#ff0000","borderColor":"transparent"},
            {"type":"hexagon"},
            {"type":"rect","point":[60,20],"width":10,"height":10,"fillColor":"#0000ff","borderColor":"transparent"}
        ]}}"##,
    );
    assert_eq!(pixel_at(&ws.layers().main, 20, 20), Color32::RED);
    assert_eq!(pixel_at(&ws.layers().main, 60, 20), Color32::BLUE);
}

#[test]
fn test_pen_target_draws_on_the_pen_layer() {
    let (mut ws, _) = workspace();
    ws.handle_message(
        r##"{"command":"draw","args":{"args":{"type":"rect","point":[30,30],"width":8,"height":8,"fillColor":"#00ff00"},"canvas":"pen"}}"##,
    );
    assert!(!ws.layers().pen.is_blank());
    assert!(ws.layers().main.is_blank());
}

#[test]
fn test_sequence_saves_frames_and_reports_completion() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("frames");
    let (mut ws, replies) = workspace();
    let message = json!({
        "command": "renderSequence",
        "args": {
            "frames": [
                [{"type": "rect", "point": [20, 20], "width": 10, "height": 10, "fillColor": "#ff0000"}],
                [],
                [{"type": "rect", "point": [80, 60], "width": 10, "height": 10, "fillColor": "#ff0000"}]
            ],
            "background": [{"type": "rect", "point": [80, 60], "width": 160, "height": 120, "fillColor": "#202020"}],
            "frameDuration": 0.02,
            "savePath": out.display().to_string(),
            "awaitsCompletion": true
        }
    });
    ws.handle_message(&message.to_string());
    assert!(ws.is_animating());
    assert!(!ws.layers().background.is_blank());

    let start = Instant::now();
    ws.poll(start);
    assert_ne!(pixel_at(&ws.layers().main, 20, 20).a(), 0);
    ws.poll(start + Duration::from_millis(5));
    assert_ne!(pixel_at(&ws.layers().main, 20, 20).a(), 0, "frame still showing");

    ws.poll(start + Duration::from_millis(25));
    assert_eq!(pixel_at(&ws.layers().main, 20, 20).a(), 0);
    assert_ne!(pixel_at(&ws.layers().main, 80, 60).a(), 0);
    assert!(replies.is_empty());

    ws.poll(start + Duration::from_millis(50));
    assert_eq!(replies.take(), vec![vec![json!("completed")]]);
    assert!(!ws.is_animating());

    assert!(out.join("frame-00000.png").exists());
    assert!(!out.join("frame-00001.png").exists());
    assert!(out.join("frame-00002.png").exists());
}

#[test]
fn test_huge_frame_duration_plays_at_the_default_rate() {
    let (mut ws, replies) = workspace();
    ws.handle_message(
        r##"{"command":"renderSequence","args":{"frames":[[{"type":"rect","point":[20,20],"width":10,"height":10,"fillColor":"#ff0000"}],[{"type":"rect","point":[80,60],"width":10,"height":10,"fillColor":"#ff0000"}]],"frameDuration":1e30,"awaitsCompletion":true}}"##,
    );
    assert!(ws.is_animating());

    let start = Instant::now();
    ws.poll(start);
    ws.poll(start + Duration::from_millis(60));
    assert_ne!(pixel_at(&ws.layers().main, 80, 60).a(), 0);
    ws.poll(start + Duration::from_millis(120));
    assert_eq!(replies.take(), vec![vec![json!("completed")]]);
}

#[test]
fn test_background_style_and_modes() {
    let (mut ws, replies) = workspace();
    ws.handle_message(r##"{"command":"setBackground","args":{"background":"#112233"}}"##);
    ws.handle_message(r#"{"command":"setDarkMode"}"#);
    ws.handle_message(r#"{"command":"awaitProperties","args":{"keys":["backgroundStyle","isLightMode"]}}"#);
    assert_eq!(replies.take(), vec![vec![json!("#112233"), json!(false)]]);
}

#[test]
fn test_reply_encoding() {
    assert_eq!(encode_reply(&[]), "[]\n");
    let values: Vec<Value> = vec![json!(1.5), json!(null), json!("x")];
    assert_eq!(encode_reply(&values), "[1.5,null,\"x\"]\n");
}

#[test]
fn test_only_queries_expect_replies() {
    let parse = |line: &str| Command::parse(line).unwrap();
    assert!(parse(r#"{"command":"awaitEvent","args":{"type":"keydown","dataKeys":["key"]}}"#).expects_reply());
    assert!(parse(r#"{"command":"resizeWindow","args":{"width":10,"height":10}}"#).expects_reply());
    assert!(!parse(r#"{"command":"clear"}"#).expects_reply());
    assert!(!parse(r#"{"command":"toggleBackground"}"#).expects_reply());
}
