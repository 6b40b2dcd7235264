use assert_cmd::prelude::*;
use image::{Rgba, RgbaImage};
use predicates::str::contains;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const CUBE_PLY: &str = "ply
format ascii 1.0
comment one face of a cube
element vertex 4
property float x
property float y
property float z
property float s
property float t
element face 2
property list uchar int vertex_indices
end_header
0 0 0 0 0
1 0 0 1 0
1 1 0 1 1
0 1 0 0 1
3 0 1 2
3 0 2 3
";

const FONT_JSON: &str = r#"[
  {"char": "H", "x": 0, "y": 0},
  {"char": "e", "x": 1, "y": 0},
  {"char": "l", "x": 0, "y": 1, "offset": 0.1},
  {"char": "o", "x": 1, "y": 1},
  {"char": "unused", "x": 0, "y": 0}
]"#;

fn write_png(path: &Path, width: u32, height: u32) {
    let mut image = RgbaImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if (x + y) % 3 != 0 {
            *pixel = Rgba([255, 255, 255, 255]);
        }
    }
    image.save(path).expect("write png");
}

fn assets(files: &[(&str, &str)], pngs: &[(&str, u32, u32)]) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).expect("write asset");
    }
    for (name, width, height) in pngs {
        write_png(&dir.path().join(name), *width, *height);
    }
    dir
}

fn pebble(demo: &str, assets: &TempDir, frames: u32) -> Command {
    let mut cmd = Command::cargo_bin("pebble").expect("binary exists");
    cmd.arg(demo)
        .arg("--assets")
        .arg(assets.path())
        .arg("--headless")
        .arg("--frames")
        .arg(frames.to_string());
    cmd
}

#[test]
fn sprite_demo_runs_headless() {
    let dir = assets(&[], &[("gopher.png", 64, 32)]);
    pebble("sprite", &dir, 3)
        .assert()
        .success()
        .stdout(contains("Ran 3 frame(s) without a window"))
        .stdout(contains(
            " - sprite pos=(0.00, 0.00) size=(64.00, 32.00) rot=0.00 visible=true",
        ));
}

#[test]
fn model_demo_spins_the_cube() {
    let dir = assets(&[("cube.ply", CUBE_PLY)], &[("cube.png", 4, 4)]);
    pebble("model", &dir, 60)
        .assert()
        .success()
        .stdout(contains("Final actor states:"))
        .stdout(contains(" - model vertices=4 rot=(0.00, 0.00, 45.00)"));
}

#[test]
fn keyframe_demo_uses_requested_size() {
    let dir = assets(&[], &[("runningcat.png", 32, 32)]);
    pebble("keyframe", &dir, 10)
        .assert()
        .success()
        .stdout(contains(" - cat pos=(0.00, 0.00) size=(512.00, 256.00)"))
        .stdout(contains("frame="));
}

#[test]
fn text_demo_cuts_glyphs_from_font() {
    let dir = assets(&[("victor.json", FONT_JSON)], &[("victor.png", 32, 32)]);
    pebble("text", &dir, 2)
        .assert()
        .success()
        .stdout(contains(" - text \"Hello, World!_\""));
}

#[test]
fn input_demo_quarters_the_sprite() {
    let dir = assets(&[], &[("gopher.png", 64, 32)]);
    pebble("input", &dir, 1)
        .assert()
        .success()
        .stdout(contains(" - gopher pos=(0.00, 0.00) size=(16.00, 8.00)"));
}

#[test]
fn config_file_overrides_defaults() {
    let dir = assets(
        &[("options.json", r#"{"title": "Custom", "width": 0, "height": 100}"#)],
        &[("gopher.png", 8, 8)],
    );
    pebble("sprite", &dir, 1)
        .arg("--config")
        .arg(dir.path().join("options.json"))
        .assert()
        .success()
        .stdout(contains("Ran 1 frame(s) without a window"));
}

#[test]
fn missing_assets_fail_with_resource_error() {
    let dir = assets(&[], &[]);
    pebble("sprite", &dir, 1)
        .assert()
        .failure()
        .stderr(contains("gopher.png"));
}

#[test]
fn unknown_demo_prints_usage() {
    Command::cargo_bin("pebble")
        .expect("binary exists")
        .arg("pong")
        .assert()
        .failure()
        .stderr(contains("Usage: pebble"));
}
