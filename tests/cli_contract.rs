use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::tempdir;

const SCENE: &str = r#"
version: 1
environment:
  surface: { width: 48, height: 32 }
  fps: 12
  duration: { frames: 3 }
  seed: 9
effect:
  grid_spacing: 12
  influence_radius: 60
"#;

fn write_manifest(path: &Path, yaml: &str) {
    fs::write(path, yaml).expect("manifest should write");
}

fn run_gridgrain(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_gridgrain"))
        .current_dir(cwd)
        .args(args)
        .env_remove("GRIDGRAIN_REDUCED_MOTION")
        .output()
        .expect("gridgrain command should run")
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be a single JSON document")
}

#[test]
fn check_json_reports_clamped_effect() {
    let dir = tempdir().expect("tempdir should create");
    write_manifest(&dir.path().join("scene.yaml"), SCENE);

    let output = run_gridgrain(
        dir.path(),
        &["check", "scene.yaml", "--set", "grid_spacing=200", "--json"],
    );
    assert!(output.status.success(), "check should succeed");
    let report = stdout_json(&output);
    assert_eq!(report["ok"], Value::Bool(true));
    assert_eq!(report["frames"], Value::from(3));
    assert_eq!(report["backing"]["width"], Value::from(48));
    assert_eq!(report["effect"]["grid_spacing"].as_f64(), Some(60.0));
}

#[test]
fn still_writes_png_at_backing_size() {
    let dir = tempdir().expect("tempdir should create");
    write_manifest(&dir.path().join("scene.yaml"), SCENE);

    let output = run_gridgrain(
        dir.path(),
        &[
            "still",
            "scene.yaml",
            "-o",
            "out/still.png",
            "--frame",
            "2",
            "--backend",
            "software",
            "--json",
        ],
    );
    assert!(
        output.status.success(),
        "still should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report = stdout_json(&output);
    assert_eq!(report["backend"], Value::from("software"));

    let image = image::open(dir.path().join("out/still.png"))
        .expect("png should decode")
        .to_rgba8();
    assert_eq!(image.dimensions(), (48, 32));
}

#[test]
fn still_matches_the_same_frame_of_a_sequence() {
    let dir = tempdir().expect("tempdir should create");
    write_manifest(&dir.path().join("scene.yaml"), SCENE);

    let still = run_gridgrain(
        dir.path(),
        &["still", "scene.yaml", "-o", "still.png", "--frame", "2", "--backend", "software"],
    );
    assert!(still.status.success(), "still should succeed");
    let frames = run_gridgrain(
        dir.path(),
        &["frames", "scene.yaml", "-o", "seq", "--backend", "software"],
    );
    assert!(frames.status.success(), "frames should succeed");

    for index in 0..3 {
        assert!(dir.path().join(format!("seq/frame_{index:06}.png")).exists());
    }
    let from_still = fs::read(dir.path().join("still.png")).expect("still png");
    let from_sequence = fs::read(dir.path().join("seq/frame_000002.png")).expect("sequence png");
    assert_eq!(from_still, from_sequence);
}

#[test]
fn background_makes_output_opaque() {
    let dir = tempdir().expect("tempdir should create");
    let yaml = format!(
        "{SCENE}  grain_amount: 1.0\n"
    )
    .replace(
        "  seed: 9\n",
        "  seed: 9\n  background: { start: \"#000000\", mid: \"#333333\", end: \"#ffffff\" }\n",
    );
    write_manifest(&dir.path().join("scene.yaml"), &yaml);

    let output = run_gridgrain(
        dir.path(),
        &["still", "scene.yaml", "-o", "bg.png", "--backend", "software"],
    );
    assert!(output.status.success(), "still should succeed");
    let image = image::open(dir.path().join("bg.png"))
        .expect("png should decode")
        .to_rgba8();
    assert!(image.pixels().all(|px| px.0[3] == 255));
}

#[test]
fn bad_override_reports_code_and_usage_exit() {
    let dir = tempdir().expect("tempdir should create");
    write_manifest(&dir.path().join("scene.yaml"), SCENE);

    let output = run_gridgrain(
        dir.path(),
        &["check", "scene.yaml", "--set", "sparkle=1", "--json"],
    );
    assert_eq!(output.status.code(), Some(2));
    let envelope = stdout_json(&output);
    assert_eq!(envelope["ok"], Value::Bool(false));
    assert_eq!(envelope["error"]["code"], Value::from("E_OVERRIDE_INVALID"));
}

#[test]
fn invalid_manifest_reports_manifest_code() {
    let dir = tempdir().expect("tempdir should create");
    write_manifest(
        &dir.path().join("scene.yaml"),
        "environment:\n  surface: { width: 8, height: 8 }\n  fps: 0\n  duration: { frames: 1 }\n",
    );

    let output = run_gridgrain(dir.path(), &["check", "scene.yaml", "--json"]);
    assert_eq!(output.status.code(), Some(2));
    let envelope = stdout_json(&output);
    assert_eq!(envelope["error"]["code"], Value::from("E_MANIFEST_INVALID"));
}

#[test]
fn render_without_ffmpeg_fails_with_output_code() {
    let dir = tempdir().expect("tempdir should create");
    write_manifest(&dir.path().join("scene.yaml"), SCENE);

    let output = run_gridgrain(
        dir.path(),
        &[
            "render",
            "scene.yaml",
            "-o",
            "clip.mp4",
            "--backend",
            "software",
            "--ffmpeg",
            "definitely-not-a-real-ffmpeg-binary",
            "--json",
        ],
    );
    assert_eq!(output.status.code(), Some(1));
    let envelope = stdout_json(&output);
    assert_eq!(envelope["error"]["code"], Value::from("E_OUTPUT_WRITE"));
    let message = envelope["error"]["message"].as_str().unwrap_or_default();
    assert!(message.contains("ffmpeg executable not found"), "{message}");
}

#[test]
fn version_includes_git_hash_slot() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_gridgrain(dir.path(), &["--version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("gridgrain "));
    assert!(stdout.contains('('));
}
