// Embed git hash for --version. No git = "unknown".
fn main() {
    println!("cargo:rerun-if-changed=shaders/grid.wgsl");
    let hash = std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_owned());
    println!("cargo:rustc-env=GRIDGRAIN_GIT_HASH={hash}");
}
