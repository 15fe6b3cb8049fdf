use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

const FRAME_QUEUE_DEPTH: usize = 4;

/// Write one straight-alpha RGBA8 frame as PNG.
pub fn write_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        bail!(
            "frame buffer is {} bytes, expected {expected} for {width}x{height}",
            rgba.len()
        );
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    image::save_buffer(path, rgba, width, height, image::ExtendedColorType::Rgba8)
        .with_context(|| format!("failed to write PNG {}", path.display()))
}

/// Numbered PNG frames in one directory: `frame_000000.png`, ...
#[derive(Debug, Clone)]
pub struct PngSequence {
    directory: PathBuf,
    prefix: String,
    written: u32,
}

impl PngSequence {
    pub fn create(directory: &Path, prefix: &str) -> Result<Self> {
        fs::create_dir_all(directory)
            .with_context(|| format!("failed to create directory {}", directory.display()))?;
        Ok(Self {
            directory: directory.to_path_buf(),
            prefix: prefix.to_owned(),
            written: 0,
        })
    }

    pub fn frame_path(&self, frame_index: u32) -> PathBuf {
        self.directory
            .join(format!("{}_{frame_index:06}.png", self.prefix))
    }

    pub fn write_frame(&mut self, frame_index: u32, width: u32, height: u32, rgba: &[u8]) -> Result<PathBuf> {
        let path = self.frame_path(frame_index);
        write_png(&path, width, height, rgba)?;
        self.written += 1;
        Ok(path)
    }

    pub fn written(&self) -> u32 {
        self.written
    }
}

/// Streams RGBA frames into a system `ffmpeg` process from a worker thread.
pub struct FfmpegPipe {
    sender: Option<mpsc::SyncSender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl FfmpegPipe {
    pub fn spawn(width: u32, height: u32, fps: u32, output_path: &Path) -> Result<Self> {
        Self::spawn_with_binary(Path::new("ffmpeg"), width, height, fps, output_path)
    }

    pub fn spawn_with_binary(
        ffmpeg_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        output_path: &Path,
    ) -> Result<Self> {
        validate_output_path(output_path)?;
        let args = ffmpeg_args(&format!("{width}x{height}"), &fps.to_string(), output_path);
        let ffmpeg_path = ffmpeg_path.to_path_buf();
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(FRAME_QUEUE_DEPTH);

        let worker = thread::Builder::new()
            .name("gridgrain-ffmpeg-encoder".to_owned())
            .spawn(move || run_ffmpeg_process(&ffmpeg_path, &args, receiver))
            .context("failed to spawn ffmpeg writer thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn write_frame(&self, rgba_frame: Vec<u8>) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        sender
            .send(rgba_frame)
            .map_err(|_| anyhow!("failed to enqueue frame for ffmpeg"))
    }

    pub fn finish(mut self) -> Result<()> {
        drop(self.sender.take());

        let handle = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("ffmpeg worker thread missing"))?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("ffmpeg worker thread panicked")),
        }
    }
}

fn validate_output_path(output_path: &Path) -> Result<()> {
    let path_str = output_path.to_string_lossy();
    if path_str.is_empty() {
        bail!("output path is empty");
    }
    if path_str.len() > 1024 {
        bail!("output path is suspiciously long");
    }
    if path_str.chars().any(char::is_control) {
        bail!("output path contains invalid control characters");
    }
    Ok(())
}

fn run_ffmpeg_process(
    ffmpeg_path: &Path,
    args: &[String],
    receiver: mpsc::Receiver<Vec<u8>>,
) -> Result<()> {
    debug!(binary = %ffmpeg_path.display(), args = %args.join(" "), "spawning ffmpeg");
    let mut child = Command::new(ffmpeg_path)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(
                    "ffmpeg executable not found (resolved_path={}). Install ffmpeg or export a PNG sequence with `gridgrain frames`.",
                    ffmpeg_path.display()
                )
            } else {
                anyhow!(
                    "failed to spawn ffmpeg process (resolved_path={}, args='{}'): {error}",
                    ffmpeg_path.display(),
                    args.join(" ")
                )
            }
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
    let mut stderr_pipe = child.stderr.take();

    while let Ok(frame) = receiver.recv() {
        stdin
            .write_all(&frame)
            .context("failed to write frame to ffmpeg stdin")?;
    }

    stdin.flush().context("failed to flush ffmpeg stdin")?;
    drop(stdin);

    let status = child.wait().context("failed waiting for ffmpeg process")?;
    let stderr_tail = read_stderr_tail(&mut stderr_pipe)?;
    if !status.success() {
        bail!(
            "ffmpeg failed with status {status} (args='{}', stderr_tail='{}')",
            args.join(" "),
            stderr_tail
        );
    }
    Ok(())
}

pub fn ffmpeg_args(size: &str, fps: &str, output_path: &Path) -> Vec<String> {
    let mut args = ffmpeg_rawvideo_input_args(size, fps);
    args.extend(ffmpeg_codec_args(output_path));
    args.push(output_path.to_string_lossy().into_owned());
    args
}

pub fn ffmpeg_rawvideo_input_args(size: &str, fps: &str) -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s:v",
        size,
        "-r",
        fps,
        "-i",
        "-",
        "-an",
    ]
    .iter()
    .map(|arg| (*arg).to_owned())
    .collect()
}

/// Codec selection by container: alpha-capable codecs for `.mov`/`.webm`,
/// H.264 otherwise.
pub fn ffmpeg_codec_args(output_path: &Path) -> Vec<String> {
    let ext = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let args: &[&str] = match ext.as_str() {
        "mov" => &[
            "-c:v",
            "prores_ks",
            "-profile:v",
            "4444",
            "-pix_fmt",
            "yuva444p10le",
        ],
        "webm" => &["-c:v", "libvpx-vp9", "-pix_fmt", "yuva420p", "-b:v", "0", "-crf", "24"],
        "gif" => &[],
        _ => &[
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-crf",
            "18",
            "-movflags",
            "+faststart",
        ],
    };
    args.iter().map(|arg| (*arg).to_owned()).collect()
}

fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let chars = s.chars().collect::<Vec<_>>();
    let start = chars.len().saturating_sub(max_chars);
    chars[start..].iter().collect::<String>().trim().to_owned()
}
