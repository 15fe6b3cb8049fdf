use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridgrain::composite::flatten_onto_gradient;
use gridgrain::encoding::{write_png, FfmpegPipe, PngSequence};
use gridgrain::error_codes::{
    classify, find_coded_error, CodedError, CodedErrorKind, E_GPU_UNAVAILABLE, E_OUTPUT_WRITE,
};
use gridgrain::manifest::{load_and_validate_manifest_with_options, ManifestLoadOptions, ParamOverride};
use gridgrain::renderer::{BackendChoice, Renderer};
use gridgrain::schema::Manifest;
use gridgrain::session::{Frame, Session};
use gridgrain::snapshot::ConfigSnapshot;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GRIDGRAIN_GIT_HASH"),
    ")"
);

#[derive(Debug, Parser)]
#[command(name = "gridgrain")]
#[command(version = VERSION)]
#[command(about = "Render a motion-driven dot grid with directional grain")]
struct Cli {
    /// Machine-readable output on stdout, including error envelopes.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a manifest and print the clamped effect configuration.
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Write one PNG at the given frame index.
    Still {
        #[command(flatten)]
        input: InputArgs,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long, default_value_t = 0)]
        frame: u32,
    },
    /// Write every frame as a numbered PNG.
    Frames {
        #[command(flatten)]
        input: InputArgs,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long, default_value = "frame")]
        prefix: String,
    },
    /// Pipe every frame into ffmpeg; codec follows the output extension.
    Render {
        #[command(flatten)]
        input: InputArgs,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long, default_value = "ffmpeg")]
        ffmpeg: PathBuf,
    },
}

#[derive(Debug, Args)]
struct InputArgs {
    manifest: PathBuf,
    /// Override a manifest value; bare keys address `effect.*`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
    #[arg(long, value_enum, default_value_t = BackendChoice::Auto)]
    backend: BackendChoice,
    /// Hold the contact at the surface centre.
    #[arg(long, env = "GRIDGRAIN_REDUCED_MOTION")]
    reduced_motion: bool,
    /// Motion seed; overrides `environment.seed`.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let json_output = cli.json;

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_error(&error, json_output),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gridgrain=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let json_output = cli.json;
    match cli.command {
        Commands::Check { input } => run_check(&input, json_output),
        Commands::Still {
            input,
            output,
            frame,
        } => run_still(&input, &output, frame, json_output),
        Commands::Frames {
            input,
            output,
            prefix,
        } => run_frames(&input, &output, &prefix, json_output),
        Commands::Render {
            input,
            output,
            ffmpeg,
        } => run_render(&input, &output, &ffmpeg, json_output),
    }
}

fn report_error(error: &anyhow::Error, json_output: bool) -> ExitCode {
    let coded = find_coded_error(error).cloned().unwrap_or_else(|| {
        CodedError::runtime(E_OUTPUT_WRITE, format!("{error:#}"))
    });
    if json_output {
        match serde_json::to_string(&coded.envelope()) {
            Ok(line) => println!("{line}"),
            Err(_) => eprintln!("error: {error:#}"),
        }
    } else {
        eprintln!("error: {error:#}");
    }
    let code = u8::try_from(coded.kind.exit_code()).unwrap_or(1);
    ExitCode::from(code)
}

fn load_manifest(input: &InputArgs) -> Result<Manifest> {
    let overrides = input
        .set
        .iter()
        .map(|raw| ParamOverride::parse(raw))
        .collect::<Result<Vec<_>>>()?;
    let mut manifest =
        load_and_validate_manifest_with_options(&input.manifest, &ManifestLoadOptions { overrides })?;
    if input.seed.is_some() {
        manifest.environment.seed = input.seed;
    }
    if input.reduced_motion {
        manifest.environment.reduced_motion = true;
    }
    Ok(manifest)
}

fn open_session(input: &InputArgs, manifest: &Manifest) -> Result<Session> {
    let (width, height) = manifest.environment.backing_size();
    let renderer = pollster::block_on(Renderer::with_backend(input.backend, width, height))
        .map_err(|error| classify(error, E_GPU_UNAVAILABLE, CodedErrorKind::Runtime))?;
    info!(
        manifest = %input.manifest.display(),
        width,
        height,
        backend = renderer.backend_name(),
        frames = manifest.environment.total_frames(),
        "renderer ready"
    );
    Session::from_environment(&manifest.environment, renderer)
}

/// Render frame `index` of the manifest timeline, flattened onto the
/// background when one is configured.
fn render_frame(session: &mut Session, manifest: &Manifest, index: u32) -> Result<Frame> {
    let time_ms = manifest.environment.frame_time_ms(index);
    let mut frame = session
        .tick(time_ms, &manifest.effect)?
        .into_frame()
        .with_context(|| format!("frame {index} was skipped"))?;
    if let Some(background) = &manifest.environment.background {
        flatten_onto_gradient(&mut frame.rgba, frame.width, frame.height, background);
    }
    Ok(frame)
}

fn log_progress(index: u32, total: u32, fps: u32) {
    if index % fps.max(1) == 0 || index + 1 == total {
        info!(frame = index + 1, total, "rendered frame");
    }
}

fn run_check(input: &InputArgs, json_output: bool) -> Result<()> {
    let manifest = load_manifest(input)?;
    let environment = &manifest.environment;
    let snapshot = ConfigSnapshot::from_config(&manifest.effect);
    let (width, height) = environment.backing_size();

    if json_output {
        let report = json!({
            "ok": true,
            "manifest": input.manifest.display().to_string(),
            "surface": { "width": environment.surface.width, "height": environment.surface.height },
            "backing": { "width": width, "height": height },
            "fps": environment.fps,
            "frames": environment.total_frames(),
            "seed": environment.seed,
            "reduced_motion": environment.reduced_motion,
            "effect": snapshot.config(),
        });
        println!("{report}");
        return Ok(());
    }

    println!(
        "OK: {} ({}x{} css, {}x{} backing, {} fps, {} frames)",
        input.manifest.display(),
        environment.surface.width,
        environment.surface.height,
        width,
        height,
        environment.fps,
        environment.total_frames()
    );
    for (name, value) in snapshot.numeric_fields() {
        println!("  {name}: {value}");
    }
    println!("  shape: {:?}", snapshot.shape);
    println!("  grain_enabled: {}", snapshot.grain_enabled);
    println!("  grain_background: {:?}", snapshot.grain_background);
    println!("  grain_blend_mode: {:?}", snapshot.grain_blend_mode);
    Ok(())
}

fn run_still(input: &InputArgs, output: &Path, frame_index: u32, json_output: bool) -> Result<()> {
    let manifest = load_manifest(input)?;
    let mut session = open_session(input, &manifest)?;

    for index in 0..frame_index {
        session.advance(manifest.environment.frame_time_ms(index), &manifest.effect)?;
    }
    let frame = render_frame(&mut session, &manifest, frame_index)?;
    write_png(output, frame.width, frame.height, &frame.rgba)
        .map_err(|error| classify(error, E_OUTPUT_WRITE, CodedErrorKind::Runtime))?;
    let backend = if session.is_gpu_backend() { "gpu" } else { "software" };
    session.shutdown();

    if json_output {
        let report = json!({
            "ok": true,
            "output": output.display().to_string(),
            "frame": frame_index,
            "width": frame.width,
            "height": frame.height,
            "backend": backend,
        });
        println!("{report}");
    } else {
        println!("Wrote {}", output.display());
    }
    Ok(())
}

fn run_frames(input: &InputArgs, output: &Path, prefix: &str, json_output: bool) -> Result<()> {
    let manifest = load_manifest(input)?;
    let mut session = open_session(input, &manifest)?;
    let mut sequence = PngSequence::create(output, prefix)
        .map_err(|error| classify(error, E_OUTPUT_WRITE, CodedErrorKind::Runtime))?;
    let total = manifest.environment.total_frames();

    for index in 0..total {
        let frame = render_frame(&mut session, &manifest, index)?;
        sequence
            .write_frame(index, frame.width, frame.height, &frame.rgba)
            .map_err(|error| classify(error, E_OUTPUT_WRITE, CodedErrorKind::Runtime))?;
        log_progress(index, total, manifest.environment.fps);
    }
    session.shutdown();

    if json_output {
        let report = json!({
            "ok": true,
            "output": output.display().to_string(),
            "frames": sequence.written(),
        });
        println!("{report}");
    } else {
        println!("Wrote {} frames to {}", sequence.written(), output.display());
    }
    Ok(())
}

fn run_render(input: &InputArgs, output: &Path, ffmpeg: &Path, json_output: bool) -> Result<()> {
    let manifest = load_manifest(input)?;
    let mut session = open_session(input, &manifest)?;
    let (width, height) = session.backing_size();
    let pipe = FfmpegPipe::spawn_with_binary(ffmpeg, width, height, manifest.environment.fps, output)
        .map_err(|error| classify(error, E_OUTPUT_WRITE, CodedErrorKind::Runtime))?;
    let total = manifest.environment.total_frames();

    for index in 0..total {
        let frame = render_frame(&mut session, &manifest, index)?;
        if let Err(error) = pipe.write_frame(frame.rgba) {
            // The worker's own error explains why the channel closed.
            let error = pipe.finish().err().unwrap_or(error);
            return Err(classify(error, E_OUTPUT_WRITE, CodedErrorKind::Runtime));
        }
        log_progress(index, total, manifest.environment.fps);
    }
    pipe.finish()
        .map_err(|error| classify(error, E_OUTPUT_WRITE, CodedErrorKind::Runtime))?;
    session.shutdown();

    if json_output {
        let report = json!({
            "ok": true,
            "output": output.display().to_string(),
            "frames": total,
            "width": width,
            "height": height,
        });
        println!("{report}");
    } else {
        println!("Wrote {}", output.display());
    }
    Ok(())
}
