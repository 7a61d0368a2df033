use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use notefall::{
    BackgroundLayer, Color, Painter, RenderConfig, RenderOpts, RenderThreading, Score,
};

#[derive(Parser, Debug)]
#[command(name = "notefall", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
    /// Render an MP4 video (requires `ffmpeg` on PATH).
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct SceneArgs {
    /// Input MIDI file.
    midi: PathBuf,

    /// Frame size as WIDTHxHEIGHT.
    #[arg(short = 's', long, default_value = "1280x720", value_parser = parse_size)]
    size: (u32, u32),

    /// Frames per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Seconds a note takes to fall from the top edge to the hit-line.
    #[arg(long, default_value_t = 10.0)]
    speed: f64,

    /// Skip the note-name labels above each lane.
    #[arg(long)]
    no_text: bool,

    /// TTF font for the note-name labels (system fonts are tried otherwise).
    #[arg(long)]
    font: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FrameArgs {
    #[command(flatten)]
    scene: SceneArgs,

    /// Timestamp in seconds.
    #[arg(long, default_value_t = 0.0)]
    time: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    scene: SceneArgs,

    /// Output MP4 path.
    dest: PathBuf,

    /// Audio track to mux in, delayed by the fall time.
    #[arg(short = 'a', long)]
    audio: Option<PathBuf>,

    /// Background image shown behind the notes.
    #[arg(short = 'i', long)]
    image: Option<PathBuf>,

    /// Flat background color as rrggbb hex, instead of an image.
    #[arg(long, conflicts_with = "image", value_parser = parse_color)]
    bg_color: Option<Color>,

    /// Background opacity in percent.
    #[arg(long, default_value_t = 30)]
    opacity: u8,

    /// Render only START:END seconds of the timeline.
    #[arg(short = 'p', long, value_parser = parse_window)]
    preview: Option<(f64, f64)>,

    /// Render frames on a thread pool.
    #[arg(long)]
    parallel: bool,

    /// Worker thread count (defaults to the number of cores).
    #[arg(long, requires = "parallel")]
    threads: Option<usize>,

    /// Overwrite the destination if it exists.
    #[arg(short = 'y', long)]
    overwrite: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: u32 = w.parse().map_err(|_| format!("bad width '{w}'"))?;
    let h: u32 = h.parse().map_err(|_| format!("bad height '{h}'"))?;
    Ok((w, h))
}

fn parse_color(s: &str) -> Result<Color, String> {
    Color::from_hex(s).map_err(|e| e.to_string())
}

fn parse_window(s: &str) -> Result<(f64, f64), String> {
    let (start, end) = s
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{s}'"))?;
    let start: f64 = start.parse().map_err(|_| format!("bad start '{start}'"))?;
    let end: f64 = end.parse().map_err(|_| format!("bad end '{end}'"))?;
    if !(start >= 0.0 && end > start) {
        return Err(format!("window must satisfy 0 <= start < end, got '{s}'"));
    }
    Ok((start, end))
}

fn scene_config(scene: &SceneArgs, masked: bool) -> RenderConfig {
    RenderConfig {
        width: scene.size.0,
        height: scene.size.1,
        fps: scene.fps,
        fall_time: scene.speed,
        show_text: !scene.no_text,
        masked,
        font: scene.font.clone(),
        ..RenderConfig::default()
    }
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let score = Score::from_path(&args.scene.midi)?;
    let cfg = scene_config(&args.scene, false);

    let mut painter = Painter::new(&score, cfg)?;
    let frame = painter.render_at(args.time);

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.rgb,
        frame.width,
        frame.height,
        image::ColorType::Rgb8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let score = Score::from_path(&args.scene.midi)?;

    // A background only matters in masked mode, where note transparency
    // survives rendering and can let the backdrop show through.
    let cfg = scene_config(
        &args.scene,
        args.image.is_some() || args.bg_color.is_some(),
    );

    let opacity = f64::from(args.opacity.min(100)) / 100.0;
    let background = match (&args.image, args.bg_color) {
        (Some(path), _) => Some(BackgroundLayer::from_image_path(
            path, cfg.width, cfg.height, opacity,
        )?),
        (None, Some(color)) => Some(BackgroundLayer::solid(
            color, cfg.width, cfg.height, opacity,
        )),
        (None, None) => None,
    };

    let opts = RenderOpts {
        out_path: args.dest.clone(),
        overwrite: args.overwrite,
        audio: args.audio,
        background,
        preview: args.preview,
        threading: RenderThreading {
            parallel: args.parallel,
            threads: args.threads,
            ..RenderThreading::default()
        },
    };

    let stats = notefall::render_to_mp4(&score, &cfg, &opts)?;

    eprintln!("wrote {} ({} frames)", args.dest.display(), stats.frames_total);
    Ok(())
}
