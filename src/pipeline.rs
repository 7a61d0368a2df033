use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::info;

use crate::{
    color::Color,
    config::RenderConfig,
    encode_ffmpeg::{AudioInput, EncodeConfig, FfmpegEncoder},
    error::{NotefallError, NotefallResult},
    midi::Score,
    painter::{Frame, MaskFrame, Painter},
};

/// A static image layer shown behind the falling notes, pre-scaled to
/// cover the frame.
#[derive(Clone, Debug)]
pub struct BackgroundLayer {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    opacity: f64,
}

impl BackgroundLayer {
    pub fn from_image_path(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        opacity: f64,
    ) -> NotefallResult<Self> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|e| {
            NotefallError::media_read(format!(
                "failed to load background image '{}': {e}",
                path.display()
            ))
        })?;
        let scaled = img.resize_to_fill(width, height, image::imageops::FilterType::Triangle);
        let rgb = scaled.crop_imm(0, 0, width, height).to_rgb8();
        Ok(Self {
            width,
            height,
            rgb: rgb.into_raw(),
            opacity: opacity.clamp(0.0, 1.0),
        })
    }

    /// A flat color fill instead of an image.
    pub fn solid(color: Color, width: u32, height: u32, opacity: f64) -> Self {
        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..width as usize * height as usize {
            rgb.extend_from_slice(&[color.r, color.g, color.b]);
        }
        Self {
            width,
            height,
            rgb,
            opacity: opacity.clamp(0.0, 1.0),
        }
    }
}

/// Render threading knobs, sequential by default.
#[derive(Clone, Debug)]
pub struct RenderThreading {
    pub parallel: bool,
    pub chunk_size: usize,
    pub threads: Option<usize>,
}

impl Default for RenderThreading {
    fn default() -> Self {
        Self {
            parallel: false,
            chunk_size: 64,
            threads: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RenderOpts {
    pub out_path: PathBuf,
    pub overwrite: bool,
    pub audio: Option<PathBuf>,
    pub background: Option<BackgroundLayer>,
    /// Render only `[start, end)` seconds of the timeline.
    pub preview: Option<(f64, f64)>,
    pub threading: RenderThreading,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames_total: u64,
}

/// Full timeline length: the MIDI runs its course, plus the initial fall,
/// plus a configured tail so the last hit flash can decay on screen.
pub fn total_duration(score: &Score, cfg: &RenderConfig) -> f64 {
    score.duration + cfg.fall_time + cfg.end_time
}

/// Render the whole timeline to an MP4 via the system `ffmpeg`.
pub fn render_to_mp4(
    score: &Score,
    cfg: &RenderConfig,
    opts: &RenderOpts,
) -> NotefallResult<RenderStats> {
    let mut painter = Painter::new(score, cfg.clone())?;

    let duration = total_duration(score, cfg);
    let fps = f64::from(cfg.fps);
    let total_frames = (duration * fps).ceil() as u64;

    let (start_frame, end_frame) = match opts.preview {
        Some((start_s, end_s)) => {
            if !(start_s >= 0.0 && end_s > start_s) {
                return Err(NotefallError::config(
                    "preview window must be ordered and non-negative",
                ));
            }
            let start = (start_s * fps).floor() as u64;
            let end = ((end_s * fps).ceil() as u64).min(total_frames);
            if start >= end {
                return Err(NotefallError::config(
                    "preview window lies past the end of the timeline",
                ));
            }
            (start, end)
        }
        None => (0, total_frames),
    };

    // Audio starts when the first notes can reach the hit-line.
    let audio = opts.audio.as_ref().map(|path| AudioInput {
        path: path.clone(),
        offset_secs: cfg.fall_time,
    });

    let mut encoder = FfmpegEncoder::new(EncodeConfig {
        width: cfg.width,
        height: cfg.height,
        fps: cfg.fps,
        out_path: opts.out_path.clone(),
        overwrite: opts.overwrite,
        audio,
    })?;

    info!(
        frames = end_frame - start_frame,
        fps = cfg.fps,
        out = %opts.out_path.display(),
        parallel = opts.threading.parallel,
        "rendering"
    );

    let stats = if opts.threading.parallel {
        render_parallel(&painter, cfg, opts, start_frame, end_frame, &mut encoder)?
    } else {
        let mut stats = RenderStats::default();
        for f in start_frame..end_frame {
            let t = f as f64 / fps;
            let frame = painter.render_at(t);
            let mask = if cfg.masked {
                Some(painter.mask_at(t)?.clone())
            } else {
                None
            };
            let rgb = compose(&frame, mask.as_ref(), opts.background.as_ref());
            encoder.encode_frame(&Frame {
                width: frame.width,
                height: frame.height,
                rgb,
            })?;
            stats.frames_total += 1;
        }
        stats
    };

    encoder.finish()?;
    Ok(stats)
}

/// Chunked parallel rendering. Each worker owns an independent painter
/// clone (the static backdrop buffer is shared read-only, mask caches are
/// per worker) and frames are encoded in order per chunk.
fn render_parallel(
    painter: &Painter,
    cfg: &RenderConfig,
    opts: &RenderOpts,
    start_frame: u64,
    end_frame: u64,
    encoder: &mut FfmpegEncoder,
) -> NotefallResult<RenderStats> {
    let pool = build_thread_pool(opts.threading.threads)?;
    let chunk_size = opts.threading.chunk_size.max(1) as u64;
    let fps = f64::from(cfg.fps);
    let mut stats = RenderStats::default();

    let mut chunk_start = start_frame;
    while chunk_start < end_frame {
        let chunk_end = (chunk_start + chunk_size).min(end_frame);

        let rendered: Vec<NotefallResult<Vec<u8>>> = pool.install(|| {
            (chunk_start..chunk_end)
                .into_par_iter()
                .map_init(
                    || painter.clone(),
                    |worker, f| -> NotefallResult<Vec<u8>> {
                        let t = f as f64 / fps;
                        let frame = worker.render_at(t);
                        let mask = if cfg.masked {
                            Some(worker.mask_at(t)?.clone())
                        } else {
                            None
                        };
                        Ok(compose(&frame, mask.as_ref(), opts.background.as_ref()))
                    },
                )
                .collect()
        });

        for rgb in rendered {
            encoder.encode_frame(&Frame {
                width: cfg.width,
                height: cfg.height,
                rgb: rgb?,
            })?;
            stats.frames_total += 1;
        }
        chunk_start = chunk_end;
    }

    Ok(stats)
}

/// Lay the rendered notes over the background through the mask.
///
/// Without a mask the frame is already flattened and passes through. With
/// a mask but no background the notes are scaled against black, which
/// matches what flattening would have produced.
fn compose(frame: &Frame, mask: Option<&MaskFrame>, bg: Option<&BackgroundLayer>) -> Vec<u8> {
    let Some(mask) = mask else {
        return frame.rgb.clone();
    };

    let mut out = Vec::with_capacity(frame.rgb.len());
    match bg {
        Some(bg) => {
            debug_assert_eq!(bg.width, frame.width);
            debug_assert_eq!(bg.height, frame.height);
            for (i, m) in mask.data.iter().enumerate() {
                let m = f64::from(*m);
                for c in 0..3 {
                    let fg = f64::from(frame.rgb[i * 3 + c]);
                    let back = f64::from(bg.rgb[i * 3 + c]) * bg.opacity;
                    out.push((fg * m + back * (1.0 - m)).round().clamp(0.0, 255.0) as u8);
                }
            }
        }
        None => {
            for (i, m) in mask.data.iter().enumerate() {
                let m = f64::from(*m);
                for c in 0..3 {
                    let fg = f64::from(frame.rgb[i * 3 + c]);
                    out.push((fg * m).round().clamp(0.0, 255.0) as u8);
                }
            }
        }
    }
    out
}

fn build_thread_pool(threads: Option<usize>) -> NotefallResult<rayon::ThreadPool> {
    if threads == Some(0) {
        return Err(NotefallError::config(
            "render threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| NotefallError::encode(format!("failed to build rayon thread pool: {e}")))
}
