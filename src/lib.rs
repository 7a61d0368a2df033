#![forbid(unsafe_code)]

pub mod color;
pub mod config;
pub mod encode_ffmpeg;
pub mod error;
pub mod midi;
pub mod painter;
pub mod pipeline;
pub mod raster;
pub mod text;

pub use color::{Color, NOTE_NAMES, PALETTE};
pub use config::RenderConfig;
pub use encode_ffmpeg::{is_ffmpeg_on_path, AudioInput, EncodeConfig, FfmpegEncoder};
pub use error::{NotefallError, NotefallResult};
pub use midi::{extract_notes, Note, Score, TimedEvent};
pub use painter::{Frame, MaskFrame, Painter};
pub use pipeline::{
    render_to_mp4, total_duration, BackgroundLayer, RenderOpts, RenderStats, RenderThreading,
};
pub use raster::PixelBuffer;
pub use text::FontBank;
