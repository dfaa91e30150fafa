//! Build short vertical videos from a YAML scene spec: patch the spec from
//! feedback, synthesize karaoke subtitles from word alignment, and composite
//! stills, narration and subtitles with ffmpeg.

pub mod alignment;
pub mod ass_style;
pub mod audio;
pub mod collab;
pub mod command;
pub mod compositor;
pub mod config;
pub mod error;
pub mod llm;
pub mod patch;
pub mod pipeline;
pub mod spec;
pub mod subtitle;
pub mod tts;
pub mod utils;

pub use error::{ReelError, ReelResult};
