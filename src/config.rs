//! Immutable run configuration.
//!
//! A [`Config`] is built once (defaults, optional YAML file, CLI overrides),
//! validated, and then passed by reference to every stage.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ass_style::StyleOverride;
use crate::error::{ReelError, ReelResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub subtitles: SubtitleConfig,
    /// Applied to the generated style line before burn-in when present.
    pub style_override: Option<StyleOverride>,
    pub bgm: BgmConfig,
    pub align: AlignConfig,
    pub tts: TtsConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Crossfade duration between consecutive scenes, in seconds.
    pub crossfade: f64,
    pub pixel_format: String,
    pub video_codec: String,
    pub audio_codec: String,
    /// Upper bound on concurrent per-scene clip renders.
    pub workers: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            crossfade: 0.45,
            pixel_format: "yuv420p".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    pub max_words_per_line: usize,
    pub max_line_duration: f64,
    pub max_gap: f64,
    /// Added after the last word of every line.
    pub end_padding: f64,
    pub font: String,
    pub font_size: u32,
    pub primary_colour: String,
    pub secondary_colour: String,
    pub outline_colour: String,
    pub outline: u32,
    pub shadow: u32,
    /// ASS numpad alignment.
    pub alignment: u8,
    pub margin_v: u32,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            max_words_per_line: 4,
            max_line_duration: 2.5,
            max_gap: 0.35,
            end_padding: 0.05,
            font: "Arial".to_string(),
            font_size: 64,
            primary_colour: "&H00FFFFFF".to_string(),
            secondary_colour: "&H00999999".to_string(),
            outline_colour: "&H00000000".to_string(),
            outline: 3,
            shadow: 0,
            alignment: 1,
            margin_v: 220,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BgmConfig {
    pub enabled: bool,
    pub track: Option<PathBuf>,
    pub foreground_gain: f64,
    pub background_gain: f64,
}

impl Default for BgmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            track: None,
            foreground_gain: 1.0,
            background_gain: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub program: String,
    pub dictionary: String,
    pub acoustic_model: String,
    pub sample_rate: u32,
    pub single_speaker: bool,
    pub download_models: bool,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            program: "mfa".to_string(),
            dictionary: "english_us_arpa".to_string(),
            acoustic_model: "english_us_arpa".to_string(),
            sample_rate: 16_000,
            single_speaker: true,
            download_models: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub program: String,
    pub model: PathBuf,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            program: "piper".to_string(),
            model: PathBuf::from("./tts/en_US-hfc_male-medium.onnx"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub seed: Option<u64>,
    pub temperature: Option<f64>,
    /// Sampling temperature for image prompt enhancement.
    pub enhance_temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            seed: Some(1337),
            temperature: Some(1.0),
            enhance_temperature: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Added to every measured narration duration; `None` uses the crossfade.
    pub duration_padding: Option<f64>,
    pub seed: u64,
    /// Expand each visual prompt through the LLM before rendering.
    pub enhance_prompts: bool,
    pub image_style: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            duration_padding: None,
            seed: 1337,
            enhance_prompts: false,
            image_style: "artstation".to_string(),
        }
    }
}

impl Config {
    /// Reads a YAML config file; missing sections take their defaults.
    pub fn load(path: &Path) -> ReelResult<Self> {
        let text = std::fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn validate(&self) -> ReelResult<()> {
        let v = &self.video;
        if v.width == 0 || v.height == 0 {
            return Err(ReelError::validation(None, "video dimensions must be non-zero"));
        }
        if v.fps == 0 {
            return Err(ReelError::validation(None, "video.fps must be positive"));
        }
        if !(v.crossfade >= 0.0 && v.crossfade.is_finite()) {
            return Err(ReelError::validation(
                None,
                format!("video.crossfade must be >= 0, got {}", v.crossfade),
            ));
        }
        if v.workers == 0 {
            return Err(ReelError::validation(None, "video.workers must be at least 1"));
        }
        if self.subtitles.max_words_per_line == 0 {
            return Err(ReelError::validation(
                None,
                "subtitles.max_words_per_line must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn duration_padding(&self) -> f64 {
        self.pipeline
            .duration_padding
            .unwrap_or(self.video.crossfade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "video:\n  fps: 24\nstyle_override:\n  fontsize: 40\n",
        )
        .unwrap();
        assert_eq!(cfg.video.fps, 24);
        assert_eq!(cfg.video.width, 1080);
        assert_eq!(cfg.subtitles.max_words_per_line, 4);
        let ov = cfg.style_override.unwrap();
        assert_eq!(ov.fontsize, Some(40));
        assert!(ov.fontname.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_fps() {
        let mut cfg = Config::default();
        cfg.video.fps = 0;
        assert!(cfg.validate().is_err());
        cfg.video.fps = 30;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_prompt_enhancement_settings() {
        let cfg = Config::default();
        assert!(!cfg.pipeline.enhance_prompts);
        assert_eq!(cfg.llm.enhance_temperature, 0.4);

        let cfg: Config =
            serde_yaml::from_str("pipeline:\n  enhance_prompts: true\n  image_style: ''\n").unwrap();
        assert!(cfg.pipeline.enhance_prompts);
        assert_eq!(cfg.pipeline.image_style, "");
        assert_eq!(cfg.pipeline.seed, 1337);
    }

    #[test]
    fn test_duration_padding_defaults_to_crossfade() {
        let cfg = Config::default();
        assert_eq!(cfg.duration_padding(), 0.45);
    }
}
