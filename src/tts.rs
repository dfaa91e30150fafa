use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::audio::wav_duration_seconds;
use crate::collab::SpeechSynthesizer;
use crate::command::ToolCommand;
use crate::config::TtsConfig;
use crate::error::{ReelError, ReelResult};

/// Piper TTS: text on stdin, WAV to `--output_file`.
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    program: String,
    model: PathBuf,
}

impl PiperSynthesizer {
    pub fn new(cfg: &TtsConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            model: cfg.model.clone(),
        }
    }

    pub fn command(&self, out_wav: &Path) -> ReelResult<ToolCommand> {
        Ok(ToolCommand::new(&self.program)
            .arg("--model")?
            .path_arg(&self.model)
            .arg("--output_file")?
            .path_arg(out_wav))
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperSynthesizer {
    async fn synthesize(&self, text: &str, out_wav: &Path) -> ReelResult<()> {
        if text.trim().is_empty() {
            return Err(ReelError::empty_input(
                "tts",
                format!("no narration text for {}", out_wav.display()),
            ));
        }
        if let Some(parent) = out_wav.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        info!("Calling Piper TTS for output file {}", out_wav.display());
        self.command(out_wav)?
            .run_with_stdin("tts", Some(text.as_bytes()))
            .await
            .inspect_err(|e| error!("Piper TTS failed for {}: {}", out_wav.display(), e))
    }

    fn duration(&self, wav: &Path) -> ReelResult<f64> {
        wav_duration_seconds(wav)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piper_command() {
        let piper = PiperSynthesizer::new(&TtsConfig::default());
        let cmd = piper.command(Path::new("build/audio/scenes/s1.wav")).unwrap();
        let args: Vec<String> = cmd
            .args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(cmd.program(), "piper");
        assert_eq!(
            args,
            vec![
                "--model",
                "./tts/en_US-hfc_male-medium.onnx",
                "--output_file",
                "build/audio/scenes/s1.wav",
            ]
        );
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        let piper = PiperSynthesizer::new(&TtsConfig::default());
        let err = piper
            .synthesize("   ", Path::new("/tmp/never.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::EmptyInput { .. }));
    }
}
