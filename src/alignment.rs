//! Word-level forced alignment: the interchange JSON and the `mfa` adapter.
//!
//! The aligner's JSON looks like
//! `{"tiers": {"words": {"type": "interval", "entries": [[start, end, "word"], ...]}}}`.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::collab::Aligner;
use crate::command::{FfmpegCommand, ToolCommand};
use crate::config::AlignConfig;
use crate::error::{ReelError, ReelResult};
use crate::subtitle::WordInterval;
use crate::utils::normalize_transcript;

const ENTRIES_PATH: &str = "tiers.words.entries";

/// Extracts word intervals from alignment JSON text.
///
/// Entries that are not `[start, end, label]` triples are skipped. An empty
/// result is returned as-is; deciding that no words is fatal is up to the
/// caller.
pub fn parse_word_intervals(json: &str, source: &str) -> ReelResult<Vec<WordInterval>> {
    let data: Value = serde_json::from_str(json)?;

    let entries = data
        .get("tiers")
        .and_then(|t| t.get("words"))
        .and_then(|w| w.get("entries"))
        .ok_or_else(|| {
            let found = match &data {
                Value::Object(map) => map.keys().cloned().collect::<Vec<_>>().join(", "),
                other => format!("<{}>", json_type(other)),
            };
            ReelError::schema(
                None,
                format!(
                    "could not extract words from alignment JSON {source}: expected \
                     {ENTRIES_PATH}; top-level keys found: [{found}]"
                ),
            )
        })?;

    let Value::Array(entries) = entries else {
        return Err(ReelError::schema(
            None,
            format!("{ENTRIES_PATH} is not a list in {source}"),
        ));
    };

    let mut words = Vec::with_capacity(entries.len());
    let mut skipped = 0usize;
    for entry in entries {
        match entry_to_word(entry) {
            Some(w) => words.push(w),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {} malformed alignment entries in {}", skipped, source);
    }
    Ok(words)
}

fn entry_to_word(entry: &Value) -> Option<WordInterval> {
    let [start, end, label] = entry.as_array()?.as_slice() else {
        return None;
    };
    let label = match label {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    Some(WordInterval::new(label, start.as_f64()?, end.as_f64()?))
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn load_word_intervals(path: &Path) -> ReelResult<Vec<WordInterval>> {
    if !path.exists() {
        return Err(ReelError::missing_asset("subtitles", path));
    }
    let text = std::fs::read_to_string(path)?;
    parse_word_intervals(&text, &path.display().to_string())
}

/// Montreal Forced Aligner driven through its CLI.
#[derive(Debug, Clone)]
pub struct MfaAligner {
    cfg: AlignConfig,
}

impl MfaAligner {
    pub fn new(cfg: AlignConfig) -> Self {
        Self { cfg }
    }

    /// `mfa align <corpus> <dictionary> <acoustic> <out> --clean --output_format json [--single_speaker]`
    pub fn align_command(&self, corpus: &Path, out_dir: &Path) -> ReelResult<ToolCommand> {
        let mut cmd = ToolCommand::new(&self.cfg.program)
            .arg("align")?
            .path_arg(corpus)
            .arg(self.cfg.dictionary.as_str())?
            .arg(self.cfg.acoustic_model.as_str())?
            .path_arg(out_dir)
            .args_from(["--clean", "--output_format", "json"])?;
        if self.cfg.single_speaker {
            cmd = cmd.arg("--single_speaker")?;
        }
        Ok(cmd)
    }

    fn download_command(&self, kind: &str, name: &str) -> ReelResult<ToolCommand> {
        ToolCommand::new(&self.cfg.program).args_from(["model", "download", kind, name])
    }

    /// Writes the aligner's corpus: 16 kHz mono PCM audio plus the normalized transcript.
    pub async fn prepare_corpus(
        &self,
        narration: &Path,
        transcript: &str,
        corpus: &Path,
    ) -> ReelResult<()> {
        tokio::fs::create_dir_all(corpus).await?;

        let normalized = normalize_transcript(transcript);
        if normalized.is_empty() {
            return Err(ReelError::empty_input("align", "transcript has no alignable words"));
        }
        tokio::fs::write(corpus.join("audio.txt"), format!("{normalized}\n")).await?;
        info!("Alignment transcript: {}", normalized);

        FfmpegCommand::new(corpus.join("audio.wav"))
            .input(narration)
            .output_arg("-ac")
            .output_arg("1")
            .output_arg("-ar")
            .output_arg(self.cfg.sample_rate.to_string())
            .audio_codec("pcm_s16le")
            .run("align")
            .await
    }
}

#[async_trait]
impl Aligner for MfaAligner {
    async fn align(
        &self,
        narration: &Path,
        transcript: &str,
        work_dir: &Path,
    ) -> ReelResult<PathBuf> {
        if !tokio::fs::try_exists(narration).await? {
            return Err(ReelError::missing_asset("align", narration));
        }
        let corpus = work_dir.join("mfa_input");
        let out_dir = work_dir.join("mfa_output");

        self.prepare_corpus(narration, transcript, &corpus).await?;

        if self.cfg.download_models {
            self.download_command("dictionary", &self.cfg.dictionary)?
                .run("align")
                .await?;
            self.download_command("acoustic", &self.cfg.acoustic_model)?
                .run("align")
                .await?;
        }

        if tokio::fs::try_exists(&out_dir).await? {
            tokio::fs::remove_dir_all(&out_dir).await?;
        }
        tokio::fs::create_dir_all(&out_dir).await?;

        info!("Running forced alignment...");
        self.align_command(&corpus, &out_dir)?.run("align").await?;

        let json_path = out_dir.join("audio.json");
        if !tokio::fs::try_exists(&json_path).await? {
            return Err(ReelError::missing_asset("align", json_path));
        }
        info!("Alignment JSON: {}", json_path.display());
        Ok(json_path)
    }
}
