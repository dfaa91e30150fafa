use hound::WavReader;
use std::path::Path;
use tracing::{info, warn};

use crate::command::FfmpegCommand;
use crate::error::{ReelError, ReelResult};

pub fn wav_duration_seconds(path: &Path) -> ReelResult<f64> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    Ok(frames / spec.sample_rate as f64)
}

/// Concatenates scene WAVs, in the given order, into one narration track.
pub async fn concat_wavs(parts: &[impl AsRef<Path>], out_wav: &Path) -> ReelResult<()> {
    if parts.is_empty() {
        return Err(ReelError::empty_input("narration", "no scene audio to concatenate"));
    }
    let work_dir = out_wav.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(work_dir).await?;

    let mut list = String::new();
    for part in parts {
        let part = part.as_ref();
        if !tokio::fs::try_exists(part).await? {
            return Err(ReelError::missing_asset("narration", part));
        }
        let abs = std::path::absolute(part)?;
        list.push_str(&format!(
            "file '{}'\n",
            abs.to_string_lossy().replace('\'', "'\\''")
        ));
    }
    let list_path = work_dir.join("narration_files.txt");
    tokio::fs::write(&list_path, list).await?;
    info!("Concatenating {} narration parts into {}", parts.len(), out_wav.display());

    let copy = FfmpegCommand::new(out_wav)
        .input_with(["-f", "concat", "-safe", "0"], &list_path)
        .output_arg("-c")
        .output_arg("copy");
    if let Err(e) = copy.run("narration").await {
        warn!("ffmpeg concat with copy failed ({}); retrying with re-encode", e);
        FfmpegCommand::new(out_wav)
            .input_with(["-f", "concat", "-safe", "0"], &list_path)
            .audio_codec("pcm_s16le")
            .run("narration")
            .await?;
    }
    Ok(())
}
