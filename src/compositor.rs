//! Timeline compositor: stills → animated clips → crossfaded slideshow →
//! narration mux → subtitle burn-in → optional background music.
//!
//! Per-scene clips render concurrently on a bounded pool; every later stage
//! depends on the whole output of the one before it and runs in order. The
//! final stage writes inside the work directory and is moved to the output
//! path only once everything succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::ass_style::override_style_file;
use crate::audio::wav_duration_seconds;
use crate::command::{FfmpegCommand, ensure_program};
use crate::config::{BgmConfig, Config, VideoConfig};
use crate::error::{ReelError, ReelResult};
use crate::spec::{Motion, SceneSpec};

/// Source stills are upscaled by this factor before any crop.
const HEADROOM: f64 = 1.15;
const MAX_ZOOM: f64 = 1.08;
const PAN_ZOOM: f64 = 1.03;

/// Inputs of one render.
#[derive(Debug, Clone)]
pub struct CompositionAssets {
    pub images_dir: PathBuf,
    pub narration: PathBuf,
    pub subtitles: PathBuf,
    /// Background track; falls back to `bgm.track` from the config.
    pub bgm: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub out_path: PathBuf,
}

impl CompositionAssets {
    pub fn image_for(&self, scene_id: &str) -> PathBuf {
        self.images_dir.join(format!("{scene_id}.png"))
    }
}

/// One scene's still-to-clip render.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipJob {
    pub scene_id: String,
    pub image: PathBuf,
    pub clip: PathBuf,
    pub duration: f64,
    pub motion: Motion,
}

/// Exact frame count for `duration` at `fps`, at least one.
pub fn frame_count(duration: f64, fps: u32) -> u64 {
    let frames = (duration * fps as f64).round();
    if frames < 1.0 { 1 } else { frames as u64 }
}

/// `-vf` chain turning a looped still into a moving clip.
pub fn motion_filter(motion: Motion, duration: f64, video: &VideoConfig) -> String {
    let (w, h, fps) = (video.width, video.height, video.fps);
    let frames = frame_count(duration, fps);
    let scale_w = (w as f64 * HEADROOM).round() as u32;
    let scale_h = (h as f64 * HEADROOM).round() as u32;
    let tail = format!("fps={fps},format={}", video.pixel_format);

    let base = format!(
        "scale={scale_w}:{scale_h}:force_original_aspect_ratio=increase,crop={scale_w}:{scale_h},"
    );

    let (zoom, x) = match motion {
        Motion::Static => return format!("{base}scale={w}:{h},{tail}"),
        Motion::SlowZoom => (
            format!("min({MAX_ZOOM},1.0+{:.2}*on/{frames})", MAX_ZOOM - 1.0),
            "iw/2-(iw/zoom/2)".to_string(),
        ),
        Motion::PanLeft => (
            format!("{PAN_ZOOM}"),
            format!("max(0,(iw-iw/zoom)*(1-on/{frames}))"),
        ),
        Motion::PanRight => (
            format!("{PAN_ZOOM}"),
            format!("max(0,(iw-iw/zoom)*(on/{frames}))"),
        ),
    };

    format!(
        "{base}zoompan=z='{zoom}':x='{x}':y='ih/2-(ih/zoom/2)':d={frames}:s={w}x{h}:fps={fps},{tail}"
    )
}

/// Start offset of every pairwise transition in a crossfade chain.
pub fn crossfade_offsets(durations: &[f64], crossfade: f64) -> Vec<f64> {
    if durations.len() < 2 {
        return Vec::new();
    }
    let mut offsets = Vec::with_capacity(durations.len() - 1);
    offsets.push((durations[0] - crossfade).max(0.0));

    let mut timeline = durations[0];
    for i in 2..durations.len() {
        timeline += durations[i - 1] - crossfade;
        offsets.push((timeline - crossfade).max(0.0));
    }
    offsets
}

/// Length of the stitched track: the last transition's offset plus the
/// last clip, i.e. `sum - (n - 1) * crossfade` unless an offset clamped.
pub fn stitched_duration(durations: &[f64], crossfade: f64) -> f64 {
    match durations {
        [] => 0.0,
        [only] => *only,
        [.., last] => crossfade_offsets(durations, crossfade)
            .last()
            .map_or(*last, |offset| offset + last),
    }
}

/// The mux stops at the shorter stream.
pub fn muxed_duration(video: f64, audio: f64) -> f64 {
    video.min(audio)
}

/// `-filter_complex` chaining `xfade` across all inputs; `None` for one clip.
pub fn crossfade_filter(durations: &[f64], crossfade: f64, video: &VideoConfig) -> Option<String> {
    if durations.len() < 2 {
        return None;
    }
    let mut parts = Vec::with_capacity(durations.len());
    let mut current = "0:v".to_string();
    for (i, offset) in crossfade_offsets(durations, crossfade).iter().enumerate() {
        let next = format!("v{}", i + 1);
        parts.push(format!(
            "[{current}][{}:v]xfade=transition=fade:duration={crossfade:.3}:offset={offset:.3}[{next}]",
            i + 1
        ));
        current = next;
    }
    parts.push(format!(
        "[{current}]fps={},format={}[vout]",
        video.fps, video.pixel_format
    ));
    Some(parts.join(";"))
}

/// Foreground/background gain stage followed by a longest-input mix.
pub fn bgm_filter(bgm: &BgmConfig) -> String {
    format!(
        "[0:a]volume={}[fg];[1:a]volume={}[bg];[fg][bg]amix=inputs=2:duration=longest:normalize=0[aout]",
        bgm.foreground_gain, bgm.background_gain
    )
}

fn subtitles_filter(path: &Path) -> String {
    let escaped = path
        .to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace(',', "\\,")
        .replace('\'', "\\'");
    format!("ass={escaped}")
}

/// Renders one still into a CFR clip of exactly `frame_count` frames.
pub async fn render_clip(job: &ClipJob, video: &VideoConfig) -> ReelResult<()> {
    let frames = frame_count(job.duration, video.fps);
    debug!(scene = %job.scene_id, motion = %job.motion, frames, "Rendering scene clip");

    FfmpegCommand::new(&job.clip)
        .input_with(["-loop", "1"], &job.image)
        .duration(job.duration)
        .video_filter(motion_filter(job.motion, job.duration, video))
        .frame_rate(video.fps)
        .frames(frames)
        .video_codec(video.video_codec.as_str())
        .pixel_format(video.pixel_format.as_str())
        .run("scene_clip")
        .await
}

/// Renders every job with at most `video.workers` in flight.
pub async fn render_clips(jobs: &[ClipJob], video: &VideoConfig) -> ReelResult<()> {
    run_bounded(jobs, video.workers, |job| {
        let video = video.clone();
        async move {
            render_clip(&job, &video).await?;
            info!(scene = %job.scene_id, "Clip rendered: {}", job.clip.display());
            Ok::<(), ReelError>(())
        }
    })
    .await
}

/// Drives `render` over `jobs` with at most `workers` futures running.
///
/// The first failure aborts everything still queued or running and is
/// returned as-is.
pub async fn run_bounded<F, Fut>(jobs: &[ClipJob], workers: usize, render: F) -> ReelResult<()>
where
    F: Fn(ClipJob) -> Fut,
    Fut: Future<Output = ReelResult<()>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();

    for job in jobs.iter().cloned() {
        let semaphore = semaphore.clone();
        let work = render(job);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| ReelError::Task {
                stage: "scene_clip",
                message: e.to_string(),
            })?;
            work.await
        });
    }

    while let Some(joined) = set.join_next().await {
        let result = joined.map_err(|e| ReelError::Task {
            stage: "scene_clip",
            message: e.to_string(),
        });
        if let Err(e) = result.and_then(|r| r) {
            set.abort_all();
            return Err(e);
        }
    }
    Ok(())
}

/// Crossfades clips into one video track.
pub async fn stitch_clips(
    clips: &[PathBuf],
    durations: &[f64],
    out_path: &Path,
    video: &VideoConfig,
) -> ReelResult<()> {
    if clips.is_empty() {
        return Err(ReelError::empty_input("stitch", "no clips to stitch"));
    }
    if clips.len() != durations.len() {
        return Err(ReelError::validation(
            None,
            format!(
                "stitch got {} clips but {} durations",
                clips.len(),
                durations.len()
            ),
        ));
    }

    let Some(filter) = crossfade_filter(durations, video.crossfade, video) else {
        return FfmpegCommand::new(out_path)
            .input(&clips[0])
            .video_codec("copy")
            .run("stitch")
            .await;
    };

    let mut cmd = FfmpegCommand::new(out_path);
    for clip in clips {
        cmd = cmd.input(clip);
    }
    cmd.filter_complex(filter)
        .map("[vout]")
        .frame_rate(video.fps)
        .video_codec(video.video_codec.as_str())
        .pixel_format(video.pixel_format.as_str())
        .run("stitch")
        .await
}

/// Attaches the narration; the result ends with the shorter stream.
pub async fn mux_narration(
    video_in: &Path,
    narration: &Path,
    out_path: &Path,
    video: &VideoConfig,
) -> ReelResult<()> {
    FfmpegCommand::new(out_path)
        .input(video_in)
        .input(narration)
        .map("0:v:0")
        .map("1:a:0")
        .video_codec("copy")
        .audio_codec(video.audio_codec.as_str())
        .shortest()
        .run("mux")
        .await
}

pub async fn burn_subtitles(
    video_in: &Path,
    subtitles: &Path,
    out_path: &Path,
    video: &VideoConfig,
) -> ReelResult<()> {
    FfmpegCommand::new(out_path)
        .input(video_in)
        .video_filter(subtitles_filter(subtitles))
        .video_codec(video.video_codec.as_str())
        .pixel_format(video.pixel_format.as_str())
        .audio_codec("copy")
        .run("burn_subtitles")
        .await
}

pub async fn mix_background_music(
    video_in: &Path,
    bgm_track: &Path,
    out_path: &Path,
    video: &VideoConfig,
    bgm: &BgmConfig,
) -> ReelResult<()> {
    FfmpegCommand::new(out_path)
        .input(video_in)
        .input(bgm_track)
        .filter_complex(bgm_filter(bgm))
        .map("0:v")
        .map("[aout]")
        .video_codec("copy")
        .audio_codec(video.audio_codec.as_str())
        .run("bgm_mix")
        .await
}

/// Checks every input up front and plans the per-scene renders.
pub fn plan_clips(
    spec: &SceneSpec,
    assets: &CompositionAssets,
    cfg: &Config,
) -> ReelResult<(Vec<ClipJob>, Option<PathBuf>)> {
    if spec.scenes.is_empty() {
        return Err(ReelError::empty_input("compose", "spec has no scenes"));
    }
    if !assets.narration.exists() {
        return Err(ReelError::missing_asset("compose", &assets.narration));
    }
    if !assets.subtitles.exists() {
        return Err(ReelError::missing_asset("compose", &assets.subtitles));
    }

    let bgm_track = if cfg.bgm.enabled {
        let track = assets
            .bgm
            .clone()
            .or_else(|| cfg.bgm.track.clone())
            .ok_or_else(|| {
                ReelError::validation(
                    None,
                    "background music enabled but no background track supplied",
                )
            })?;
        if !track.exists() {
            return Err(ReelError::missing_asset("bgm_mix", track));
        }
        Some(track)
    } else {
        None
    };

    let clips_dir = assets.work_dir.join("clips");
    let mut jobs = Vec::with_capacity(spec.scenes.len());
    for scene in &spec.scenes {
        let image = assets.image_for(&scene.id);
        if !image.exists() {
            return Err(ReelError::missing_asset("compose", image));
        }
        jobs.push(ClipJob {
            scene_id: scene.id.clone(),
            image,
            clip: clips_dir.join(format!("{}.mp4", scene.id)),
            duration: scene.duration,
            motion: scene.visual.motion,
        });
    }
    Ok((jobs, bgm_track))
}

/// Runs the whole compositing chain and returns the output path.
pub async fn compose_final_video(
    spec: &SceneSpec,
    assets: &CompositionAssets,
    cfg: &Config,
) -> ReelResult<PathBuf> {
    let video = &cfg.video;
    let (jobs, bgm_track) = plan_clips(spec, assets, cfg)?;
    ensure_program("compose", "ffmpeg")?;

    let work = &assets.work_dir;
    tokio::fs::create_dir_all(work).await?;
    let slideshow = work.join("slideshow.mp4");
    let with_audio = work.join("slideshow_with_audio.mp4");
    let ext = assets
        .out_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    let staged = work.join(format!("final_staged.{ext}"));

    info!(
        "Rendering {} scene clips ({} workers)",
        jobs.len(),
        video.workers
    );
    render_clips(&jobs, video).await?;

    let durations: Vec<f64> = jobs.iter().map(|j| j.duration).collect();
    let clips: Vec<PathBuf> = jobs.iter().map(|j| j.clip.clone()).collect();
    let expected = stitched_duration(&durations, video.crossfade);
    info!(
        "Crossfading {} clips (crossfade {:.2}s, expected {:.3}s)",
        clips.len(),
        video.crossfade,
        expected
    );
    stitch_clips(&clips, &durations, &slideshow, video).await?;

    match wav_duration_seconds(&assets.narration) {
        Ok(narration) => info!(
            "Muxing narration ({:.3}s); output will run {:.3}s",
            narration,
            muxed_duration(expected, narration)
        ),
        Err(e) => debug!("Narration duration unavailable: {}", e),
    }
    mux_narration(&slideshow, &assets.narration, &with_audio, video).await?;

    let subtitles = match &cfg.style_override {
        Some(ov) if !ov.is_empty() => {
            let forced = work.join("subtitles_for_burn.ass");
            override_style_file(&assets.subtitles, &forced, ov)?;
            forced
        }
        _ => assets.subtitles.clone(),
    };

    info!("Burning subtitles from {}", subtitles.display());
    match &bgm_track {
        None => burn_subtitles(&with_audio, &subtitles, &staged, video).await?,
        Some(track) => {
            let before_bgm = work.join("before_bgm.mp4");
            burn_subtitles(&with_audio, &subtitles, &before_bgm, video).await?;
            info!("Mixing background music from {}", track.display());
            mix_background_music(&before_bgm, track, &staged, video, &cfg.bgm).await?;
        }
    }

    publish(&staged, &assets.out_path).await?;
    info!("Final video written to {}", assets.out_path.display());
    Ok(assets.out_path.clone())
}

/// Moves the staged result into place, copying across filesystems.
async fn publish(staged: &Path, dst: &Path) -> ReelResult<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::rename(staged, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            warn!("Cross-device move, copying {} -> {}", staged.display(), dst.display());
            let tmp = dst.with_extension("partial");
            tokio::fs::copy(staged, &tmp).await?;
            if let Err(e) = tokio::fs::rename(&tmp, dst).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e.into());
            }
            let _ = tokio::fs::remove_file(staged).await;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
