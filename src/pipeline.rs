//! End-to-end run over a project directory.
//!
//! Layout under the project root:
//!
//! ```text
//! video.yaml            authored spec
//! feedback.txt          optional free-text feedback, cleared once consumed
//! images/<id>.png       pre-rendered stills
//! versions/video_vN.yaml
//! build/                recreated on every run
//! ```

use regex::Regex;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::alignment::MfaAligner;
use crate::audio::concat_wavs;
use crate::collab::{
    Aligner, ImageDirectory, ImageGenerator, PatchGenerator, PromptEnhancer, SpeechSynthesizer,
};
use crate::compositor::{CompositionAssets, compose_final_video};
use crate::config::Config;
use crate::error::{ReelError, ReelResult};
use crate::llm::OllamaClient;
use crate::patch::{Strictness, load_patch, merge};
use crate::spec::SceneSpec;
use crate::subtitle::generate_subtitles;
use crate::tts::PiperSynthesizer;
use crate::utils::round_to;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^video_v(\d+)\.yaml$").expect("valid regex"));

/// Every path a run reads or writes.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub root_spec: PathBuf,
    pub feedback: PathBuf,
    pub source_images: PathBuf,
    pub versions: PathBuf,
    pub build: PathBuf,
    pub build_spec: PathBuf,
    pub build_patch: PathBuf,
    pub images: PathBuf,
    pub audio_scenes: PathBuf,
    pub narration: PathBuf,
    pub subtitles: PathBuf,
    pub final_video: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let build = root.join("build");
        Self {
            root_spec: root.join("video.yaml"),
            feedback: root.join("feedback.txt"),
            source_images: root.join("images"),
            versions: root.join("versions"),
            build_spec: build.join("video.yaml"),
            build_patch: build.join("video_patch.yaml"),
            images: build.join("images"),
            audio_scenes: build.join("audio").join("scenes"),
            narration: build.join("audio").join("audio.wav"),
            subtitles: build.join("subtitles").join("subtitles.ass"),
            final_video: build.join("final.mp4"),
            build,
            root,
        }
    }

    /// Wipes `build/` and recreates the directory skeleton.
    pub fn reset_build(&self) -> ReelResult<()> {
        if self.build.exists() {
            std::fs::remove_dir_all(&self.build)?;
        }
        for dir in [&self.build, &self.images, &self.audio_scenes, &self.versions] {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(subs) = self.subtitles.parent() {
            std::fs::create_dir_all(subs)?;
        }
        Ok(())
    }
}

/// The external collaborators one run drives.
pub struct Collaborators<'a> {
    pub images: &'a dyn ImageGenerator,
    pub speech: &'a dyn SpeechSynthesizer,
    pub aligner: &'a dyn Aligner,
    pub patcher: Option<&'a dyn PatchGenerator>,
    /// Rewrites each visual prompt just before its image is rendered.
    pub enhancer: Option<&'a dyn PromptEnhancer>,
}

/// One more than the highest `video_vN.yaml` in `versions`, starting at 1.
pub fn next_version_number(versions: &Path) -> ReelResult<u32> {
    if !versions.exists() {
        return Ok(1);
    }
    let mut best = 0;
    for entry in std::fs::read_dir(versions)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        let Some(caps) = VERSION_RE.captures(&name) else {
            continue;
        };
        if let Ok(n) = caps[1].parse::<u32>() {
            best = best.max(n);
        }
    }
    Ok(best + 1)
}

/// Snapshots the root spec into `versions/` and returns the snapshot path.
pub fn create_versioned_spec(ws: &Workspace) -> ReelResult<PathBuf> {
    if !ws.root_spec.exists() {
        return Err(ReelError::missing_asset("versioning", &ws.root_spec));
    }
    let spec = SceneSpec::load(&ws.root_spec)?;
    let n = next_version_number(&ws.versions)?;
    let out = ws.versions.join(format!("video_v{n}.yaml"));
    spec.save(&out)?;
    info!("Versioned spec created: {}", out.display());
    Ok(out)
}

/// Turns `feedback.txt` into `build/video_patch.yaml`, then clears the feedback.
///
/// Returns `None` when there is no feedback to act on.
pub async fn feedback_to_patch(
    ws: &Workspace,
    spec: &SceneSpec,
    patcher: &dyn PatchGenerator,
) -> ReelResult<Option<PathBuf>> {
    if !ws.feedback.exists() {
        info!("No feedback file found, skipping patch generation");
        return Ok(None);
    }
    let feedback = std::fs::read_to_string(&ws.feedback)?;
    if feedback.trim().is_empty() {
        info!("Feedback file empty, skipping patch generation");
        return Ok(None);
    }

    let patch = patcher.generate_patch(spec, &feedback).await?;
    if let Some(parent) = ws.build_patch.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&ws.build_patch, serde_yaml::to_string(&patch)?)?;
    info!("Patch generated: {}", ws.build_patch.display());
    info!("Feedback used: {}", feedback.trim());

    std::fs::write(&ws.feedback, "")?;
    Ok(Some(ws.build_patch.clone()))
}

/// Applies `build/video_patch.yaml`, when present, leniently onto the build spec.
pub fn merge_build_patch(ws: &Workspace) -> ReelResult<SceneSpec> {
    let spec = SceneSpec::load(&ws.build_spec)?;
    if !ws.build_patch.exists() {
        info!("No patch found, using build spec as-is");
        return Ok(spec);
    }
    let patch = load_patch(&ws.build_patch)?;
    let (merged, summary) = merge(&spec, &patch, Strictness::Lenient)?;
    info!(
        changed = ?summary.changed_scenes,
        ignored = summary.ignored.len(),
        errors = summary.errors.len(),
        "Patch merge summary"
    );
    merged.save(&ws.build_spec)?;
    Ok(merged)
}

/// Sets each scene's duration to its narration length plus `padding`, to 2 places.
pub fn apply_narration_durations(spec: &mut SceneSpec, narration: &[f64], padding: f64) {
    for (scene, secs) in spec.scenes.iter_mut().zip(narration) {
        scene.duration = round_to(secs + padding, 2);
    }
}

/// Synthesizes one WAV per scene, in spec order; returns paths and lengths.
pub async fn synthesize_scenes(
    spec: &SceneSpec,
    speech: &dyn SpeechSynthesizer,
    out_dir: &Path,
) -> ReelResult<(Vec<PathBuf>, Vec<f64>)> {
    let mut paths = Vec::with_capacity(spec.scenes.len());
    let mut durations = Vec::with_capacity(spec.scenes.len());
    for (i, scene) in spec.scenes.iter().enumerate() {
        let wav = out_dir.join(format!("{}.wav", scene.id));
        info!(scene = %scene.id, "Narration {}/{}", i + 1, spec.scenes.len());
        speech.synthesize(&scene.text, &wav).await?;
        let secs = speech.duration(&wav)?;
        info!(scene = %scene.id, "Narration duration: {:.2} seconds", secs);
        paths.push(wav);
        durations.push(secs);
    }
    Ok((paths, durations))
}

/// Everything up to the timed spec: versioning, feedback, merge, images and
/// per-scene narration. Scene durations come back rewritten from narration.
pub async fn prepare(
    ws: &Workspace,
    collab: &Collaborators<'_>,
    cfg: &Config,
) -> ReelResult<(SceneSpec, Vec<PathBuf>)> {
    ws.reset_build()?;

    let version = create_versioned_spec(ws)?;
    std::fs::copy(&version, &ws.build_spec)?;
    info!("Build spec updated: {}", ws.build_spec.display());

    if let Some(patcher) = collab.patcher {
        let spec = SceneSpec::load(&ws.build_spec)?;
        feedback_to_patch(ws, &spec, patcher).await?;
    }
    let mut spec = merge_build_patch(ws)?;

    info!("Rendering {} images (seed {})", spec.scenes.len(), cfg.pipeline.seed);
    let size = (cfg.video.width, cfg.video.height);
    for (i, scene) in spec.scenes.iter().enumerate() {
        let seed = cfg.pipeline.seed + i as u64;
        let scene = match collab.enhancer {
            Some(enhancer) => {
                let mut enhanced = scene.clone();
                enhanced.visual.prompt = enhancer
                    .enhance(
                        &scene.visual.prompt,
                        &cfg.pipeline.image_style,
                        &spec.global.aspect_ratio,
                        seed,
                    )
                    .await;
                debug!(scene = %scene.id, seed, "Enhanced prompt: {}", enhanced.visual.prompt);
                Cow::Owned(enhanced)
            }
            None => Cow::Borrowed(scene),
        };
        let out = ws.images.join(format!("{}.png", scene.id));
        collab.images.render(&scene, &out, size, seed).await?;
    }

    let (wavs, narration) = synthesize_scenes(&spec, collab.speech, &ws.audio_scenes).await?;
    apply_narration_durations(&mut spec, &narration, cfg.duration_padding());
    Ok((spec, wavs))
}

/// Runs the whole pipeline and returns the final video path.
pub async fn run(ws: &Workspace, collab: &Collaborators<'_>, cfg: &Config) -> ReelResult<PathBuf> {
    let (spec, wavs) = prepare(ws, collab, cfg).await?;
    info!(
        "Timed spec: {} scenes, {:.2}s total",
        spec.scenes.len(),
        spec.total_duration()
    );

    concat_wavs(&wavs, &ws.narration).await?;
    info!("Narration saved: {}", ws.narration.display());

    let alignment = collab
        .aligner
        .align(&ws.narration, &spec.transcript(), &ws.build)
        .await?;
    generate_subtitles(&alignment, &ws.subtitles, cfg)?;

    let assets = CompositionAssets {
        images_dir: ws.images.clone(),
        narration: ws.narration.clone(),
        subtitles: ws.subtitles.clone(),
        bgm: None,
        work_dir: ws.build.join("compose"),
        out_path: ws.final_video.clone(),
    };
    compose_final_video(&spec, &assets, cfg).await
}

/// [`run`] with the stock collaborators: pre-rendered images, Piper, MFA and Ollama.
pub async fn run_default(root: &Path, cfg: &Config) -> ReelResult<PathBuf> {
    let ws = Workspace::new(root);
    let images = ImageDirectory::new(&ws.source_images);
    let speech = PiperSynthesizer::new(&cfg.tts);
    let aligner = MfaAligner::new(cfg.align.clone());
    let llm = OllamaClient::new(cfg.llm.clone());

    let has_feedback = std::fs::read_to_string(&ws.feedback)
        .map(|f| !f.trim().is_empty())
        .unwrap_or(false);
    if !has_feedback {
        warn!("No feedback pending; no patch will be generated");
    }

    let collab = Collaborators {
        images: &images,
        speech: &speech,
        aligner: &aligner,
        patcher: has_feedback.then_some(&llm as &dyn PatchGenerator),
        enhancer: cfg
            .pipeline
            .enhance_prompts
            .then_some(&llm as &dyn PromptEnhancer),
    };
    run(&ws, &collab, cfg).await
}
