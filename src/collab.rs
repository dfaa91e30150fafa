//! Interfaces of the external collaborators the pipeline drives.
//!
//! Only the contracts live here; concrete adapters are in `tts`, `llm` and
//! `alignment`. Image rendering has no in-crate backend: [`ImageDirectory`]
//! picks up images rendered elsewhere, keyed by scene id.

use async_trait::async_trait;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ReelError, ReelResult};
use crate::spec::{Scene, SceneSpec};

/// Produces an initial spec from a free-text brief.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate_script(&self, brief: &str) -> ReelResult<SceneSpec>;
}

/// Turns free-text feedback on a spec into a patch document.
#[async_trait]
pub trait PatchGenerator: Send + Sync {
    async fn generate_patch(&self, spec: &SceneSpec, feedback: &str) -> ReelResult<Value>;
}

/// Expands a short image prompt into a detailed single-line one.
///
/// Never fails: on any backend error the trimmed input prompt comes back.
#[async_trait]
pub trait PromptEnhancer: Send + Sync {
    async fn enhance(&self, prompt: &str, style: &str, aspect_ratio: &str, seed: u64) -> String;
}

/// Renders one scene's prompt to a still image at `size`.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn render(
        &self,
        scene: &Scene,
        out_path: &Path,
        size: (u32, u32),
        seed: u64,
    ) -> ReelResult<PathBuf>;
}

/// Renders narration text to a WAV file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, out_wav: &Path) -> ReelResult<()>;

    /// Length of a synthesized file in seconds.
    fn duration(&self, wav: &Path) -> ReelResult<f64>;
}

/// Maps a transcript onto a waveform, returning the word-alignment JSON path.
#[async_trait]
pub trait Aligner: Send + Sync {
    async fn align(&self, narration: &Path, transcript: &str, work_dir: &Path)
    -> ReelResult<PathBuf>;
}

/// Serves pre-rendered `<dir>/<scene id>.png` images.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    dir: PathBuf,
}

impl ImageDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, scene_id: &str) -> PathBuf {
        self.dir.join(format!("{scene_id}.png"))
    }
}

#[async_trait]
impl ImageGenerator for ImageDirectory {
    async fn render(
        &self,
        scene: &Scene,
        out_path: &Path,
        _size: (u32, u32),
        _seed: u64,
    ) -> ReelResult<PathBuf> {
        let source = self.path_for(&scene.id);
        if !tokio::fs::try_exists(&source).await? {
            return Err(ReelError::missing_asset("images", source));
        }
        if source != out_path {
            if let Some(parent) = out_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&source, out_path).await?;
        }
        debug!(scene = %scene.id, "Image ready: {}", out_path.display());
        Ok(out_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Visual;
    use tempfile::TempDir;

    fn scene(id: &str) -> Scene {
        Scene {
            id: id.to_string(),
            duration: 1.0,
            text: String::new(),
            visual: Visual::default(),
        }
    }

    #[tokio::test]
    async fn test_image_directory_copies_into_build() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("s1.png"), b"png").unwrap();

        let images = ImageDirectory::new(&src);
        let out = dir.path().join("build/images/s1.png");
        let got = images.render(&scene("s1"), &out, (720, 1280), 7).await.unwrap();
        assert_eq!(got, out);
        assert_eq!(std::fs::read(&out).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_image_directory_missing() {
        let dir = TempDir::new().unwrap();
        let images = ImageDirectory::new(dir.path());
        let err = images
            .render(&scene("s2"), &dir.path().join("s2.png"), (1, 1), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::MissingAsset { stage: "images", .. }));
    }
}
