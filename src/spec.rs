//! Scene specification shared by the patch engine and the compositor.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::error::{ReelError, ReelResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSpec {
    #[serde(default)]
    pub global: GlobalMeta,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalMeta {
    pub aspect_ratio: String,
    pub title: String,
    pub description: String,
}

impl Default for GlobalMeta {
    fn default() -> Self {
        Self {
            aspect_ratio: "9:16".to_string(),
            title: String::new(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    /// Seconds; always > 0.
    pub duration: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub visual: Visual,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub motion: Motion,
}

/// Camera movement applied to a scene's still image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "&'static str")]
pub enum Motion {
    #[default]
    SlowZoom,
    PanLeft,
    PanRight,
    Static,
}

impl Motion {
    pub const ALL: [Motion; 4] = [
        Motion::SlowZoom,
        Motion::PanLeft,
        Motion::PanRight,
        Motion::Static,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Motion::SlowZoom => "slow_zoom",
            Motion::PanLeft => "pan_left",
            Motion::PanRight => "pan_right",
            Motion::Static => "static",
        }
    }

    /// Strict parse; `None` for anything outside the four presets.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s.trim())
    }

    pub fn allowed() -> String {
        Self::ALL.map(Motion::as_str).join(", ")
    }
}

impl From<Option<String>> for Motion {
    fn from(raw: Option<String>) -> Self {
        match raw {
            None => Motion::default(),
            Some(s) => Motion::parse(&s).unwrap_or_else(|| {
                warn!("Unknown motion '{}', falling back to slow_zoom", s);
                Motion::default()
            }),
        }
    }
}

impl From<Motion> for &'static str {
    fn from(m: Motion) -> Self {
        m.as_str()
    }
}

impl fmt::Display for Motion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SceneSpec {
    pub fn from_yaml_str(text: &str) -> ReelResult<Self> {
        let spec: SceneSpec = serde_yaml::from_str(text)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn load(path: &Path) -> ReelResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml_string(&self) -> ReelResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save(&self, path: &Path) -> ReelResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_yaml_string()?)?;
        Ok(())
    }

    /// Checks id uniqueness and duration positivity.
    pub fn validate(&self) -> ReelResult<()> {
        let mut seen = HashSet::new();
        for scene in &self.scenes {
            if scene.id.trim().is_empty() {
                return Err(ReelError::schema(None, "scene id must be a non-empty string"));
            }
            if !seen.insert(scene.id.as_str()) {
                return Err(ReelError::schema(
                    Some(&scene.id),
                    format!("duplicate scene id '{}'", scene.id),
                ));
            }
            if !(scene.duration.is_finite() && scene.duration > 0.0) {
                return Err(ReelError::validation(
                    Some(&scene.id),
                    format!("duration must be > 0, got {}", scene.duration),
                ));
            }
        }
        Ok(())
    }

    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub fn total_duration(&self) -> f64 {
        self.scenes.iter().map(|s| s.duration).sum()
    }

    /// Narration text of every scene, in playback order.
    pub fn transcript(&self) -> String {
        self.scenes
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"
global:
  aspect_ratio: "9:16"
  title: "Why the sky is blue"
  description: "Short explainer"
scenes:
  - id: s1
    duration: 3.0
    text: "Sunlight is a mix of colors."
    visual:
      prompt: "sunlight through a prism"
      motion: pan_left
  - id: s2
    duration: 2.5
    text: "  Blue scatters the most.  "
    visual:
      prompt: "blue sky"
"#;

    #[test]
    fn test_parse_spec() {
        let spec = SceneSpec::from_yaml_str(SPEC).unwrap();
        assert_eq!(spec.scenes.len(), 2);
        assert_eq!(spec.scenes[0].visual.motion, Motion::PanLeft);
        assert_eq!(spec.scenes[1].visual.motion, Motion::SlowZoom);
        assert_eq!(spec.global.title, "Why the sky is blue");
        assert_eq!(spec.total_duration(), 5.5);
    }

    #[test]
    fn test_unknown_motion_falls_back() {
        let spec = SceneSpec::from_yaml_str(
            "scenes:\n  - id: a\n    duration: 1\n    visual:\n      motion: dolly\n",
        )
        .unwrap();
        assert_eq!(spec.scenes[0].visual.motion, Motion::SlowZoom);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = SceneSpec::from_yaml_str(
            "scenes:\n  - id: a\n    duration: 1\n  - id: a\n    duration: 2\n",
        )
        .unwrap_err();
        assert!(matches!(err, ReelError::Schema { .. }));
    }

    #[test]
    fn test_non_positive_duration_rejected() {
        let err = SceneSpec::from_yaml_str("scenes:\n  - id: a\n    duration: 0\n").unwrap_err();
        assert!(matches!(err, ReelError::Validation { .. }));
    }

    #[test]
    fn test_transcript_and_roundtrip() {
        let spec = SceneSpec::from_yaml_str(SPEC).unwrap();
        assert_eq!(
            spec.transcript(),
            "Sunlight is a mix of colors. Blue scatters the most."
        );
        let again = SceneSpec::from_yaml_str(&spec.to_yaml_string().unwrap()).unwrap();
        assert_eq!(again, spec);
    }
}
