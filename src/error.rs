//! Error types shared by every stage.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for reelsmith operations.
pub type ReelResult<T> = Result<T, ReelError>;

/// Errors that can occur while patching, captioning or compositing.
#[derive(Debug, Error)]
pub enum ReelError {
    /// Malformed spec or patch structure.
    #[error("schema error{}: {message}", scope(.scene))]
    Schema {
        scene: Option<String>,
        message: String,
    },

    /// A field value is present but semantically invalid.
    #[error("validation error{}: {message}", scope(.scene))]
    Validation {
        scene: Option<String>,
        message: String,
    },

    #[error("[{stage}] missing asset: {}", .path.display())]
    MissingAsset { stage: &'static str, path: PathBuf },

    #[error("[{stage}] {program} failed{}: {stderr}", exit_suffix(.exit_code))]
    ExternalTool {
        stage: &'static str,
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("[{stage}] {program} not found in PATH")]
    ToolNotFound {
        stage: &'static str,
        program: String,
    },

    #[error("[{stage}] empty input: {reason}")]
    EmptyInput { stage: &'static str, reason: String },

    #[error("[{stage}] worker task failed: {message}")]
    Task {
        stage: &'static str,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

fn scope(scene: &Option<String>) -> String {
    match scene {
        Some(id) => format!(" in scene '{id}'"),
        None => String::new(),
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => " (terminated by signal)".to_string(),
    }
}

impl ReelError {
    pub fn schema(scene: Option<&str>, message: impl Into<String>) -> Self {
        Self::Schema {
            scene: scene.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn validation(scene: Option<&str>, message: impl Into<String>) -> Self {
        Self::Validation {
            scene: scene.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn missing_asset(stage: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::MissingAsset {
            stage,
            path: path.into(),
        }
    }

    pub fn empty_input(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::EmptyInput {
            stage,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_stage_and_path() {
        let err = ReelError::missing_asset("compose", "build/images/s1.png");
        assert_eq!(
            err.to_string(),
            "[compose] missing asset: build/images/s1.png"
        );

        let err = ReelError::ExternalTool {
            stage: "stitch",
            program: "ffmpeg".into(),
            exit_code: Some(1),
            stderr: "Invalid argument".into(),
        };
        assert_eq!(
            err.to_string(),
            "[stitch] ffmpeg failed with exit code 1: Invalid argument"
        );
    }

    #[test]
    fn test_schema_scope() {
        let err = ReelError::validation(Some("s2"), "duration became <= 0");
        assert_eq!(
            err.to_string(),
            "validation error in scene 's2': duration became <= 0"
        );
        let err = ReelError::schema(None, "patch missing top-level key 'scenes'");
        assert_eq!(
            err.to_string(),
            "schema error: patch missing top-level key 'scenes'"
        );
    }
}
