//! Sparse, validated edits to a [`SceneSpec`].
//!
//! A patch document looks like:
//!
//! ```yaml
//! scenes:
//!   s2:
//!     duration: -1.0            # relative delta
//!     text: "replacement text"  # full replacement
//!     visual:
//!       prompt_adjustment: "less detail"   # appended with ", "
//!       motion: pan_right
//! ```
//!
//! Merging never touches the input spec. One pass over the patch yields the
//! new spec together with every diagnostic; [`Strictness`] only decides what
//! happens to that list afterwards.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{ReelError, ReelResult};
use crate::spec::{Motion, Scene, SceneSpec};
use crate::utils::round_to;

const SCENE_FIELDS: [&str; 3] = ["duration", "text", "visual"];
const VISUAL_FIELDS: [&str; 3] = ["prompt_adjustment", "motion", "prompt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Abort on the first schema or validation problem.
    Strict,
    /// Record problems in the summary and keep going.
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Explicit null; nothing to do.
    NoOp,
    Schema,
    /// The patch tried to set something patches may not set.
    Disallowed,
    Validation,
}

impl DiagnosticKind {
    fn is_fatal_when_strict(self) -> bool {
        !matches!(self, DiagnosticKind::NoOp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub scene: Option<String>,
    pub message: String,
}

impl Diagnostic {
    fn into_error(self) -> ReelError {
        match self.kind {
            DiagnosticKind::Validation => ReelError::Validation {
                scene: self.scene,
                message: self.message,
            },
            _ => ReelError::Schema {
                scene: self.scene,
                message: self.message,
            },
        }
    }
}

/// Everything a merge pass produced, before strictness is applied.
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub spec: SceneSpec,
    pub changed_scenes: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatchSummary {
    pub changed_scenes: Vec<String>,
    pub ignored: Vec<String>,
    pub errors: Vec<String>,
}

impl PatchSummary {
    pub fn is_empty(&self) -> bool {
        self.changed_scenes.is_empty() && self.ignored.is_empty() && self.errors.is_empty()
    }
}

impl MergeReport {
    /// Applies the strictness policy to the collected diagnostics.
    pub fn resolve(self, strictness: Strictness) -> ReelResult<(SceneSpec, PatchSummary)> {
        if strictness == Strictness::Strict {
            if let Some(diag) = self
                .diagnostics
                .iter()
                .find(|d| d.kind.is_fatal_when_strict())
            {
                return Err(diag.clone().into_error());
            }
        }

        let mut summary = PatchSummary {
            changed_scenes: self.changed_scenes,
            ..Default::default()
        };
        for diag in self.diagnostics {
            match diag.kind {
                DiagnosticKind::Validation => summary.errors.push(diag.message),
                _ => summary.ignored.push(diag.message),
            }
        }
        Ok((self.spec, summary))
    }
}

/// Merges `patch` into a copy of `spec`.
pub fn merge(
    spec: &SceneSpec,
    patch: &Value,
    strictness: Strictness,
) -> ReelResult<(SceneSpec, PatchSummary)> {
    let (new_spec, summary) = apply(spec, patch).resolve(strictness)?;
    for msg in summary.ignored.iter().chain(&summary.errors) {
        warn!("patch: {}", msg);
    }
    debug!(changed = ?summary.changed_scenes, "patch merged");
    Ok((new_spec, summary))
}

/// Reads a patch file. An empty file is the empty patch.
pub fn load_patch(path: &Path) -> ReelResult<Value> {
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_yaml::from_str(&text)?)
}

/// Runs one merge pass, collecting every diagnostic.
pub fn apply(spec: &SceneSpec, patch: &Value) -> MergeReport {
    let mut report = MergeReport {
        spec: spec.clone(),
        changed_scenes: Vec::new(),
        diagnostics: Vec::new(),
    };

    let root = match patch {
        Value::Null => return report,
        Value::Mapping(m) => m,
        _ => {
            report.push(
                DiagnosticKind::Schema,
                None,
                "Patch must be a mapping with top-level key 'scenes'.",
            );
            return report;
        }
    };

    for key in root.keys() {
        if key.as_str() != Some("scenes") {
            report.push(
                DiagnosticKind::Schema,
                None,
                format!("Unknown top-level key {} in patch.", key_label(key)),
            );
        }
    }

    let scenes = match root.get("scenes") {
        None => {
            report.push(
                DiagnosticKind::Schema,
                None,
                "Patch missing top-level key 'scenes'.",
            );
            return report;
        }
        Some(Value::Null) => return report,
        Some(Value::Mapping(m)) => m,
        Some(_) => {
            report.push(
                DiagnosticKind::Schema,
                None,
                "Patch 'scenes' must be a mapping of scene_id -> edits.",
            );
            return report;
        }
    };

    for (key, edits) in scenes {
        let Some(scene_id) = key.as_str() else {
            report.push(
                DiagnosticKind::Schema,
                None,
                format!("Unknown scene_id {} in patch.", key_label(key)),
            );
            continue;
        };
        let Some(idx) = report.spec.scenes.iter().position(|s| s.id == scene_id) else {
            report.push(
                DiagnosticKind::Schema,
                Some(scene_id),
                format!("Unknown scene_id '{scene_id}' in patch."),
            );
            continue;
        };
        let Value::Mapping(edits) = edits else {
            report.push(
                DiagnosticKind::Schema,
                Some(scene_id),
                format!("Edits for scene '{scene_id}' must be a mapping."),
            );
            continue;
        };

        let mut scene = report.spec.scenes[idx].clone();
        let changed = apply_scene_edits(&mut scene, edits, &mut report);
        if changed {
            report.spec.scenes[idx] = scene;
            report.changed_scenes.push(scene_id.to_string());
        }
    }

    report
}

impl MergeReport {
    fn push(&mut self, kind: DiagnosticKind, scene: Option<&str>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            kind,
            scene: scene.map(str::to_string),
            message: message.into(),
        });
    }
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => format!("'{s}'"),
        other => serde_yaml::to_string(other)
            .map(|s| format!("'{}'", s.trim()))
            .unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}

/// Returns whether the scene actually changed.
fn apply_scene_edits(scene: &mut Scene, edits: &Mapping, report: &mut MergeReport) -> bool {
    let id = scene.id.clone();
    let id = id.as_str();
    let before = scene.clone();

    for key in edits.keys() {
        if !key.as_str().is_some_and(|k| SCENE_FIELDS.contains(&k)) {
            report.push(
                DiagnosticKind::Disallowed,
                Some(id),
                format!(
                    "Scene '{id}': field {} cannot be patched.",
                    key_label(key)
                ),
            );
        }
    }

    if let Some(delta) = edits.get("duration") {
        match delta {
            Value::Null => report.push(
                DiagnosticKind::NoOp,
                Some(id),
                format!("Ignored duration=null for {id}"),
            ),
            Value::Number(n) => match n.as_f64().filter(|d| d.is_finite()) {
                Some(delta) => {
                    let new = round_to(scene.duration + delta, 3);
                    if !new.is_finite() {
                        report.push(
                            DiagnosticKind::Validation,
                            Some(id),
                            format!("Scene '{id}': duration overflowed after patch ({new})."),
                        );
                    } else if new <= 0.0 {
                        report.push(
                            DiagnosticKind::Validation,
                            Some(id),
                            format!("Scene '{id}': duration became <= 0 after patch ({new})."),
                        );
                    } else {
                        scene.duration = new;
                    }
                }
                None => report.push(
                    DiagnosticKind::Validation,
                    Some(id),
                    format!("Scene '{id}': duration delta must be a finite number. Got: {n}"),
                ),
            },
            other => report.push(
                DiagnosticKind::Validation,
                Some(id),
                format!(
                    "Scene '{id}': duration must be a number delta (+/-). Got: {}",
                    type_name(other)
                ),
            ),
        }
    }

    if let Some(text) = edits.get("text") {
        match text {
            Value::Null => report.push(
                DiagnosticKind::NoOp,
                Some(id),
                format!("Ignored text=null for {id}"),
            ),
            Value::String(t) => scene.text = t.trim().to_string(),
            other => report.push(
                DiagnosticKind::Validation,
                Some(id),
                format!(
                    "Scene '{id}': text must be a string. Got: {}",
                    type_name(other)
                ),
            ),
        }
    }

    if let Some(visual) = edits.get("visual") {
        match visual {
            Value::Null => report.push(
                DiagnosticKind::NoOp,
                Some(id),
                format!("Ignored visual=null for {id}"),
            ),
            Value::Mapping(v) => apply_visual_edits(scene, v, report),
            other => report.push(
                DiagnosticKind::Validation,
                Some(id),
                format!(
                    "Scene '{id}': visual must be a mapping. Got: {}",
                    type_name(other)
                ),
            ),
        }
    }

    *scene != before
}

fn apply_visual_edits(scene: &mut Scene, edits: &Mapping, report: &mut MergeReport) {
    let id = scene.id.clone();
    let id = id.as_str();

    for key in edits.keys() {
        if !key.as_str().is_some_and(|k| VISUAL_FIELDS.contains(&k)) {
            report.push(
                DiagnosticKind::Disallowed,
                Some(id),
                format!(
                    "Scene '{id}': field visual.{} cannot be patched.",
                    key_label(key).trim_matches('\'')
                ),
            );
        }
    }

    if let Some(adj) = edits.get("prompt_adjustment") {
        match adj {
            Value::Null => report.push(
                DiagnosticKind::NoOp,
                Some(id),
                format!("Ignored prompt_adjustment=null for {id}"),
            ),
            Value::String(adj) => {
                let base = scene.visual.prompt.trim();
                let adj = adj.trim();
                if !adj.is_empty() {
                    scene.visual.prompt = if base.is_empty() {
                        adj.to_string()
                    } else {
                        format!("{base}, {adj}")
                    };
                }
            }
            other => report.push(
                DiagnosticKind::Validation,
                Some(id),
                format!(
                    "Scene '{id}': prompt_adjustment must be a string. Got: {}",
                    type_name(other)
                ),
            ),
        }
    }

    if let Some(motion) = edits.get("motion") {
        match motion {
            Value::Null => report.push(
                DiagnosticKind::NoOp,
                Some(id),
                format!("Ignored motion=null for {id}"),
            ),
            Value::String(raw) => match Motion::parse(raw) {
                Some(m) => scene.visual.motion = m,
                None => report.push(
                    DiagnosticKind::Validation,
                    Some(id),
                    format!(
                        "Scene '{id}': motion '{}' invalid. Allowed: {}",
                        raw.trim(),
                        Motion::allowed()
                    ),
                ),
            },
            other => report.push(
                DiagnosticKind::Validation,
                Some(id),
                format!(
                    "Scene '{id}': motion must be a string. Got: {}",
                    type_name(other)
                ),
            ),
        }
    }

    if edits.contains_key("prompt") {
        report.push(
            DiagnosticKind::Disallowed,
            Some(id),
            format!(
                "Scene '{id}': patch attempted to set 'visual.prompt'. Use prompt_adjustment only."
            ),
        );
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> SceneSpec {
        SceneSpec::from_yaml_str(
            r#"
global: { aspect_ratio: "9:16", title: t, description: d }
scenes:
  - id: s1
    duration: 3.0
    text: "first"
    visual: { prompt: "a red fox", motion: slow_zoom }
  - id: s2
    duration: 2.0
    text: "second"
    visual: { prompt: "", motion: static }
"#,
        )
        .unwrap()
    }

    fn patch(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let s = spec();
        for p in ["scenes: {}", "~", "scenes:"] {
            for mode in [Strictness::Strict, Strictness::Lenient] {
                let (out, summary) = merge(&s, &patch(p), mode).unwrap();
                assert_eq!(out, s);
                assert!(summary.is_empty(), "{p}: {summary:?}");
            }
        }
    }

    #[test]
    fn test_duration_delta_rounds() {
        let (out, summary) = merge(
            &spec(),
            &patch("scenes: { s1: { duration: -0.1234 } }"),
            Strictness::Strict,
        )
        .unwrap();
        assert_eq!(out.scenes[0].duration, 2.877);
        assert_eq!(summary.changed_scenes, vec!["s1"]);
    }

    #[test]
    fn test_non_positive_duration() {
        let s = spec();
        let p = patch("scenes: { s2: { duration: -2.0 } }");
        let err = merge(&s, &p, Strictness::Strict).unwrap_err();
        assert!(matches!(err, ReelError::Validation { .. }));

        let (out, summary) = merge(&s, &p, Strictness::Lenient).unwrap();
        assert_eq!(out.scenes[1].duration, 2.0);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.changed_scenes.is_empty());
    }

    #[test]
    fn test_overflowing_duration_delta() {
        let s = spec();
        let p = patch("scenes: { s1: { duration: 1.0e306 } }");
        let err = merge(&s, &p, Strictness::Strict).unwrap_err();
        assert!(matches!(err, ReelError::Validation { .. }));

        let (out, summary) = merge(&s, &p, Strictness::Lenient).unwrap();
        assert_eq!(out.scenes[0].duration, 3.0);
        assert!(summary.changed_scenes.is_empty());
        assert_eq!(summary.errors.len(), 1);
        out.validate().unwrap();
    }

    #[test]
    fn test_null_duration_is_noop_even_when_strict() {
        let (out, summary) = merge(
            &spec(),
            &patch("scenes: { s1: { duration: null } }"),
            Strictness::Strict,
        )
        .unwrap();
        assert_eq!(out, spec());
        assert_eq!(summary.ignored, vec!["Ignored duration=null for s1"]);
    }

    #[test]
    fn test_text_replaced_and_trimmed() {
        let (out, _) = merge(
            &spec(),
            &patch("scenes: { s2: { text: '  brand new line  ' } }"),
            Strictness::Strict,
        )
        .unwrap();
        assert_eq!(out.scenes[1].text, "brand new line");
    }

    #[test]
    fn test_wrong_types_are_validation_errors() {
        let p = patch("scenes: { s1: { text: 5, duration: 'long' } }");
        let (out, summary) = merge(&spec(), &p, Strictness::Lenient).unwrap();
        assert_eq!(out, spec());
        assert_eq!(summary.errors.len(), 2);
        assert!(merge(&spec(), &p, Strictness::Strict).is_err());
    }

    #[test]
    fn test_prompt_adjustment_appends() {
        let (out, _) = merge(
            &spec(),
            &patch("scenes: { s1: { visual: { prompt_adjustment: 'softer light' } } }"),
            Strictness::Strict,
        )
        .unwrap();
        assert_eq!(out.scenes[0].visual.prompt, "a red fox, softer light");
    }

    #[test]
    fn test_prompt_adjustments_accumulate_from_empty() {
        let s = spec();
        let (once, _) = merge(
            &s,
            &patch("scenes: { s2: { visual: { prompt_adjustment: x } } }"),
            Strictness::Strict,
        )
        .unwrap();
        let (twice, _) = merge(
            &once,
            &patch("scenes: { s2: { visual: { prompt_adjustment: y } } }"),
            Strictness::Strict,
        )
        .unwrap();
        assert_eq!(twice.scenes[1].visual.prompt, "x, y");
    }

    #[test]
    fn test_same_motion_twice_is_stable() {
        let p = patch("scenes: { s1: { visual: { motion: pan_right } } }");
        let (once, summary) = merge(&spec(), &p, Strictness::Strict).unwrap();
        assert_eq!(once.scenes[0].visual.motion, Motion::PanRight);
        assert_eq!(summary.changed_scenes, vec!["s1"]);

        let (twice, summary) = merge(&once, &p, Strictness::Strict).unwrap();
        assert_eq!(twice, once);
        assert!(summary.changed_scenes.is_empty());
    }

    #[test]
    fn test_invalid_motion() {
        let p = patch("scenes: { s1: { visual: { motion: dolly_zoom } } }");
        assert!(merge(&spec(), &p, Strictness::Strict).is_err());
        let (out, summary) = merge(&spec(), &p, Strictness::Lenient).unwrap();
        assert_eq!(out.scenes[0].visual.motion, Motion::SlowZoom);
        assert_eq!(summary.errors.len(), 1);
    }

    #[test]
    fn test_absolute_prompt_rejected() {
        let p = patch("scenes: { s1: { visual: { prompt: 'a blue whale' } } }");
        let err = merge(&spec(), &p, Strictness::Strict).unwrap_err();
        assert!(matches!(err, ReelError::Schema { .. }));

        let (out, summary) = merge(&spec(), &p, Strictness::Lenient).unwrap();
        assert_eq!(out.scenes[0].visual.prompt, "a red fox");
        assert_eq!(summary.ignored.len(), 1);
        assert!(summary.errors.is_empty());
    }

    #[test]
    fn test_unknown_scene_lenient() {
        let p = patch("scenes: { s9: { text: hi }, s2: { duration: 1.0 } }");
        let (out, summary) = merge(&spec(), &p, Strictness::Lenient).unwrap();
        assert_eq!(out.scenes[0], spec().scenes[0]);
        assert_eq!(out.scenes[1].duration, 3.0);
        assert_eq!(summary.ignored, vec!["Unknown scene_id 's9' in patch."]);
        assert!(merge(&spec(), &p, Strictness::Strict).is_err());
    }

    #[test]
    fn test_missing_scenes_key() {
        let p = patch("shots: {}");
        assert!(merge(&spec(), &p, Strictness::Strict).is_err());
        let (out, summary) = merge(&spec(), &p, Strictness::Lenient).unwrap();
        assert_eq!(out, spec());
        assert!(!summary.ignored.is_empty());
    }

    #[test]
    fn test_non_mapping_edits() {
        let p = patch("scenes: { s1: [1, 2] }");
        assert!(merge(&spec(), &p, Strictness::Strict).is_err());
        let (_, summary) = merge(&spec(), &p, Strictness::Lenient).unwrap();
        assert_eq!(summary.ignored, vec!["Edits for scene 's1' must be a mapping."]);
    }

    #[test]
    fn test_new_fields_disallowed() {
        let p = patch("scenes: { s1: { camera: crane, visual: { lens: 35mm } } }");
        assert!(merge(&spec(), &p, Strictness::Strict).is_err());
        let (out, summary) = merge(&spec(), &p, Strictness::Lenient).unwrap();
        assert_eq!(out, spec());
        assert_eq!(summary.ignored.len(), 2);
    }

    #[test]
    fn test_input_spec_untouched() {
        let s = spec();
        let snapshot = s.clone();
        let _ = merge(
            &s,
            &patch("scenes: { s1: { duration: 1, text: changed } }"),
            Strictness::Lenient,
        )
        .unwrap();
        assert_eq!(s, snapshot);
    }
}
