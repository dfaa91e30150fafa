//! Named-field view of an ASS v4+ style line.
//!
//! Every column is kept as its raw text so a parse/serialize cycle that
//! changes one field leaves the other columns byte-for-byte identical.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::ReelResult;

/// Column order of the `[V4+ Styles]` section.
pub const STYLE_FORMAT: [&str; 23] = [
    "Name",
    "Fontname",
    "Fontsize",
    "PrimaryColour",
    "SecondaryColour",
    "OutlineColour",
    "BackColour",
    "Bold",
    "Italic",
    "Underline",
    "StrikeOut",
    "ScaleX",
    "ScaleY",
    "Spacing",
    "Angle",
    "BorderStyle",
    "Outline",
    "Shadow",
    "Alignment",
    "MarginL",
    "MarginR",
    "MarginV",
    "Encoding",
];

const STYLE_PREFIX: &str = "Style: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssStyle {
    pub name: String,
    pub fontname: String,
    pub fontsize: String,
    pub primary_colour: String,
    pub secondary_colour: String,
    pub outline_colour: String,
    pub back_colour: String,
    pub bold: String,
    pub italic: String,
    pub underline: String,
    pub strike_out: String,
    pub scale_x: String,
    pub scale_y: String,
    pub spacing: String,
    pub angle: String,
    pub border_style: String,
    pub outline: String,
    pub shadow: String,
    pub alignment: String,
    pub margin_l: String,
    pub margin_r: String,
    pub margin_v: String,
    pub encoding: String,
}

impl AssStyle {
    fn columns(&self) -> [&String; 23] {
        [
            &self.name,
            &self.fontname,
            &self.fontsize,
            &self.primary_colour,
            &self.secondary_colour,
            &self.outline_colour,
            &self.back_colour,
            &self.bold,
            &self.italic,
            &self.underline,
            &self.strike_out,
            &self.scale_x,
            &self.scale_y,
            &self.spacing,
            &self.angle,
            &self.border_style,
            &self.outline,
            &self.shadow,
            &self.alignment,
            &self.margin_l,
            &self.margin_r,
            &self.margin_v,
            &self.encoding,
        ]
    }

    fn from_columns(c: [String; 23]) -> Self {
        let [
            name,
            fontname,
            fontsize,
            primary_colour,
            secondary_colour,
            outline_colour,
            back_colour,
            bold,
            italic,
            underline,
            strike_out,
            scale_x,
            scale_y,
            spacing,
            angle,
            border_style,
            outline,
            shadow,
            alignment,
            margin_l,
            margin_r,
            margin_v,
            encoding,
        ] = c;
        Self {
            name,
            fontname,
            fontsize,
            primary_colour,
            secondary_colour,
            outline_colour,
            back_colour,
            bold,
            italic,
            underline,
            strike_out,
            scale_x,
            scale_y,
            spacing,
            angle,
            border_style,
            outline,
            shadow,
            alignment,
            margin_l,
            margin_r,
            margin_v,
            encoding,
        }
    }

    /// Parses a `Style: ...` line. `None` if the prefix or column count is off.
    pub fn parse_line(line: &str) -> Option<Self> {
        let body = line.strip_prefix(STYLE_PREFIX)?;
        let parts: Vec<String> = body.split(',').map(str::to_string).collect();
        let columns: [String; 23] = parts.try_into().ok()?;
        Some(Self::from_columns(columns))
    }

    pub fn to_line(&self) -> String {
        let joined = self
            .columns()
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        format!("{STYLE_PREFIX}{joined}")
    }

    /// The `Format:` line matching [`STYLE_FORMAT`].
    pub fn format_line() -> String {
        format!("Format: {}", STYLE_FORMAT.join(", "))
    }

    /// Overwrites only the fields set in `ov`.
    pub fn apply(&mut self, ov: &StyleOverride) {
        if let Some(font) = &ov.fontname {
            self.fontname = font.clone();
        }
        if let Some(size) = ov.fontsize {
            self.fontsize = size.to_string();
        }
        if let Some(bold) = ov.bold {
            self.bold = if bold { "-1" } else { "0" }.to_string();
        }
        if let Some(outline) = ov.outline {
            self.outline = outline.to_string();
        }
        if let Some(shadow) = ov.shadow {
            self.shadow = shadow.to_string();
        }
        if let Some(margin) = ov.margin_v {
            self.margin_v = margin.to_string();
        }
    }
}

/// Style fields that may be forced before burn-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleOverride {
    pub fontname: Option<String>,
    pub fontsize: Option<u32>,
    pub bold: Option<bool>,
    pub outline: Option<u32>,
    pub shadow: Option<u32>,
    pub margin_v: Option<u32>,
}

impl StyleOverride {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Rewrites the `Style: Default,` line of an ASS document.
pub fn override_style_text(ass: &str, ov: &StyleOverride) -> String {
    let mut out = String::with_capacity(ass.len());
    for line in ass.lines() {
        if line.starts_with("Style: Default,") {
            match AssStyle::parse_line(line) {
                Some(mut style) => {
                    style.apply(ov);
                    out.push_str(&style.to_line());
                }
                None => {
                    warn!("Unexpected style line format, keeping it unchanged: {}", line);
                    out.push_str(line);
                }
            }
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

pub fn override_style_file(input: &Path, output: &Path, ov: &StyleOverride) -> ReelResult<()> {
    let text = std::fs::read_to_string(input)?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, override_style_text(&text, ov))?;
    debug!(
        "Style override written: {} -> {}",
        input.display(),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "Style: Default,Arial,64,&H00FFFFFF,&H00999999,&H00000000,&H00000000,0,0,0,0,100,100,0,0,1,3,0,2,120,120,220,1";

    #[test]
    fn test_parse_and_serialize_roundtrip() {
        let style = AssStyle::parse_line(LINE).unwrap();
        assert_eq!(style.name, "Default");
        assert_eq!(style.fontsize, "64");
        assert_eq!(style.margin_v, "220");
        assert_eq!(style.to_line(), LINE);
    }

    #[test]
    fn test_fontsize_override_touches_only_fontsize() {
        let ov = StyleOverride {
            fontsize: Some(40),
            ..Default::default()
        };
        let out = override_style_text(LINE, &ov);
        let before: Vec<&str> = LINE.split(',').collect();
        let after: Vec<&str> = out.trim_end().split(',').collect();
        assert_eq!(before.len(), after.len());
        for (i, (b, a)) in before.iter().zip(&after).enumerate() {
            if i == 2 {
                assert_eq!(*a, "40");
            } else {
                assert_eq!(b, a, "column {} changed", STYLE_FORMAT[i]);
            }
        }
    }

    #[test]
    fn test_full_override() {
        let mut style = AssStyle::parse_line(LINE).unwrap();
        style.apply(&StyleOverride {
            fontname: Some("Montserrat".into()),
            fontsize: Some(72),
            bold: Some(true),
            outline: Some(4),
            shadow: Some(1),
            margin_v: Some(360),
        });
        assert_eq!(
            style.to_line(),
            "Style: Default,Montserrat,72,&H00FFFFFF,&H00999999,&H00000000,&H00000000,-1,0,0,0,100,100,0,0,1,4,1,2,120,120,360,1"
        );
    }

    #[test]
    fn test_bold_uses_ass_true_value() {
        let mut style = AssStyle::parse_line(LINE).unwrap();
        style.apply(&StyleOverride { bold: Some(true), ..Default::default() });
        assert_eq!(style.bold, "-1");
        style.apply(&StyleOverride { bold: Some(false), ..Default::default() });
        assert_eq!(style.bold, "0");
    }

    #[test]
    fn test_other_lines_untouched() {
        let doc = format!("[V4+ Styles]\n{}\n{LINE}\n\n[Events]\nStyle: Other,x\n", AssStyle::format_line());
        let out = override_style_text(&doc, &StyleOverride { shadow: Some(2), ..Default::default() });
        assert_eq!(out.lines().count(), doc.lines().count());
        assert!(out.contains("Style: Other,x"));
        assert!(out.contains(&AssStyle::format_line()));
        assert!(out.contains(",3,2,2,120,"));
    }

    #[test]
    fn test_malformed_style_kept() {
        let line = "Style: Default,Arial,64";
        assert_eq!(override_style_text(line, &StyleOverride::default()), format!("{line}\n"));
    }
}
