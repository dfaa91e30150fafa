use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::alignment::load_word_intervals;
use crate::ass_style::AssStyle;
use crate::config::{Config, SubtitleConfig};
use crate::error::{ReelError, ReelResult};

/// One aligned word, in seconds from the start of the narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordInterval {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl WordInterval {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }

    /// Karaoke highlight length in centiseconds, never below 1.
    pub fn highlight_centiseconds(&self) -> u32 {
        let cs = ((self.end - self.start) * 100.0).round();
        if cs < 1.0 { 1 } else { cs as u32 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupingLimits {
    pub max_words_per_line: usize,
    pub max_line_duration: f64,
    pub max_gap: f64,
}

impl From<&SubtitleConfig> for GroupingLimits {
    fn from(cfg: &SubtitleConfig) -> Self {
        Self {
            max_words_per_line: cfg.max_words_per_line,
            max_line_duration: cfg.max_line_duration,
            max_gap: cfg.max_gap,
        }
    }
}

/// A non-empty run of words shown as one dialogue event.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleLine {
    words: Vec<WordInterval>,
}

impl SubtitleLine {
    pub fn words(&self) -> &[WordInterval] {
        &self.words
    }

    pub fn start(&self) -> f64 {
        self.words[0].start
    }

    /// Last word's end plus `padding`.
    pub fn end(&self, padding: f64) -> f64 {
        self.words[self.words.len() - 1].end + padding
    }

    /// `{\k12}Hello {\k25}world`
    pub fn karaoke_text(&self) -> String {
        self.words
            .iter()
            .map(|w| format!("{{\\k{}}}{}", w.highlight_centiseconds(), w.word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Greedy single pass: a word opens a new line when the current line is
/// full, would run past the duration cap, or sits after too large a gap.
pub fn group_words(words: &[WordInterval], limits: GroupingLimits) -> Vec<SubtitleLine> {
    let Some((first, rest)) = words.split_first() else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    let mut current = vec![first.clone()];

    for w in rest {
        let line_start = current[0].start;
        let prev_end = current[current.len() - 1].end;

        let too_many_words = current.len() >= limits.max_words_per_line;
        let too_long = (w.end - line_start) > limits.max_line_duration;
        let too_big_gap = (w.start - prev_end) > limits.max_gap;

        if too_many_words || too_long || too_big_gap {
            lines.push(SubtitleLine {
                words: std::mem::replace(&mut current, vec![w.clone()]),
            });
        } else {
            current.push(w.clone());
        }
    }
    lines.push(SubtitleLine { words: current });
    lines
}

/// `H:MM:SS.cs`, rounded to the nearest centisecond.
pub fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_sec = total_cs / 100;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

/// The default style line generated for every subtitle document.
pub fn default_style(cfg: &SubtitleConfig) -> AssStyle {
    AssStyle {
        name: "Default".to_string(),
        fontname: cfg.font.clone(),
        fontsize: cfg.font_size.to_string(),
        primary_colour: cfg.primary_colour.clone(),
        secondary_colour: cfg.secondary_colour.clone(),
        outline_colour: cfg.outline_colour.clone(),
        back_colour: "&H00000000".to_string(),
        bold: "0".to_string(),
        italic: "0".to_string(),
        underline: "0".to_string(),
        strike_out: "0".to_string(),
        scale_x: "100".to_string(),
        scale_y: "100".to_string(),
        spacing: "0".to_string(),
        angle: "0".to_string(),
        border_style: "1".to_string(),
        outline: cfg.outline.to_string(),
        shadow: cfg.shadow.to_string(),
        alignment: cfg.alignment.to_string(),
        margin_l: "120".to_string(),
        margin_r: "120".to_string(),
        margin_v: cfg.margin_v.to_string(),
        encoding: "1".to_string(),
    }
}

/// Renders a complete ASS document for `lines`.
pub fn render_ass(lines: &[SubtitleLine], cfg: &SubtitleConfig, play_res: (u32, u32)) -> String {
    let mut doc = format!(
        "[Script Info]\n\
         ScriptType: v4.00+\n\
         PlayResX: {}\n\
         PlayResY: {}\n\
         WrapStyle: 0\n\
         ScaledBorderAndShadow: yes\n\
         \n\
         [V4+ Styles]\n\
         {}\n\
         {}\n\
         \n\
         [Events]\n\
         Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n",
        play_res.0,
        play_res.1,
        AssStyle::format_line(),
        default_style(cfg).to_line(),
    );

    for line in lines {
        doc.push_str(&format!(
            "Dialogue: 0,{},{},Default,,0,0,0,,{}\n",
            format_ass_time(line.start()),
            format_ass_time(line.end(cfg.end_padding)),
            line.karaoke_text()
        ));
    }
    doc
}

/// Alignment JSON in, karaoke ASS file out.
pub fn generate_subtitles(alignment_json: &Path, out_path: &Path, cfg: &Config) -> ReelResult<PathBuf> {
    let words = load_word_intervals(alignment_json)?;
    if words.is_empty() {
        return Err(ReelError::empty_input(
            "subtitles",
            format!("no usable word intervals in {}", alignment_json.display()),
        ));
    }

    let lines = group_words(&words, GroupingLimits::from(&cfg.subtitles));
    info!(
        "Grouped {} words into {} subtitle lines",
        words.len(),
        lines.len()
    );

    let doc = render_ass(&lines, &cfg.subtitles, (cfg.video.width, cfg.video.height));
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out_path, doc)?;
    info!("Subtitles written to {}", out_path.display());
    Ok(out_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_words: usize, max_dur: f64, max_gap: f64) -> GroupingLimits {
        GroupingLimits {
            max_words_per_line: max_words,
            max_line_duration: max_dur,
            max_gap,
        }
    }

    fn texts(lines: &[SubtitleLine]) -> Vec<Vec<&str>> {
        lines
            .iter()
            .map(|l| l.words().iter().map(|w| w.word.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_large_gap_forces_new_line() {
        let words = vec![
            WordInterval::new("a", 0.0, 1.0),
            WordInterval::new("b", 1.1, 2.0),
            WordInterval::new("c", 5.0, 5.5),
        ];
        let lines = group_words(&words, limits(100, f64::INFINITY, 0.35));
        assert_eq!(texts(&lines), vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn test_word_cap_yields_ceil_lines() {
        for (n, k) in [(10usize, 3usize), (9, 3), (1, 4), (7, 1)] {
            let words: Vec<_> = (0..n)
                .map(|i| WordInterval::new(format!("w{i}"), i as f64, i as f64 + 1.0))
                .collect();
            let lines = group_words(&words, limits(k, f64::INFINITY, 0.35));
            assert_eq!(lines.len(), n.div_ceil(k), "n={n} k={k}");
        }
    }

    #[test]
    fn test_duration_cap() {
        let words = vec![
            WordInterval::new("one", 0.0, 1.0),
            WordInterval::new("two", 1.0, 2.0),
            WordInterval::new("three", 2.0, 2.6),
        ];
        let lines = group_words(&words, limits(10, 2.5, 0.35));
        assert_eq!(texts(&lines), vec![vec!["one", "two"], vec!["three"]]);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_words(&[], limits(4, 2.5, 0.35)).is_empty());
    }

    #[test]
    fn test_highlight_floor() {
        assert_eq!(WordInterval::new("a", 1.0, 1.004).highlight_centiseconds(), 1);
        assert_eq!(WordInterval::new("a", 2.0, 1.5).highlight_centiseconds(), 1);
        assert_eq!(WordInterval::new("a", 0.0, 0.256).highlight_centiseconds(), 26);
    }

    #[test]
    fn test_format_ass_time() {
        assert_eq!(format_ass_time(0.0), "0:00:00.00");
        assert_eq!(format_ass_time(1.23), "0:00:01.23");
        assert_eq!(format_ass_time(1.999), "0:00:02.00");
        assert_eq!(format_ass_time(3725.5), "1:02:05.50");
        assert_eq!(format_ass_time(-4.0), "0:00:00.00");
    }

    #[test]
    fn test_render_document() {
        let words = vec![
            WordInterval::new("Hello", 0.1, 0.3),
            WordInterval::new("world", 0.3, 0.75),
        ];
        let cfg = SubtitleConfig::default();
        let lines = group_words(&words, GroupingLimits::from(&cfg));
        let doc = render_ass(&lines, &cfg, (1080, 1920));

        assert!(doc.starts_with("[Script Info]\nScriptType: v4.00+\nPlayResX: 1080\nPlayResY: 1920\n"));
        assert_eq!(doc.lines().filter(|l| l.starts_with("Style: ")).count(), 1);
        assert!(doc.contains(
            "Dialogue: 0,0:00:00.10,0:00:00.80,Default,,0,0,0,,{\\k20}Hello {\\k45}world\n"
        ));
        let style = doc.lines().find(|l| l.starts_with("Style: ")).unwrap();
        assert_eq!(style.split(',').count(), 23);
    }

    #[test]
    fn test_generate_subtitles_rejects_empty_alignment() {
        let dir = tempfile::TempDir::new().unwrap();
        let json = dir.path().join("audio.json");
        std::fs::write(&json, r#"{"tiers":{"words":{"type":"interval","entries":[]}}}"#).unwrap();
        let err = generate_subtitles(&json, &dir.path().join("out.ass"), &Config::default())
            .unwrap_err();
        assert!(matches!(err, ReelError::EmptyInput { .. }));
        assert!(!dir.path().join("out.ass").exists());
    }
}
