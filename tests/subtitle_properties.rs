use reelsmith::ReelError;
use reelsmith::ass_style::{AssStyle, StyleOverride, override_style_text};
use reelsmith::config::{Config, SubtitleConfig};
use reelsmith::subtitle::{
    GroupingLimits, WordInterval, format_ass_time, generate_subtitles, group_words, render_ass,
};
use tempfile::TempDir;

fn words() -> Vec<WordInterval> {
    vec![
        WordInterval::new("the", 0.00, 0.20),
        WordInterval::new("moon", 0.20, 0.55),
        WordInterval::new("pulls", 0.60, 0.90),
        WordInterval::new("on", 0.90, 1.00),
        WordInterval::new("the", 1.00, 1.10),
        WordInterval::new("ocean", 1.10, 1.60),
        WordInterval::new("twice", 2.40, 2.80),
        WordInterval::new("a", 2.80, 2.84),
        WordInterval::new("day", 2.84, 3.20),
    ]
}

#[test]
fn test_grouping_covers_every_word_in_order() {
    let limits = GroupingLimits::from(&SubtitleConfig::default());
    let lines = group_words(&words(), limits);

    let flat: Vec<_> = lines
        .iter()
        .flat_map(|l| l.words())
        .map(|w| w.word.as_str())
        .collect();
    let expected: Vec<_> = words().iter().map(|w| w.word.clone()).collect();
    assert_eq!(flat, expected);

    for line in &lines {
        assert!(!line.words().is_empty());
        assert!(line.words().len() <= limits.max_words_per_line);
    }
    // 4-word cap, then the 0.8 s pause before "twice"
    let sizes: Vec<_> = lines.iter().map(|l| l.words().len()).collect();
    assert_eq!(sizes, [4, 2, 3]);
}

#[test]
fn test_single_word_longer_than_cap_stays_alone() {
    let limits = GroupingLimits {
        max_words_per_line: 4,
        max_line_duration: 1.0,
        max_gap: 0.35,
    };
    let long = vec![
        WordInterval::new("a", 0.0, 0.1),
        WordInterval::new("looooong", 0.1, 3.0),
        WordInterval::new("b", 3.0, 3.1),
    ];
    let lines = group_words(&long, limits);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1].words()[0].word, "looooong");
}

#[test]
fn test_zero_length_word_highlights_one_centisecond() {
    let w = WordInterval::new("uh", 1.0, 1.0);
    assert_eq!(w.highlight_centiseconds(), 1);
    assert_eq!(WordInterval::new("a", 2.80, 2.84).highlight_centiseconds(), 4);
}

#[test]
fn test_time_format_never_overflows_centiseconds() {
    assert_eq!(format_ass_time(0.0), "0:00:00.00");
    assert_eq!(format_ass_time(59.996), "0:01:00.00");
    assert_eq!(format_ass_time(3725.5), "1:02:05.50");
    assert_eq!(format_ass_time(-1.0), "0:00:00.00");
}

#[test]
fn test_document_has_one_event_per_line() {
    let cfg = SubtitleConfig::default();
    let lines = group_words(&words(), GroupingLimits::from(&cfg));
    let doc = render_ass(&lines, &cfg, (1080, 1920));

    assert!(doc.starts_with("[Script Info]\n"));
    assert!(doc.contains("PlayResX: 1080\nPlayResY: 1920\n"));
    assert_eq!(doc.matches("\nStyle: ").count(), 1);
    assert_eq!(doc.matches("\nDialogue: ").count(), lines.len());
    assert!(doc.contains(
        "Dialogue: 0,0:00:00.00,0:00:01.05,Default,,0,0,0,,{\\k20}the {\\k35}moon {\\k30}pulls {\\k10}on\n"
    ));
}

#[test]
fn test_style_line_is_parseable_and_overridable() {
    let cfg = SubtitleConfig::default();
    let doc = render_ass(&[], &cfg, (1080, 1920));
    let style_line = doc
        .lines()
        .find(|l| l.starts_with("Style: "))
        .unwrap();
    let style = AssStyle::parse_line(style_line).unwrap();
    assert_eq!(style.to_line(), style_line);

    let ov = StyleOverride {
        fontsize: Some(40),
        ..Default::default()
    };
    let rewritten = override_style_text(&doc, &ov);
    let changed: Vec<_> = doc
        .lines()
        .zip(rewritten.lines())
        .filter(|(a, b)| a != b)
        .collect();
    assert_eq!(changed.len(), 1);
    assert!(changed[0].1.starts_with("Style: Default,Arial,40,"));
}

#[test]
fn test_generate_subtitles_end_to_end() {
    let dir = TempDir::new().unwrap();
    let json = dir.path().join("audio.json");
    std::fs::write(
        &json,
        r#"{"tiers":{"words":{"type":"interval","entries":[[0.0,0.4,"hello"],[0.4,0.9,"world"]]}}}"#,
    )
    .unwrap();
    let out = dir.path().join("subs/subtitles.ass");

    generate_subtitles(&json, &out, &Config::default()).unwrap();
    let doc = std::fs::read_to_string(&out).unwrap();
    assert!(doc.contains("0:00:00.00,0:00:00.95,Default,,0,0,0,,{\\k40}hello {\\k50}world"));
}

#[test]
fn test_no_words_is_an_error() {
    let dir = TempDir::new().unwrap();
    let json = dir.path().join("audio.json");
    std::fs::write(&json, r#"{"tiers":{"words":{"entries":[]}}}"#).unwrap();
    let err = generate_subtitles(&json, &dir.path().join("out.ass"), &Config::default()).unwrap_err();
    assert!(matches!(err, ReelError::EmptyInput { stage: "subtitles", .. }));
}
