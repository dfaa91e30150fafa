use regex::Regex;
use std::sync::LazyLock;

static NON_ALIGNABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s']").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Lowercases, strips punctuation (apostrophes survive) and collapses
/// whitespace so the aligner sees only dictionary words.
pub fn normalize_transcript(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = NON_ALIGNABLE.replace_all(&lower, " ");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Rounds to `decimals` places, half away from zero.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
