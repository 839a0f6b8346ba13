// src/ingest/mod.rs
pub mod aggregator;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod providers;
pub mod scheduler;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_sources_total", "Sources processed by the aggregator.");
        describe_counter!(
            "ingest_source_errors_total",
            "Sources that contributed zero records due to fetch/extraction errors."
        );
        describe_counter!(
            "ingest_candidates_total",
            "Candidate records produced by extractors."
        );
        describe_counter!(
            "ingest_items_skipped_total",
            "Individual items skipped as malformed or incomplete."
        );
        describe_counter!(
            "ingest_kept_total",
            "Records kept after normalization + relevance filtering."
        );
        describe_counter!(
            "ingest_filtered_total",
            "Records dropped by the relevance filter."
        );
        describe_counter!("ingest_runs_total", "Scheduled aggregation runs started.");
        describe_counter!(
            "ingest_runs_skipped_total",
            "Scheduled ticks skipped because a run was still in flight."
        );
        describe_histogram!("ingest_fetch_ms", "Source fetch time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the aggregation pipeline last ran."
        );
    });
}

/// Clean markup-bearing text (feed bodies, API strings): strip tags, decode
/// entities, then [`tidy_text`].
///
/// Only `<` followed by a letter or `/` opens a tag, so literal comparisons
/// such as `GPA < 3 or > 2` survive. Inline tags vanish without a gap
/// (`$1,<b>000</b>` stays `$1,000`); block tags become a space.
pub fn clean_text(s: &str) -> String {
    // 1) Block-level tags separate words
    static RE_BLOCK: OnceCell<regex::Regex> = OnceCell::new();
    let re_block = RE_BLOCK.get_or_init(|| {
        regex::Regex::new(r"(?is)</?(?:p|br|div|li|ul|ol|tr|td|th|h[1-6]|blockquote|section|article)\b[^>]*>")
            .unwrap()
    });
    let out = re_block.replace_all(s, " ");

    // 2) Strip remaining HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags =
        RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)<(?:/?[a-z][^>]*|!--.*?--)>").unwrap());
    let out = re_tags.replace_all(&out, "");

    // 3) HTML entity decode, after stripping so decoded `<` is never taken for a tag
    let out = html_escape::decode_html_entities(&out);

    tidy_text(&out)
}

/// Fold typographic quotes, collapse whitespace and cap length. For text that
/// is already tag-free and decoded, such as scraped element text.
pub fn tidy_text(s: &str) -> String {
    // Normalize “ ” ‘ ’ « » to ASCII quotes
    let out = s
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    let mut out = re_ws.replace_all(&out, " ").trim().to_string();

    // Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// `clean_text` that maps blank results to `None`.
pub(crate) fn clean_opt(s: Option<&str>) -> Option<String> {
    s.map(clean_text).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_markup_and_keeps_punctuation() {
        let s = "  <p>Open to&nbsp;<b>Nigerian</b> students.</p>  ";
        assert_eq!(clean_text(s), "Open to Nigerian students.");
    }

    #[test]
    fn clean_text_folds_quotes() {
        assert_eq!(clean_text("\u{201C}ok\u{201D}"), "\"ok\"");
    }

    #[test]
    fn inline_markup_does_not_split_tokens() {
        assert_eq!(clean_text("$1,<b>000</b>"), "$1,000");
        assert_eq!(clean_text("December <b>31</b>, 2025"), "December 31, 2025");
        assert_eq!(clean_text("<p>first</p><p>second</p>"), "first second");
    }

    #[test]
    fn literal_angle_brackets_are_kept() {
        assert_eq!(clean_text("GPA < 3 or > 2"), "GPA < 3 or > 2");
        assert_eq!(clean_text("GPA &lt; 3 or &gt; 2"), "GPA < 3 or > 2");
        assert_eq!(tidy_text("  GPA <b> 3 \n"), "GPA <b> 3");
    }

    #[test]
    fn clean_opt_maps_blank_to_none() {
        assert_eq!(clean_opt(Some(" <br/> ")), None);
        assert_eq!(clean_opt(None), None);
        assert_eq!(clean_opt(Some("x")), Some("x".to_string()));
    }
}
