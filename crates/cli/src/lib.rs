//! Terminal rendering shared by the `person-search` binary.

use std::time::Duration;

use chrono::{DateTime, Utc};
use console::style;
use core_types::{SearchResult, truncate_chars};
use indicatif::{ProgressBar, ProgressStyle};
use service::{BuildReport, StoreStatus};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Characters of a bio shown in the result listing.
pub const BIO_PREVIEW_CHARS: usize = 100;

/// Multi-line listing entry for one ranked hit.
pub fn render_result(r: &SearchResult) -> String {
    let resume = if r.resume_html.trim().is_empty() {
        style("no").dim().to_string()
    } else {
        style("yes").green().to_string()
    };
    format!(
        "{rank} {id}  {score}\n    category: {category}\n    bio: {bio}\n    resume: {resume}",
        rank = style(format!("#{}", r.rank)).bold(),
        id = style(&r.id).cyan(),
        score = style(format!("score {:.4}", r.score)).yellow(),
        category = r.category,
        bio = truncate_chars(r.bio.trim(), BIO_PREVIEW_CHARS),
    )
}

pub fn render_status(s: &StoreStatus) -> String {
    format!(
        "{}\n  documents: {}\n  dimension: {}\n  metric:    {}\n  built:     {}\n  format:    v{}",
        style(s.path.display()).bold(),
        s.document_count,
        s.dimension,
        s.metric,
        format_utc_ms(s.built_at_ms),
        s.format_version,
    )
}

pub fn render_build_report(r: &BuildReport) -> String {
    let mut out = format!(
        "{} indexed {} of {} records ({} embeddings) in {:.1}s",
        style("done:").green().bold(),
        r.indexed,
        r.records_read,
        r.embeddings_read,
        r.elapsed.as_secs_f64(),
    );
    if r.skipped > 0 {
        out.push_str(&format!(
            "\n{} {} record(s) skipped:",
            style("warning:").yellow().bold(),
            r.skipped
        ));
        for w in &r.warnings {
            out.push_str(&format!("\n  - {w}"));
        }
    }
    out
}

/// Progress bar for the indexing phase; length is set once inputs are validated.
pub fn build_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Epoch milliseconds as a UTC `YYYY-MM-DD hh:mm:ss` timestamp.
fn format_utc_ms(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("{ms} ms after epoch"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bio_is_cut_at_one_hundred_chars() {
        let long = "é".repeat(150);
        let cut = truncate_chars(&long, BIO_PREVIEW_CHARS);
        assert_eq!(cut.chars().count(), BIO_PREVIEW_CHARS + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_chars("short", BIO_PREVIEW_CHARS), "short");
    }

    #[test]
    fn result_shows_four_decimal_score() {
        console::set_colors_enabled(false);
        let r = SearchResult {
            rank: 2,
            id: "p7".into(),
            bio: "Tax lawyer".into(),
            category: "Law".into(),
            resume_html: "<p>cv</p>".into(),
            score: 0.123_456,
        };
        let text = render_result(&r);
        assert!(text.starts_with("#2 p7  score 0.1235"));
        assert!(text.contains("category: Law"));
        assert!(text.contains("resume: yes"));
    }

    #[test]
    fn epoch_millis_render_as_utc() {
        assert_eq!(format_utc_ms(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_utc_ms(1_700_000_000_000), "2023-11-14 22:13:20 UTC");
        assert_eq!(format_utc_ms(u64::MAX), format!("{} ms after epoch", u64::MAX));
    }
}
