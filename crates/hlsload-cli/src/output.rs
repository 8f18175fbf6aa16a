//! Output formatting for CLI

use hlsload_core::{Manifest, PlaybackReport, RequestStatsEntry};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON, falling back to an empty object
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "# reqs")]
    requests: u64,
    #[tabled(rename = "# fails")]
    failures: u64,
    #[tabled(rename = "Avg (ms)")]
    avg: String,
    #[tabled(rename = "Min (ms)")]
    min: String,
    #[tabled(rename = "Max (ms)")]
    max: u64,
    #[tabled(rename = "Avg size (B)")]
    avg_bytes: String,
}

impl From<&RequestStatsEntry> for StatsRow {
    fn from(entry: &RequestStatsEntry) -> Self {
        Self {
            name: entry.name.clone(),
            requests: entry.requests,
            failures: entry.failures,
            avg: format!("{:.0}", entry.avg_response_ms()),
            min: entry
                .min_response_ms
                .map_or_else(|| "-".to_string(), |min| min.to_string()),
            max: entry.max_response_ms,
            avg_bytes: format!("{:.0}", entry.avg_bytes()),
        }
    }
}

/// Request statistics as a table, with the total as the last row
pub fn stats_table(entries: &[RequestStatsEntry], total: &RequestStatsEntry) -> String {
    let rows: Vec<StatsRow> = entries
        .iter()
        .chain(std::iter::once(total))
        .map(StatsRow::from)
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Human-readable playback report
pub fn report_text(report: &PlaybackReport) -> String {
    let started = match report.buffered_at_play_start {
        Some(buffered) => format!("after {:.1}s buffered", buffered),
        None => "never".to_string(),
    };
    format!(
        "Session {}\n  Variant:          {}\n  Outcome:          {}\n  Buffered:         {:.1}s\n  Played:           {:.1}s\n  Playback started: {}\n  Fragments:        {}\n  Refreshes:        {}",
        report.session_id,
        report.variant_url,
        report.termination,
        report.buffered_seconds,
        report.elapsed_play_time,
        started,
        report.fragments_fetched,
        report.manifest_refreshes,
    )
}

/// Human-readable manifest summary
pub fn manifest_text(manifest: &Manifest) -> String {
    let mut out = String::new();

    let kind = if manifest.is_master() {
        "master"
    } else if manifest.is_media_playlist() {
        "media playlist"
    } else {
        "unrecognized"
    };
    out.push_str(&format!("Type: {}\n", kind));

    if !manifest.variants().is_empty() {
        out.push_str(&format!("Variants: {}\n", manifest.variants().len()));
        for (i, variant) in manifest.variants().iter().enumerate() {
            let bandwidth = variant
                .bandwidth()
                .map_or_else(|| "?".to_string(), |bw| format!("{}bps", bw));
            let resolution = variant
                .resolution()
                .map_or_else(String::new, |(w, h)| format!(" {}x{}", w, h));
            out.push_str(&format!("  {}. {} - {}{}\n", i, variant.uri, bandwidth, resolution));
        }
    }

    if manifest.is_media_playlist() {
        out.push_str(&format!(
            "Fragments: {} ({:.1}s total)\n",
            manifest.fragments().len(),
            manifest.total_duration()
        ));
        for fragment in manifest.fragments().iter().take(10) {
            out.push_str(&format!("  {:>7.3}s {}\n", fragment.duration, fragment.uri));
        }
        if manifest.fragments().len() > 10 {
            out.push_str(&format!("  ... and {} more\n", manifest.fragments().len() - 10));
        }
        out.push_str(&format!("Live: {}\n", !manifest.is_endlist()));
    }

    if !manifest.tags.is_empty() {
        out.push_str("Tags:\n");
        for (name, value) in &manifest.tags {
            out.push_str(&format!("  {} = {}\n", name, value));
        }
    }

    out
}
