//! Export and display generation.
//!
//! Export encoders are stateless transforms over a finished [`RunRecord`].

use crate::models::{ProbeResult, Resolver, RunRecord, ScoredMeasurement};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// CSV header row.
pub const CSV_HEADER: &str = "site,cpuTime,memoryUsage,networkLatency,loadTime,score";

/// Export format for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    /// Comma-separated values (default)
    #[default]
    Csv,
    /// Structured JSON dump
    Json,
    /// Markdown report
    Markdown,
}

/// JSON export document.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
    id: u64,
    at: DateTime<Utc>,
    computer: &'a str,
    final_score: u32,
    measurements: Vec<ScoredMeasurement>,
}

/// Quote a CSV value, doubling embedded quotes.
fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Generate a CSV export of a run's scored measurements.
pub fn generate_csv(record: &RunRecord) -> String {
    let mut output = String::new();
    output.push_str(CSV_HEADER);
    output.push('\n');

    for scored in record.scored() {
        let m = &scored.measurement;
        let row = [
            csv_field(&m.site),
            csv_field(&m.cpu_time.to_string()),
            csv_field(&m.memory_usage.to_string()),
            csv_field(&m.network_latency.to_string()),
            csv_field(&m.load_time.to_string()),
            csv_field(&scored.score.to_string()),
        ];
        output.push_str(&row.join(","));
        output.push('\n');
    }

    output
}

/// Generate a JSON export of a run.
pub fn generate_json(record: &RunRecord) -> Result<String> {
    let document = ExportDocument {
        id: record.id.0,
        at: record.at,
        computer: &record.computer,
        final_score: record.final_score,
        measurements: record.scored(),
    };
    serde_json::to_string_pretty(&document).map_err(Into::into)
}

/// Generate a Markdown report of a run.
pub fn generate_markdown(record: &RunRecord) -> String {
    let mut output = String::new();

    output.push_str(&format!("# SiteBench Run {}\n\n", record.id));
    output.push_str(&format!("- **Computer:** {}\n", record.computer));
    output.push_str(&format!(
        "- **Finished:** {}\n",
        record.at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("- **Final Score:** {}\n\n", record.final_score));

    output.push_str("| # | Site | Load (ms) | CPU (ms) | Network (ms) | Memory (MB) | Score |\n");
    output.push_str("|---:|:---|---:|---:|---:|---:|---:|\n");
    for scored in record.scored() {
        let m = &scored.measurement;
        output.push_str(&format!(
            "| {} | {} | {:.1} | {:.1} | {:.1} | {:.2} | {} |\n",
            m.index, m.site, m.load_time, m.cpu_time, m.network_latency, m.memory_usage, scored.score
        ));
    }
    output.push('\n');

    output
}

/// Render a run in the requested export format.
pub fn render(record: &RunRecord, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => Ok(generate_csv(record)),
        ExportFormat::Json => generate_json(record),
        ExportFormat::Markdown => Ok(generate_markdown(record)),
    }
}

/// Write a run export to a file.
pub fn write_export(record: &RunRecord, format: ExportFormat, path: &Path) -> Result<()> {
    let content = render(record, format)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write export to {}", path.display()))
}

/// Plain-text summary of a finished run for the terminal.
pub fn generate_run_summary(record: &RunRecord) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "Run {} on {} | Final score: {}",
        record.id, record.computer, record.final_score
    ));
    lines.push(format!(
        "  {:<40} {:>10} {:>9} {:>9} {:>9} {:>6}",
        "Site", "Load ms", "CPU ms", "Net ms", "Mem MB", "Score"
    ));
    for scored in record.scored() {
        let m = &scored.measurement;
        lines.push(format!(
            "  {:<40} {:>10.1} {:>9.1} {:>9.1} {:>9.2} {:>6}",
            m.site, m.load_time, m.cpu_time, m.network_latency, m.memory_usage, scored.score
        ));
    }
    if let Some(slowest) = record.max_load_time() {
        lines.push(format!("  Slowest load: {:.1}ms", slowest));
    }

    lines.join("\n")
}

/// Plain-text probe outcome.
pub fn generate_probe_summary(result: &ProbeResult, label_a: &str, label_b: &str) -> String {
    let recommended = match result.recommended {
        Resolver::A => label_a,
        Resolver::B => label_b,
    };

    format!(
        "Slow page loads detected. Resolver check: {} {:.1}ms | {} {:.1}ms | Recommended: {}",
        label_a, result.latency_a, label_b, result.latency_b, recommended
    )
}

/// Plain-text listing of past runs, newest first.
pub fn generate_history_listing(records: &[RunRecord]) -> String {
    if records.is_empty() {
        return "No runs recorded yet.".to_string();
    }

    let mut lines = Vec::new();
    for record in records {
        lines.push(format!(
            "{}  {}  {:<20} score {:>4}  ({} sites)",
            record.id,
            record.at.format("%Y-%m-%d %H:%M:%S"),
            record.computer,
            record.final_score,
            record.measurements.len()
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Measurement, RunId};

    fn create_test_record() -> RunRecord {
        RunRecord {
            id: RunId(1700000000000),
            at: Utc::now(),
            computer: "lab \"west\"".to_string(),
            final_score: 758,
            measurements: vec![
                Measurement {
                    run_id: RunId(1700000000000),
                    index: 0,
                    site: "https://a.test/?q=\"x\",y".to_string(),
                    load_time: 500.0,
                    cpu_time: 100.0,
                    network_latency: 50.0,
                    memory_usage: 20.0,
                },
                Measurement {
                    run_id: RunId(1700000000000),
                    index: 1,
                    site: "https://b.test".to_string(),
                    load_time: 1500.5,
                    cpu_time: 0.0,
                    network_latency: 0.0,
                    memory_usage: 0.0,
                },
            ],
        }
    }

    #[test]
    fn test_generate_csv() {
        let csv = generate_csv(&create_test_record());
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            r#""https://a.test/?q=""x"",y","100","20","50","500","758""#
        );
        assert_eq!(lines[2], r#""https://b.test","0","0","0","1500.5","400""#);
    }

    #[test]
    fn test_generate_json() {
        let json = generate_json(&create_test_record()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["finalScore"], 758);
        assert_eq!(value["computer"], "lab \"west\"");
        assert_eq!(value["measurements"][0]["score"], 758);
        assert_eq!(value["measurements"][1]["loadTime"], 1500.5);
        assert_eq!(value["measurements"][1]["index"], 1);
    }

    #[test]
    fn test_generate_markdown() {
        let markdown = generate_markdown(&create_test_record());
        assert!(markdown.contains("# SiteBench Run 1700000000000"));
        assert!(markdown.contains("**Final Score:** 758"));
        assert!(markdown.contains("https://b.test"));
    }

    #[test]
    fn test_probe_summary_names_recommendation() {
        let result = ProbeResult::from_latencies(42.0, 17.5);
        let text = generate_probe_summary(&result, "Cloudflare", "Google");
        assert!(text.contains("Cloudflare 42.0ms"));
        assert!(text.contains("Recommended: Google"));
    }

    #[test]
    fn test_history_listing() {
        assert_eq!(generate_history_listing(&[]), "No runs recorded yet.");

        let listing = generate_history_listing(&[create_test_record()]);
        assert!(listing.contains("1700000000000"));
        assert!(listing.contains("score  758"));
        assert!(listing.contains("(2 sites)"));
    }

    #[test]
    fn test_write_export() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("run.csv");

        write_export(&create_test_record(), ExportFormat::Csv, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(CSV_HEADER));
    }
}
