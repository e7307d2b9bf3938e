use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::*;

use crate::cli::OutputFormat;
use crate::scanner::{EndpointEntry, ScanReport};

pub struct OutputWriter {
    format: OutputFormat,
    file: Option<PathBuf>,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, file: Option<PathBuf>) -> Self {
        Self { format, file }
    }

    pub fn write(&self, report: &ScanReport) -> Result<()> {
        let output = match self.format {
            OutputFormat::Human => self.format_human(report),
            OutputFormat::Json => self.format_json(report)?,
        };

        match &self.file {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create output file {}", path.display()))?;
                let mut writer = BufWriter::new(file);
                writer.write_all(output.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", output);
                io::stdout().flush()?;
            }
        }

        Ok(())
    }

    fn format_json(&self, report: &ScanReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    fn format_human(&self, report: &ScanReport) -> String {
        let mut output = String::new();

        let duration_ms = (report.finished_at - report.started_at).num_milliseconds();
        output.push_str(&format!(
            "\n{} {} candidates in {}ms\n",
            "scanned".bold(),
            report.total_candidates,
            duration_ms
        ));

        Self::push_section(
            &mut output,
            "Available Endpoints",
            &report.categories.available_endpoints,
        );
        Self::push_section(&mut output, "Rate Limited", &report.categories.rate_limited);
        Self::push_section(
            &mut output,
            "Cloudflare Blocked",
            &report.categories.cloudflare_blocked,
        );
        Self::push_section(
            &mut output,
            "Invalid Content",
            &report.categories.invalid_content,
        );
        Self::push_section(
            &mut output,
            "Service Unavailable",
            &report.categories.service_unavailable,
        );
        Self::push_section(&mut output, "Unauthorized", &report.categories.unauthorized);

        if !report.categories.timeout_or_unreachable.is_empty() {
            output.push_str(&format!("\n{}:\n", "Timeout or Unreachable".red().bold()));
            for endpoint in &report.categories.timeout_or_unreachable {
                output.push_str(&format!("  {}\n", endpoint.dimmed()));
            }
        }
        if !report.categories.failed.is_empty() {
            output.push_str(&format!("\n{}:\n", "Failed".red().bold()));
            for endpoint in &report.categories.failed {
                output.push_str(&format!("  {}\n", endpoint.dimmed()));
            }
        }

        let discovered: Vec<&str> = report
            .records
            .iter()
            .flat_map(|r| r.domains.iter().map(String::as_str))
            .collect();
        if !discovered.is_empty() {
            output.push_str(&format!("\n{}:\n", "Discovered Domains".cyan().bold()));
            let mut unique: Vec<&str> = discovered;
            unique.sort();
            unique.dedup();
            for domain in unique {
                output.push_str(&format!("  {}\n", domain));
            }
        }

        output.push_str(&format!("\n{}\n", "Summary:".bold()));
        for (name, count) in report.categories.counts() {
            output.push_str(&format!("  {:<24} {}\n", format!("{}:", name), count));
        }

        output
    }

    fn push_section(output: &mut String, title: &str, entries: &[EndpointEntry]) {
        if entries.is_empty() {
            return;
        }
        output.push_str(&format!("\n{}:\n", title.green().bold()));
        for entry in entries {
            let latency = match entry.latency_ms {
                Some(ms) => format!("{:.2} ms", ms),
                None => "timeout".to_string(),
            };
            output.push_str(&format!(
                "  {} ({})\n",
                entry.endpoint,
                latency.dimmed()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{CategorizedResults, ClassifiedRecord, Verdict};
    use std::collections::BTreeSet;

    fn sample_report() -> ScanReport {
        let records = vec![ClassifiedRecord {
            candidate: "1.2.3.4:443".to_string(),
            reachable: true,
            latency_ms: Some(42.0),
            http_status: Some(200),
            domains: BTreeSet::from(["deepl.example.com".to_string()]),
            verdict: Verdict::Ok,
            cloudflare_blocked: false,
        }];
        let categories = CategorizedResults::from_records(&records);
        let now = chrono::Utc::now();
        ScanReport {
            started_at: now,
            finished_at: now,
            total_candidates: 1,
            records,
            categories,
        }
    }

    #[test]
    fn test_json_report_round_trips() {
        let report = sample_report();
        let writer = OutputWriter::new(OutputFormat::Json, None);
        let json = writer.format_json(&report).unwrap();

        let parsed: ScanReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].verdict, Verdict::Ok);
        assert!(parsed.records[0].domains.contains("deepl.example.com"));
        assert_eq!(parsed.categories.available_endpoints.len(), 1);
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categorized_results.json");
        let writer = OutputWriter::new(OutputFormat::Json, Some(path.clone()));

        writer.write(&sample_report()).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("available_endpoints"));
        assert!(content.contains("1.2.3.4:443"));
    }

    #[test]
    fn test_human_output_mentions_domains_and_summary() {
        colored::control::set_override(false);
        let writer = OutputWriter::new(OutputFormat::Human, None);
        let text = writer.format_human(&sample_report());
        assert!(text.contains("deepl.example.com"));
        assert!(text.contains("Summary:"));
        assert!(text.contains("Available Endpoints"));
    }
}
