use crate::model::{DependencyReport, ScanReport, Severity};
use anyhow::Result;
use std::fmt::Write as _;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct DependencyRow {
    #[tabled(rename = "Dependency")]
    name: String,
    #[tabled(rename = "Ecosystem")]
    ecosystem: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Identifier")]
    identifier: String,
    #[tabled(rename = "Vulns")]
    vulnerabilities: usize,
}

#[derive(Tabled)]
struct VulnRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Dependency")]
    dependency: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Fixed In")]
    fixed_in: String,
}

#[derive(Tabled)]
struct SkippedRow {
    #[tabled(rename = "Analyzer")]
    analyzer: String,
    #[tabled(rename = "Dependency")]
    dependency: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

pub fn print_table(report: &ScanReport) -> Result<()> {
    print!("{}", generate_table_string(report, true));
    Ok(())
}

/// Renders the report as text tables; `color` adds ANSI severity colors.
pub fn generate_table_string(report: &ScanReport, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Scan completed at: {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out);

    if report.dependencies.is_empty() {
        let _ = writeln!(out, "No dependencies found.");
    } else {
        let _ = writeln!(out, "Found {} dependencies:", report.dependencies.len());
        let _ = writeln!(out);
        let rows: Vec<DependencyRow> = report
            .dependencies
            .iter()
            .map(|d| DependencyRow {
                name: truncate(&d.display_name, 40),
                ecosystem: d.ecosystem.map_or_else(|| "-".to_string(), |e| e.to_string()),
                version: d.version.clone().unwrap_or_else(|| "-".to_string()),
                identifier: truncate(&primary_identifier(d), 50),
                vulnerabilities: d.vulnerabilities.len(),
            })
            .collect();
        let _ = writeln!(out, "{}", Table::new(rows).with(Style::rounded()));
    }

    if report.vulnerability_count() > 0 {
        let _ = writeln!(out);
        let _ = writeln!(out, "Found {} vulnerabilities:", report.vulnerability_count());
        let _ = writeln!(out);

        let mut vulns: Vec<_> = report.vulnerabilities().collect();
        vulns.sort_by(|a, b| b.1.severity.cmp(&a.1.severity));

        let rows: Vec<VulnRow> = vulns
            .iter()
            .map(|(d, v)| VulnRow {
                severity: format_severity(v.severity, color),
                dependency: truncate(&d.display_name, 30),
                id: v.name.clone(),
                description: truncate(&v.description, 50),
                fixed_in: v
                    .vulnerable_software
                    .iter()
                    .find_map(|s| s.fixed_in.clone())
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        let _ = writeln!(out, "{}", Table::new(rows).with(Style::rounded()));
    }

    if !report.skipped.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Skipped {} analysis units:", report.skipped.len());
        let _ = writeln!(out);
        let rows: Vec<SkippedRow> = report
            .skipped
            .iter()
            .map(|s| SkippedRow {
                analyzer: s.analyzer.clone(),
                dependency: s.dependency.clone().unwrap_or_else(|| "-".to_string()),
                reason: truncate(&s.reason, 60),
            })
            .collect();
        let _ = writeln!(out, "{}", Table::new(rows).with(Style::rounded()));
    }

    let _ = writeln!(out);
    write_summary(&mut out, report);
    out
}

fn primary_identifier(dependency: &DependencyReport) -> String {
    dependency
        .vulnerable_identifiers
        .first()
        .or_else(|| dependency.identifiers.first())
        .cloned()
        .unwrap_or_else(|| "-".to_string())
}

fn write_summary(out: &mut String, report: &ScanReport) {
    let _ = writeln!(out, "Summary:");
    let _ = writeln!(out, "  Dependencies: {}", report.dependencies.len());
    if report.vulnerability_count() > 0 {
        let _ = writeln!(
            out,
            "  Vulnerabilities: {} critical, {} high, {} medium, {} low",
            report.count_severity(Severity::Critical),
            report.count_severity(Severity::High),
            report.count_severity(Severity::Medium),
            report.count_severity(Severity::Low)
        );
    }
    let suppressed = report.suppressed_count();
    if suppressed > 0 {
        let _ = writeln!(out, "  Suppressed: {}", suppressed);
    }
}

fn format_severity(severity: Severity, color: bool) -> String {
    if !color {
        return severity.as_str().to_uppercase();
    }
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Medium => "\x1b[33mMEDIUM\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
        Severity::Unknown => "UNKNOWN".to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
