//! Read-only health check of the persisted series files

use crate::services::csv_validator::{covered_span, validate_series_file, ValidationReport};
use crate::utils::format_number;
use chrono::Utc;

pub fn run(symbols: Vec<String>) {
    let config = super::load_config(symbols);
    let store = super::store_for(&config);
    let now = Utc::now();

    println!("🔍 Running health check on {}...\n", store.data_dir().display());

    let total = config.symbols.len();
    let mut unhealthy = 0;

    for (idx, symbol) in config.symbols.iter().enumerate() {
        print!("   [{:>3}/{}] Checking {}... ", idx + 1, total, symbol);
        let _ = std::io::Write::flush(&mut std::io::stdout());

        let report = match validate_series_file(&store, symbol, now) {
            Ok(report) => report,
            Err(e) => {
                println!("❌ {}", e);
                unhealthy += 1;
                continue;
            }
        };

        if !report.exists {
            println!("⚠️  file missing (run 'sync')");
        } else if report.is_healthy() {
            println!("✅ {} rows{}", format_number(report.total_rows), span_suffix(&report));
        } else {
            unhealthy += 1;
            let issues = issues_for(&report);
            println!(
                "⚠️  {} issues, {} usable rows",
                issues.len(),
                format_number(report.unique_rows())
            );
            for issue in issues {
                println!("      {}", issue);
            }
        }
    }

    println!();
    println!("📊 Health Check Summary");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Files checked:    {}", total);
    println!("Files with issues: {}", unhealthy);

    if unhealthy > 0 {
        std::process::exit(1);
    }
    println!("\n✅ All files are healthy!");
}

fn issues_for(report: &ValidationReport) -> Vec<String> {
    let mut issues = Vec::new();
    if !report.exists {
        return issues;
    }

    if !report.header_valid {
        issues.push("❌ Invalid header".to_string());
    }
    if !report.corrupted_lines.is_empty() {
        let lines: Vec<usize> = report.corrupted_lines.iter().map(|(line, _)| *line).collect();
        issues.push(format!(
            "❌ {} corrupted lines at: {}",
            lines.len(),
            format_line_numbers(&lines)
        ));
        if let Some((line, message)) = report.corrupted_lines.first() {
            issues.push(format!("   first error (line {}): {}", line, message));
        }
    }
    if report.duplicates > 0 {
        issues.push(format!("❌ {} duplicate open times", report.duplicates));
    }
    if report.order_violations > 0 {
        issues.push(format!("❌ {} rows out of descending order", report.order_violations));
    }
    if report.future_rows > 0 {
        issues.push(format!("❌ {} rows in the future", report.future_rows));
    }
    if report.header_valid && report.total_rows == 0 {
        issues.push("⚠️  No records found".to_string());
    }
    issues
}

fn span_suffix(report: &ValidationReport) -> String {
    let mut suffix = String::new();
    if let Some(span) = covered_span(report) {
        suffix.push_str(&format!(", {:.1} days", span.num_minutes() as f64 / 1440.0));
    }
    if report.gap_minutes > 0 {
        suffix.push_str(&format!(", {} missing minutes", format_number(report.gap_minutes as usize)));
    }
    suffix
}

/// Compact list of line numbers ("3, 5, 9 ... +12 more")
fn format_line_numbers(lines: &[usize]) -> String {
    const SHOWN: usize = 5;
    let head: Vec<String> = lines.iter().take(SHOWN).map(|l| l.to_string()).collect();
    if lines.len() > SHOWN {
        format!("{} ... +{} more", head.join(", "), lines.len() - SHOWN)
    } else {
        head.join(", ")
    }
}
