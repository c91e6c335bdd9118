//! Markdown run report
//!
//! Written after delivery so operators can see at a glance how a run went,
//! including every warning and error recorded against its pages.

use super::traits::DeliveryReceipt;
use crate::batch::RunSummary;
use std::path::Path;

/// Most issues listed in the report before the rest are elided
const MAX_LISTED_ISSUES: usize = 100;

/// Writes the report for a run to `output_path`
///
/// # Arguments
///
/// * `summary` - Counts and issues of the run
/// * `receipt` - Where the batch went; `None` when delivery failed
/// * `output_path` - Destination of the markdown file
pub async fn write_run_report(
    summary: &RunSummary,
    receipt: Option<&DeliveryReceipt>,
    output_path: &Path,
) -> std::io::Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(output_path, format_run_report(summary, receipt)).await
}

/// Formats the report for a run
pub fn format_run_report(summary: &RunSummary, receipt: Option<&DeliveryReceipt>) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Gleaner Run Report: {}\n\n", summary.site));

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Site**: {}\n", summary.site));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    let duration = (summary.finished_at - summary.started_at).num_seconds().max(0);
    md.push_str(&format!("- **Duration**: {} seconds\n", duration));
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    if let Some(hash) = &summary.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push('\n');

    md.push_str("## Results\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Pages visited | {} |\n", summary.pages_visited));
    md.push_str(&format!("| Records | {} |\n", summary.records));
    md.push_str(&format!(
        "| Records without content | {} |\n",
        summary.records_without_content
    ));
    md.push_str(&format!("| Warnings | {} |\n", summary.warning_count()));
    md.push_str(&format!("| Errors | {} |\n\n", summary.error_count()));

    md.push_str("## Delivery\n\n");
    match receipt {
        Some(receipt) => {
            md.push_str(&format!("- **Sink**: {}\n", receipt.sink));
            md.push_str(&format!("- **Location**: {}\n", receipt.location));
            md.push_str(&format!(
                "- **Delivered**: {}\n\n",
                receipt.delivered_at.to_rfc3339()
            ));
        }
        None => md.push_str("Delivery failed; the batch was not stored.\n\n"),
    }

    if !summary.issues.is_empty() {
        md.push_str("## Issues\n\n");
        md.push_str("| Page | Severity | Message |\n");
        md.push_str("|------|----------|---------|\n");
        for issue in summary.issues.iter().take(MAX_LISTED_ISSUES) {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                issue.page_number,
                issue.severity,
                issue.message.replace('|', "\\|")
            ));
        }
        if summary.issues.len() > MAX_LISTED_ISSUES {
            md.push_str(&format!(
                "\n... and {} more\n",
                summary.issues.len() - MAX_LISTED_ISSUES
            ));
        }
        md.push('\n');
    }

    md
}
