use crate::types::CycleReport;

/// One-line human summary of a finished cycle.
pub fn summary_line(report: &CycleReport) -> String {
    match report.processed {
        0 => "No new items found during this scan.".to_string(),
        1 => "1 new item processed.".to_string(),
        n => format!("{n} new items processed."),
    }
}

/// Emit the cycle report as pretty-printed JSON to stdout.
pub fn report_cycle(report: &CycleReport) {
    if let Ok(json) = serde_json::to_string_pretty(report) {
        println!("{json}");
    }
}
