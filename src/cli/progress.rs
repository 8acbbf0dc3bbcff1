//! Progress bar and summary reporting for CLI downloads.

use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};

use crate::events::SessionStatus;
use crate::format::format_bytes;

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Final state of one session, for the summary.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub title: String,
    pub status: SessionStatus,
    pub bytes: u64,
    pub elapsed: Option<String>,
    pub destination: Option<PathBuf>,
    pub reason: Option<String>,
}

/// Creates the bar of one session. Its length is replaced as size estimates arrive.
pub fn make_progress_bar(title: &str) -> ProgressBar {
    let bar = ProgressBar::new(1);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {prefix} - {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar.set_message(title.to_string());
    bar
}

/// Prints one line per session and a final tally.
pub fn print_summary(outcomes: &[SessionOutcome]) {
    if outcomes.is_empty() {
        return;
    }

    println!("\n{SEPARATOR}");
    println!("Download Summary");
    println!("{SEPARATOR}");

    for outcome in outcomes {
        match outcome.status {
            SessionStatus::Finish => println!(
                "  ✓ {} ({}{})\n      → {}",
                outcome.title,
                format_bytes(outcome.bytes),
                outcome
                    .elapsed
                    .as_deref()
                    .map(|e| format!(" in {e}"))
                    .unwrap_or_default(),
                outcome
                    .destination
                    .as_ref()
                    .map_or_else(String::new, |d| d.display().to_string()),
            ),
            SessionStatus::Cancelled => println!("  - {} (cancelled)", outcome.title),
            _ => println!(
                "  ✗ {} ({})",
                outcome.title,
                outcome.reason.as_deref().unwrap_or("failed")
            ),
        }
    }

    let finished = outcomes
        .iter()
        .filter(|o| o.status == SessionStatus::Finish)
        .count();
    println!("{SEPARATOR}");
    println!("  {finished}/{} download(s) finished", outcomes.len());
    println!("{SEPARATOR}");
}
