//! Progress UI (spinner) for batch runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use archiver_core::Ledger;
use indicatif::{ProgressBar, ProgressStyle};

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    ledger: Ledger,
    total: usize,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(ledger, total, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    ledger: Ledger,
    total: usize,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            let counts = ledger.client_counts_by_status().await.unwrap_or_default();
            let done: i64 = counts
                .iter()
                .filter(|(status, _)| status != "pending" && status != "in_progress")
                .map(|(_, count)| count)
                .sum();
            let in_progress = counts
                .iter()
                .any(|(status, count)| status == "in_progress" && *count > 0);

            let done = usize::try_from(done).unwrap_or(0);
            let current = if in_progress { done + 1 } else { done };
            spinner.set_message(format!(
                "[{}/{}] Processing clients...",
                current.min(total),
                total
            ));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}
