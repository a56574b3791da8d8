//! Live progress frame, drawn from snapshots on a reporter thread.

use std::io::{self, Write};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use colored::Colorize;
use fidelity::{Counters, StatsSnapshot};

const BAR_WIDTH: usize = 40;

/// Labels the frame needs besides the snapshot.
#[derive(Debug, Clone)]
pub struct FrameLabels {
    pub legacy_name: String,
    pub new_name: String,
    pub field_names: Vec<String>,
}

/// Render the newest snapshot every `refresh` until the sender hangs up.
/// Returns the last snapshot seen.
pub fn spawn(
    receiver: Receiver<StatsSnapshot>,
    refresh: Duration,
    labels: FrameLabels,
) -> JoinHandle<Option<StatsSnapshot>> {
    let refresh = refresh.max(Duration::from_millis(100));
    thread::spawn(move || {
        let mut latest: Option<StatsSnapshot> = None;
        loop {
            thread::sleep(refresh);
            let mut disconnected = false;
            loop {
                match receiver.try_recv() {
                    Ok(snapshot) => latest = Some(snapshot),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
            if let Some(snapshot) = &latest {
                print!("\x1B[2J\x1B[H{}", render(snapshot, &labels));
                let _ = io::stdout().flush();
            }
            if disconnected {
                return latest;
            }
        }
    })
}

/// One full frame of text.
pub fn render(snapshot: &StatsSnapshot, labels: &FrameLabels) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "{}  {}\n",
        snapshot.run_name.cyan().bold(),
        format!("elapsed {}", clock(snapshot.elapsed_ms / 1000)).white()
    ));
    let eta = match snapshot.eta_seconds() {
        Some(secs) => clock(secs),
        None => "--:--:--".to_string(),
    };
    out.push_str(&format!("Estimated time left: {}\n", eta.yellow()));
    out.push_str(&format!("{}\n\n", snapshot.stage_text.white().bold()));

    out.push_str(&format!(
        "Files   {} {}/{}\n",
        bar(snapshot.pairs_done as u64, snapshot.pairs_total as u64).cyan(),
        snapshot.pairs_done,
        snapshot.pairs_total
    ));
    out.push_str(&format!(
        "Records {} {}/{}\n",
        bar(snapshot.records_done, snapshot.records_total).cyan(),
        snapshot.records_done,
        snapshot.records_total
    ));
    if let Some(pair) = &snapshot.current_pair {
        out.push_str(&format!("        {}\n", pair.dimmed()));
    }
    out.push('\n');

    out.push_str(&table(&snapshot.run, labels));

    if !snapshot.field_errors.is_empty() {
        out.push_str(&format!("\n{}\n", "Field errors:".yellow().bold()));
        for (&index, &count) in &snapshot.field_errors {
            let name = labels
                .field_names
                .get(index)
                .map(String::as_str)
                .unwrap_or("?");
            out.push_str(&format!(
                "  {:>3} {:<24} {}\n",
                index,
                name,
                count.to_string().red()
            ));
        }
    }

    out
}

/// The two-row statistics table.
pub fn table(run: &Counters, labels: &FrameLabels) -> String {
    let cell = |title: &str, value: u64| format!("{title} {value:>10}");
    format!(
        "{:<10} {}  {}  {}  {}  {}  {}\n{:<10} {}  {}  {}  {}  {}  {}  {}\n",
        labels.legacy_name.bold(),
        cell("records", run.legacy_records),
        cell("unmatched", run.unmatched()),
        cell("lost", run.lost).red(),
        cell("repeats", run.legacy_repeats),
        cell("rejected", run.legacy_rejected).magenta(),
        cell("defective", run.defective_records).magenta(),
        labels.new_name.bold(),
        cell("records", run.new_records),
        cell("  matched", run.matched),
        cell("extra", run.extra).yellow(),
        cell("repeats", run.new_repeats),
        cell("rejected", run.new_rejected).magenta(),
        cell("   broken", run.broken_records).red(),
        cell("identical", run.identical_records).green(),
    )
}

fn bar(done: u64, total: u64) -> String {
    let filled = if total == 0 {
        0
    } else {
        ((done.min(total) as f64 / total as f64) * BAR_WIDTH as f64).round() as usize
    };
    "█".repeat(filled) + &"░".repeat(BAR_WIDTH - filled)
}

fn clock(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}
