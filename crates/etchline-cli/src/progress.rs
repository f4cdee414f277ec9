//! Progress rendering for the CLI
//!
//! Both sinks receive the aggregated job progress: [`BarSink`] draws it with
//! indicatif, [`JsonLinesSink`] prints one JSON object per update.

use etchline_core::{Procedure, ProgressSink, ProgressUpdate};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;

/// Resolution of the progress bar, in steps per 100%
const BAR_LENGTH: u64 = 1000;

/// Format a byte count for display
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Draws job progress as a single terminal bar
pub struct BarSink {
    bar: ProgressBar,
    descriptions: Vec<&'static str>,
    step: Option<usize>,
}

impl BarSink {
    /// Create a bar for `procedure`, hidden when `quiet`
    pub fn new(procedure: &Procedure, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(BAR_LENGTH)
        };

        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} {msg:<24} [{bar:40.cyan/blue}] {percent:>3}% ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );

        Self {
            bar,
            descriptions: procedure
                .steps()
                .iter()
                .map(|s| s.action.description())
                .collect(),
            step: None,
        }
    }

    fn describe(&mut self, step: Option<usize>) {
        if step.is_some() && step != self.step {
            self.step = step;
            if let Some(description) = step.and_then(|i| self.descriptions.get(i)) {
                self.bar.set_message(*description);
            }
        }
    }
}

impl ProgressSink for BarSink {
    fn publish(&mut self, update: ProgressUpdate) {
        if update.completed {
            if update.error.is_some() {
                self.bar.abandon();
            } else {
                self.bar.set_position(BAR_LENGTH);
                self.bar.finish_and_clear();
            }
            return;
        }

        self.describe(update.step);

        if update.indefinite {
            self.bar.tick();
        } else if let Some(percentage) = update.percentage {
            let position = (percentage / 100.0 * BAR_LENGTH as f64).round() as u64;
            self.bar.set_position(position.min(BAR_LENGTH));
        }
    }
}

/// Prints every update as a JSON line
pub struct JsonLinesSink<W> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    /// Write updates to `out`
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> ProgressSink for JsonLinesSink<W> {
    fn publish(&mut self, update: ProgressUpdate) {
        let line = match update.to_json() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to serialize progress update: {}", e);
                return;
            }
        };
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            tracing::warn!("Failed to write progress update: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etchline_core::{Action, ProgressAggregator, Step};

    fn procedure() -> Procedure {
        Procedure::new(vec![
            Step::new(Action::WriteImage, 1.0),
            Step::new(Action::VerifyImage, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024 * 1024), "1 MiB");
    }

    #[test]
    fn test_json_lines_sink() {
        let mut aggregator = ProgressAggregator::new(2, procedure(), JsonLinesSink::new(Vec::new()));
        aggregator.on_procedure_start(0).unwrap();
        aggregator.on_action_start(0).unwrap();
        aggregator.on_worker_progress(Some(0.5)).unwrap();
        aggregator.on_procedure_done().unwrap();

        let out = String::from_utf8(aggregator.into_sink().out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);

        let third: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(third["percentage"], 25.0);
        assert_eq!(third["job_id"], 2);

        let last: serde_json::Value = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(last["completed"], true);
    }

    #[test]
    fn test_bar_sink_tracks_position() {
        let mut aggregator = ProgressAggregator::new(1, procedure(), BarSink::new(&procedure(), true));
        aggregator.on_procedure_start(0).unwrap();
        aggregator.on_action_start(0).unwrap();
        aggregator.on_action_done().unwrap();
        aggregator.on_action_start(1).unwrap();
        aggregator.on_worker_progress(Some(0.5)).unwrap();

        let sink = aggregator.into_sink();
        assert_eq!(sink.bar.position(), 750);
        assert_eq!(sink.step, Some(1));
    }
}
