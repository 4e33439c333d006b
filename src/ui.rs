use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::progress::{ProgressObserver, ProgressUpdate};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    pub fn is_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.is_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            log::info!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Observer that renders per-image progress for this UI mode.
    pub fn progress_line(&self) -> ProgressLine {
        if self.is_pretty() {
            let bar = ProgressBar::new(0);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{bar:30} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            ProgressLine { bar: Some(bar) }
        } else {
            ProgressLine { bar: None }
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            log::info!("{message}");
        }
    }
}

/// In-place status line on an interactive stderr; plain mode logs the same
/// text at debug level so it still reaches the run log.
pub struct ProgressLine {
    bar: Option<ProgressBar>,
}

impl ProgressObserver for ProgressLine {
    fn on_progress(&mut self, update: &ProgressUpdate) {
        let line = update.status_line();
        match &self.bar {
            Some(bar) => {
                bar.set_length(update.total as u64);
                bar.set_position(update.processed as u64);
                bar.set_message(line);
            }
            None => log::debug!("{}", line),
        }
    }

    fn on_finish(&mut self) {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_only_on_terminals_and_never_in_plain_mode() {
        assert!(!Ui::from_args(Some("pretty"), false).is_pretty());
        assert!(!Ui::from_args(Some("plain"), true).is_pretty());
        assert!(Ui::from_args(Some("auto"), true).is_pretty());
        assert!(Ui::from_args(None, true).is_pretty());
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn plain_progress_line_accepts_updates() {
        let mut line = Ui::new(UiMode::Plain, false).progress_line();
        let update = ProgressUpdate::compute(Duration::from_secs(2), 1, 2, 3).unwrap();
        line.on_progress(&update);
        line.on_finish();
        assert!(line.bar.is_none());
    }
}
