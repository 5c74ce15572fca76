use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::upgrade::ProgressSnapshot;

/// Spinner style used during ongoing operations.
/// - Yellow spinner with animated braille-style frames.
/// - Displays the current message (`{wide_msg}`) next to the spinner.
pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[33m{spinner}\x1b[0m {wide_msg}")
        .unwrap()
        .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"])
}

/// Style used when an operation finishes successfully.
pub fn ok_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[32m✔\x1b[0m {wide_msg}").unwrap()
}

/// Style used when an operation fails with an error.
pub fn err_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[31m✘\x1b[0m {wide_msg}").unwrap()
}

/// Style of the download status line; the message is a [`ProgressSnapshot`].
pub fn download_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[36m↓\x1b[0m {wide_msg}").unwrap()
}

/// Start a spinner with `msg`, or a hidden bar when output is off.
pub fn spinner(visible: bool, msg: impl Into<String>) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(msg.into());
    pb
}

/// Renders download snapshots on one redrawn line.
pub struct DownloadBar {
    pb: ProgressBar,
}

impl DownloadBar {
    pub fn new(visible: bool) -> Self {
        let pb = if visible {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(download_style());
        Self { pb }
    }

    pub fn update(&self, snapshot: &ProgressSnapshot) {
        if snapshot.finished {
            self.pb.finish_with_message(snapshot.to_string());
        } else {
            self.pb.set_message(snapshot.to_string());
        }
    }
}
