//! Progress bar display for downloads
// (c) 2025 Ross Younger

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing::trace;

use super::transfer::TransferProgress;

/// Maximum update frequency we will use for the progress display
pub(crate) const MAX_UPDATE_FPS: u8 = 20;

/// A single-line style format for Indicatif which should cover most situations.
///
/// ```text
/// 11111111111111111111111111111111111111111111111111111111111111111111111111111111
/// filename [==========================            ] 2m30s @ 123.4MB/s [70%/1.24GB]
/// fairly-long-filename [====================      ] 2m30s @ 123.4MB/s [70%/1.24GB]
/// 11111111111111111111111111111111111111111111111111111111111111111111111111111111
/// ```
const PROGRESS_STYLE_COMPACT: &str = "{msg:.dim} {wide_bar:.cyan} {eta} @ {decimal_bytes_per_sec} [{percent}%/{decimal_total_bytes:.dim}]";

/// We need about 35 characters for the data readout and maybe 20 for a useful bar.
const DATA_AND_PROGRESS: usize = 55;

/// A double-line style format for when the filename is too long.
///
/// ```text
/// 11111111111111111111111111111111111111111111111111111111111111111111111111111111
/// extremely-long-filename-no-really-very-long                         [70%/1.24GB]
/// [==========================                                  ] 2m30s @ 123.4MB/s
/// 11111111111111111111111111111111111111111111111111111111111111111111111111111111
/// ```
const PROGRESS_STYLE_OVERLONG: &str = "{wide_msg:.dim} [{percent}%/{decimal_total_bytes:.dim}]\n{wide_bar:.cyan} {eta} @ {decimal_bytes_per_sec}";

/// Determine and retrieve the appropriate progress style to use
fn style_for(msg_size: usize) -> &'static str {
    let term_width = usize::from(console::Term::stderr().size().1); // this returns a reasonable default if it can't detect
    if msg_size + DATA_AND_PROGRESS > term_width {
        PROGRESS_STYLE_OVERLONG
    } else {
        PROGRESS_STYLE_COMPACT
    }
}

fn bar_for(display: &MultiProgress, transfer: &TransferProgress, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template(style_for(transfer.filename.len()))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    display.add(
        ProgressBar::new(u64::from(transfer.final_size))
            .with_style(style)
            .with_message(transfer.filename.clone()),
    )
}

/// Keeps one progress bar per open transfer, until the session goes away.
pub(crate) async fn show_progress(
    mut updates: watch::Receiver<Vec<TransferProgress>>,
    display: MultiProgress,
    quiet: bool,
) {
    let mut bars: HashMap<u16, ProgressBar> = HashMap::new();
    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();
        bars.retain(|id, bar| {
            let open = snapshot.iter().any(|t| t.id == *id);
            if !open {
                bar.finish_and_clear();
            }
            open
        });
        for transfer in &snapshot {
            trace!("{transfer}");
            bars.entry(transfer.id)
                .or_insert_with(|| bar_for(&display, transfer, quiet))
                .set_position(u64::from(transfer.received));
        }
    }
    for bar in bars.values() {
        bar.finish_and_clear();
    }
}
