use indicatif::{ProgressBar, ProgressStyle};

/// A progress bar counting finished scenarios, or a hidden one if progress is not wanted.
pub(crate) fn scenario_progress(total: usize, no_progress: bool) -> ProgressBar {
    if no_progress {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    match ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] {pos}/{len} scenarios [{elapsed_precise}] {msg}",
    ) {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => log::warn!("Failed to set progress style: {e}"),
    }

    pb
}
