use indicatif::{ProgressBar, ProgressStyle};

fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {percent} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Progress bar over `len` units, hidden when there is a single unit
pub fn progress_bar(len: u64, message: &str) -> ProgressBar {
    let pb = if len > 1 {
        ProgressBar::new(len)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(progress_style());
    pb.set_message(message.to_string());
    pb
}
