/// Helpers shared by the batch report and the progress display.
use crate::constants::PROGRESS_BAR_TEMPLATE;
use crate::logger::is_quiet;
use indicatif::{ProgressBar, ProgressStyle};

/// Create the batch progress bar with consistent styling.
///
/// # Arguments
/// * `total` - Number of files in the batch
///
/// # Returns
/// * A hidden bar in quiet mode, a styled one otherwise
pub fn create_progress_bar(total: u64) -> ProgressBar {
    if is_quiet() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb
}

/// Format file size in human-readable format
///
/// # Arguments
/// * `bytes` - Size in bytes
///
/// # Returns
/// * Human-readable size string (e.g., "1.2 MB", "512 B")
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Calculate compression ratio as a percentage
///
/// Positive means the file shrank, negative means it grew.
pub fn calculate_compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    ((original_size as f64 - compressed_size as f64) / original_size as f64) * 100.0
}

/// `"1.5 KB → 512 B (-66.7%)"`
pub fn describe_size_change(original_size: u64, compressed_size: u64) -> String {
    // Subtracting from zero keeps unchanged files at +0.0 rather than -0.0.
    let change = 0.0 - calculate_compression_ratio(original_size, compressed_size);
    format!(
        "{} → {} ({:+.1}%)",
        format_file_size(original_size),
        format_file_size(compressed_size),
        change
    )
}
