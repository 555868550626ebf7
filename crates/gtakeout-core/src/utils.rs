//! Formatting and ETA helpers for progress messages.

use std::time::Duration;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human readable byte count, e.g. `512 B`, `1.50 KB`, `2.00 GB`
pub fn format_bytes(num_bytes: u64) -> String {
    let mut size = num_bytes as f64;
    let mut unit_idx = 0;
    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }
    if unit_idx == 0 {
        format!("{} {}", num_bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Compact duration, e.g. `1h 2m 3s`, `2m 3s`, `3s`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, mins, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Remaining time assuming every item takes the average time so far
pub fn estimate_eta_from_counts(completed: usize, total: usize, elapsed: Duration) -> Option<Duration> {
    if completed == 0 || total == 0 || completed >= total || elapsed.is_zero() {
        return None;
    }
    let per_item = elapsed.as_secs_f64() / completed as f64;
    Some(Duration::from_secs_f64(per_item * (total - completed) as f64))
}

/// Remaining time assuming the byte rate so far holds
pub fn estimate_eta_from_bytes(bytes_done: u64, bytes_total: u64, elapsed: Duration) -> Option<Duration> {
    if bytes_done == 0 || bytes_total == 0 || bytes_done >= bytes_total || elapsed.is_zero() {
        return None;
    }
    let rate = bytes_done as f64 / elapsed.as_secs_f64();
    Some(Duration::from_secs_f64((bytes_total - bytes_done) as f64 / rate))
}
