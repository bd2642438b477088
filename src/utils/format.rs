//! Human-readable formatting for notification payloads.

/// Format an elapsed duration in milliseconds.
///
/// Under a minute the millisecond precision matters (`0.500s`), under an
/// hour minutes and seconds do (`01:05min`), beyond that hours and minutes
/// (`02:00h`).
pub fn format_elapsed(millis: u64) -> String {
    if millis < 60_000 {
        format!("{}.{:03}s", millis / 1000, millis % 1000)
    } else if millis < 3_600_000 {
        format!("{:02}:{:02}min", millis / 60_000, (millis % 60_000) / 1000)
    } else {
        format!("{:02}:{:02}h", millis / 3_600_000, (millis % 3_600_000) / 60_000)
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
