//! Shared formatting helpers for CLI commands.

/// Formats milliseconds as duration string.
/// Returns "Xh Ym" if >= 1 hour, "Xm" if < 1 hour.
pub fn format_duration(ms: i64) -> String {
    if ms < 0 {
        return "0m".to_string();
    }
    let total_minutes = ms / 60_000;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Generates a 10-character progress bar for a ratio in `[0, 1]`.
/// Any progress below one block still shows a single block.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "ratio is clamped to [0, 1] before scaling"
)]
pub fn progress_bar(ratio: f64) -> String {
    let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
    let filled = if ratio > 0.0 && ratio < 0.05 {
        1
    } else {
        (ratio * 10.0).round() as usize
    };
    format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0m");
        assert_eq!(format_duration(45 * 60_000), "45m");
        assert_eq!(format_duration(65 * 60_000), "1h 5m");
        assert_eq!(format_duration(-1), "0m");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.0), "░░░░░░░░░░");
        assert_eq!(progress_bar(0.01), "█░░░░░░░░░");
        assert_eq!(progress_bar(0.5), "█████░░░░░");
        assert_eq!(progress_bar(1.7), "██████████");
    }
}
