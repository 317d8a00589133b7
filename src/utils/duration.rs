//! Duration formatting utilities

/// Format an uptime in seconds as days and hours ("3d 4h", "7h").
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else {
        format!("{}h", hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_hour_uptime_rounds_to_zero_hours() {
        assert_eq!(format_uptime(59), "0h");
        assert_eq!(format_uptime(3599), "0h");
    }

    #[test]
    fn hours_only_below_a_day() {
        assert_eq!(format_uptime(3600), "1h");
        assert_eq!(format_uptime(7 * 3600 + 120), "7h");
    }

    #[test]
    fn days_and_hours() {
        assert_eq!(format_uptime(86400), "1d 0h");
        assert_eq!(format_uptime(3 * 86400 + 4 * 3600), "3d 4h");
    }
}
