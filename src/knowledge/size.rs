const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Parses sizes like "2M", "512K" or "1g" into bytes. A bare number is bytes,
/// and anything without leading digits is zero.
pub fn parse_size(size: &str) -> u64 {
    let size = size.trim();
    let digits: String = size.chars().take_while(|c| c.is_ascii_digit()).collect();
    let value = digits.parse::<u64>().unwrap_or(0);

    match size.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('G') => value.saturating_mul(GB),
        Some('M') => value.saturating_mul(MB),
        Some('K') => value.saturating_mul(KB),
        _ => value,
    }
}

pub fn format_size(bytes: u64) -> String {
    let (value, unit) = if bytes >= GB {
        (bytes as f64 / GB as f64, "GB")
    } else if bytes >= MB {
        (bytes as f64 / MB as f64, "MB")
    } else if bytes >= KB {
        (bytes as f64 / KB as f64, "KB")
    } else {
        return format!("{}B", bytes);
    };

    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}{}", rounded as u64, unit)
    } else {
        format!("{:.1}{}", rounded, unit)
    }
}
