/// Formats seconds as `mm:ss.mmm` for labels.
///
/// Milliseconds are rounded half-up on the decimal form of the value, so
/// `1.2345` becomes `00:01.235` even though its binary representation is a
/// hair below the midpoint. Negative and non-finite inputs display as zero.
/// Minutes are not wrapped into hours, and absurdly large values saturate
/// instead of overflowing.
pub fn format_time(seconds: f64) -> String {
    let ms_total = total_millis_half_up(seconds);
    let minutes = ms_total / 60_000;
    let rem = ms_total % 60_000;
    let secs = rem / 1000;
    let ms = rem % 1000;
    format!("{:02}:{:02}.{:03}", minutes, secs, ms)
}

fn total_millis_half_up(seconds: f64) -> u128 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }

    // Display for f64 is the shortest round-trip decimal and never uses exponents
    let text = seconds.to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text.as_str(), ""),
    };

    // Only overflow can fail here: Display gives plain ASCII digits
    let whole: u128 = int_part.parse().unwrap_or(u128::MAX);
    let digits: Vec<u32> = frac_part.chars().filter_map(|c| c.to_digit(10)).collect();

    let mut millis = 0u128;
    for i in 0..3 {
        millis = millis * 10 + digits.get(i).copied().unwrap_or(0) as u128;
    }
    let round_up = digits.get(3).map_or(false, |&d| d >= 5);

    whole
        .saturating_mul(1000)
        .saturating_add(millis + u128::from(round_up))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time_edge_cases() {
        assert_eq!(format_time(-1.0), "00:00.000");
        assert_eq!(format_time(0.0), "00:00.000");
        assert_eq!(format_time(0.9996), "00:01.000");
        assert_eq!(format_time(61.0), "01:01.000");
        assert!(format_time(3600.0 + 62.5).starts_with("61:02"));
    }

    #[test]
    fn test_format_time_half_up_precision() {
        assert_eq!(format_time(1.2344), "00:01.234");
        assert_eq!(format_time(1.2345), "00:01.235");
        assert_eq!(format_time(59.9995), "01:00.000");
    }

    #[test]
    fn test_format_time_non_finite_and_tiny() {
        assert_eq!(format_time(f64::NAN), "00:00.000");
        assert_eq!(format_time(f64::NEG_INFINITY), "00:00.000");
        assert_eq!(format_time(0.0004), "00:00.000");
        assert_eq!(format_time(0.0005), "00:00.001");
    }

    #[test]
    fn test_format_time_huge_values_saturate() {
        let saturated = format_time(1e39);
        assert_ne!(saturated, "00:00.000");
        assert_eq!(format_time(1e36), saturated);
        assert_eq!(format_time(f64::MAX), saturated);
        assert!(format_time(1e30).starts_with("16666666666666666666666666666:40"));
    }
}
