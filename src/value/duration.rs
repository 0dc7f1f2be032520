use super::{format_number, parse_number};

const UNITS: &[(&str, f64)] = &[("h", 3600.0), ("m", 60.0), ("s", 1.0)];

/// Parse a duration such as `500ms`, `1.5m`, `2h` or a bare `3` (seconds).
///
/// Returns the duration in seconds.
pub fn parse_duration(input: &str) -> Result<f64, String> {
    let lower = input.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return Err("empty duration".to_string());
    }

    let (literal, factor) = if let Some(literal) = lower.strip_suffix("ms") {
        (literal, 0.001)
    } else if let Some(literal) = lower.strip_suffix('h') {
        (literal, 3600.0)
    } else if let Some(literal) = lower.strip_suffix('m') {
        (literal, 60.0)
    } else if let Some(literal) = lower.strip_suffix('s') {
        (literal, 1.0)
    } else {
        (lower.as_str(), 1.0)
    };

    let value = parse_number(literal)?;
    Ok(value * factor)
}

/// Format seconds using the largest unit whose magnitude is at least one.
pub fn format_duration(seconds: f64) -> String {
    for (unit, factor) in UNITS {
        if seconds >= *factor {
            return format!("{}{unit}", format_number(seconds / factor));
        }
    }
    format!("{}ms", format_number(seconds * 1000.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1h", 3600.0)]
    #[case("1ms", 0.001)]
    #[case("1.5m", 90.0)]
    #[case("3", 3.0)]
    #[case("2s", 2.0)]
    #[case("250MS", 0.25)]
    #[case("s", 1.0)]
    #[case("0", 0.0)]
    fn test_parse_duration(#[case] input: &str, #[case] expected: f64) {
        assert_eq!(parse_duration(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("1x")]
    #[case("-2s")]
    #[case("1.5.3m")]
    fn test_parse_duration_errors(#[case] input: &str) {
        assert!(parse_duration(input).is_err());
    }

    #[rstest]
    #[case(90.0, "1.5m")]
    #[case(3600.0, "1h")]
    #[case(0.5, "500ms")]
    #[case(1.0, "1s")]
    #[case(0.0, "0ms")]
    #[case(45.0, "45s")]
    fn test_format_duration(#[case] seconds: f64, #[case] expected: &str) {
        assert_eq!(format_duration(seconds), expected);
    }

    #[rstest]
    #[case("1.5m")]
    #[case("1h")]
    #[case("20ms")]
    #[case("7s")]
    fn test_duration_round_trip(#[case] text: &str) {
        assert_eq!(format_duration(parse_duration(text).unwrap()), text);
    }
}
