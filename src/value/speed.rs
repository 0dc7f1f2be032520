use super::{format_number, parse_number};

const KB: f64 = 1024.0;

const UNITS: &[(&str, f64)] = &[("GB", KB * KB * KB), ("MB", KB * KB), ("KB", KB)];

/// Parse a transfer rate such as `1MB/s`, `512k`, `0.5mb` or `100` into bytes per second.
pub fn parse_speed(input: &str) -> Result<f64, String> {
    let lower = input.trim().to_ascii_lowercase();
    let rest = lower.strip_suffix("/s").unwrap_or(&lower);
    let rest = rest.strip_suffix('b').unwrap_or(rest);

    let (literal, factor) = match rest.chars().last() {
        Some('k') => (&rest[..rest.len() - 1], KB),
        Some('m') => (&rest[..rest.len() - 1], KB * KB),
        Some('g') => (&rest[..rest.len() - 1], KB * KB * KB),
        _ => (rest, 1.0),
    };

    if literal.is_empty() {
        return Err("missing numeric rate".to_string());
    }

    let value = parse_number(literal)? * factor;
    if value <= 0.0 {
        return Err("rate must be greater than zero".to_string());
    }
    Ok(value)
}

/// Format bytes per second using the largest of B/KB/MB/GB whose value is at least one.
pub fn format_speed(bytes_per_sec: f64) -> String {
    for (unit, factor) in UNITS {
        if bytes_per_sec >= *factor {
            return format!("{}{unit}/s", format_number(bytes_per_sec / factor));
        }
    }
    format!("{}B/s", format_number(bytes_per_sec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1MB/s", 1024.0 * 1024.0)]
    #[case("0.5mb", 512.0 * 1024.0)]
    #[case("1KB/s", 1024.0)]
    #[case("2k", 2048.0)]
    #[case("1G", 1024.0 * 1024.0 * 1024.0)]
    #[case("100", 100.0)]
    #[case("100b/s", 100.0)]
    #[case("3B", 3.0)]
    fn test_parse_speed(#[case] input: &str, #[case] expected: f64) {
        assert_eq!(parse_speed(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("kb/s")]
    #[case("fast")]
    #[case("0")]
    #[case("-1KB")]
    #[case("1TB")]
    fn test_parse_speed_errors(#[case] input: &str) {
        assert!(parse_speed(input).is_err());
    }

    #[rstest]
    #[case(1024.0 * 1024.0, "1MB/s")]
    #[case(1536.0, "1.5KB/s")]
    #[case(512.0, "512B/s")]
    #[case(0.5, "0.5B/s")]
    #[case(2.0 * 1024.0 * 1024.0 * 1024.0, "2GB/s")]
    fn test_format_speed(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(format_speed(value), expected);
    }

    #[test]
    fn test_speed_round_trip() {
        assert_eq!(format_speed(parse_speed("1MB/s").unwrap()), "1MB/s");
        assert_eq!(format_speed(parse_speed("1KB/s").unwrap()), "1KB/s");
    }
}
