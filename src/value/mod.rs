//! Textual encodings for the numeric values carried by policies.

pub mod chunk;
pub mod duration;
pub mod speed;

pub use chunk::{ChunkSizes, format_chunk_sizes, parse_chunk_sizes};
pub use duration::{format_duration, parse_duration};
pub use speed::{format_speed, parse_speed};

/// Render a float with at most six decimals and no trailing zeros.
pub(crate) fn format_number(value: f64) -> String {
    let text = format!("{value:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Parse a non-negative, finite number. An empty literal counts as 1.
pub(crate) fn parse_number(literal: &str) -> Result<f64, String> {
    if literal.is_empty() {
        return Ok(1.0);
    }
    let value = literal
        .parse::<f64>()
        .map_err(|_| format!("'{literal}' is not a number"))?;
    if !value.is_finite() {
        return Err(format!("'{literal}' is not a finite number"));
    }
    if value < 0.0 {
        return Err("negative values are not allowed".to_string());
    }
    Ok(value)
}
