use crate::error::{ClipError, Result};

/// Parse `SS`, `MM:SS` or `HH:MM:SS` into whole seconds.
///
/// Empty or absent input returns `None`, which callers treat as "use the default"
/// (0 for a start time, the full duration for an end time).
pub fn parse_time(input: Option<&str>) -> Result<Option<u64>> {
    let input = match input.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(s) => s,
    };

    let fields = input
        .split(':')
        .map(|field| field.parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| ClipError::InvalidTimeFormat(input.to_string()))?;

    let seconds = match fields.as_slice() {
        [s] => Some(*s),
        [m, s] => m.checked_mul(60).and_then(|v| v.checked_add(*s)),
        [h, m, s] => h
            .checked_mul(3600)
            .and_then(|v| m.checked_mul(60).and_then(|mins| v.checked_add(mins)))
            .and_then(|v| v.checked_add(*s)),
        _ => None,
    };

    seconds
        .map(Some)
        .ok_or_else(|| ClipError::InvalidTimeFormat(input.to_string()))
}

/// Format seconds as `MM:SS`.
///
/// Hours are folded into the minutes field, so 3661 seconds renders as `61:01`.
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}
