//! Parsing for the `"1w2d3h4m5s"` duration grammar used by `step.sleep`
//! (spec §6 "Time strings"). Any component is optional but order is fixed.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::error::{InngestError, Result};

static PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").unwrap()
});

/// Parse a duration string like `"1w2d3h4m5s"` into a [`Duration`]. All
/// components are optional, but must appear in `w > d > h > m > s` order.
/// An empty match (e.g. `""`) is rejected as invalid.
pub fn parse_duration_string(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InngestError::InvalidArgument(
            "empty duration string".into(),
        ));
    }

    let caps = PATTERN
        .captures(trimmed)
        .filter(|c| c.iter().skip(1).any(|g| g.is_some()))
        .ok_or_else(|| InngestError::InvalidArgument(format!("invalid duration string: {input}")))?;

    let component = |idx: usize| -> Result<u64> {
        match caps.get(idx) {
            Some(m) => m
                .as_str()
                .parse::<u64>()
                .map_err(|e| InngestError::InvalidArgument(e.to_string())),
            None => Ok(0),
        }
    };

    let weeks = component(1)?;
    let days = component(2)?;
    let hours = component(3)?;
    let minutes = component(4)?;
    let seconds = component(5)?;

    let total_secs = weeks * 7 * 24 * 3600 + days * 24 * 3600 + hours * 3600 + minutes * 60 + seconds;
    Ok(Duration::from_secs(total_secs))
}
