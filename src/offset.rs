//! Time and percentage offsets as they appear in VAST attributes.

use once_cell::sync::Lazy;
use regex::Regex;

static ABSOLUTE_OFFSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{2}):([0-9]{2}):([0-9]{2})(?:\.([0-9]{3}))?$").expect("absolute offset pattern")
});

static PERCENTAGE_OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{1,2}|100)%$").expect("percentage offset pattern"));

/// `HH:MM:SS` or `HH:MM:SS.mmm`.
pub fn is_absolute_offset(value: &str) -> bool {
    ABSOLUTE_OFFSET.is_match(value)
}

/// `0%` through `99%`, or `100%`.
pub fn is_percentage_offset(value: &str) -> bool {
    PERCENTAGE_OFFSET.is_match(value)
}

/// Milliseconds from an absolute offset, `None` when the value is not one.
pub fn parse_absolute_offset(value: &str) -> Option<u32> {
    let caps = ABSOLUTE_OFFSET.captures(value.trim())?;
    let field = |i: usize| caps.get(i).map_or(Some(0), |m| m.as_str().parse::<u32>().ok());

    let hours = field(1)?;
    let minutes = field(2)?;
    let seconds = field(3)?;
    let millis = field(4)?;

    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

/// Fraction in `[0, 1]` from a percentage offset.
pub fn parse_percentage_offset(value: &str) -> Option<f32> {
    let caps = PERCENTAGE_OFFSET.captures(value.trim())?;
    caps[1].parse::<f32>().ok().map(|percent| percent / 100.0)
}

/// Viewable play time: an absolute offset, or plain (possibly fractional)
/// seconds. Negative values are rejected.
pub fn parse_viewable_playtime(value: &str) -> Option<u32> {
    let value = value.trim();
    if is_absolute_offset(value) {
        return parse_absolute_offset(value);
    }

    match value.parse::<f32>() {
        Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => Some((seconds * 1000.0) as u32),
        Ok(_) => None,
        Err(_) => {
            log::debug!("Invalid viewablePlaytime format: {value}");
            None
        }
    }
}

/// `HH:MM:SS.mmm`; hours are not wrapped at 24.
pub fn format_content_play_head(millis: u64) -> String {
    let hours = millis / 3_600_000;
    let minutes = (millis / 60_000) % 60;
    let seconds = (millis / 1000) % 60;
    let ms = millis % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_offset() {
        assert_eq!(parse_absolute_offset("01:02:03.456"), Some(3_723_456));
        assert_eq!(parse_absolute_offset("00:00:10"), Some(10_000));
        assert_eq!(parse_absolute_offset(" 00:00:05.000 "), Some(5_000));
        assert_eq!(parse_absolute_offset("malformed"), None);
        assert_eq!(parse_absolute_offset("1:02:03"), None);
        assert_eq!(parse_absolute_offset("01:02:03.45"), None);
        assert_eq!(parse_absolute_offset("01:02:03.4567"), None);
        assert!(is_absolute_offset("00:00:30"));
        assert!(!is_absolute_offset("00-00-30"));
        assert!(!is_absolute_offset("٠٠:00:30"));
    }

    #[test]
    fn test_percentage_offsets() {
        assert!(is_percentage_offset("0%"));
        assert!(is_percentage_offset("25%"));
        assert!(is_percentage_offset("100%"));
        assert!(!is_percentage_offset("101%"));
        assert!(!is_percentage_offset("25"));
        assert!(!is_percentage_offset("%"));
        assert!(!is_percentage_offset("١٠%"));
        assert_eq!(parse_percentage_offset("50%"), Some(0.5));
        assert_eq!(parse_percentage_offset("00:00:05"), None);
    }

    #[test]
    fn test_viewable_playtime_forms() {
        assert_eq!(parse_viewable_playtime("2.5"), Some(2500));
        assert_eq!(parse_viewable_playtime("3"), Some(3000));
        assert_eq!(parse_viewable_playtime("00:00:03.500"), Some(3500));
        assert_eq!(parse_viewable_playtime("-1"), None);
        assert_eq!(parse_viewable_playtime("soon"), None);
    }

    #[test]
    fn test_format_content_play_head() {
        assert_eq!(format_content_play_head(3_723_456), "01:02:03.456");
        assert_eq!(format_content_play_head(100_000), "00:01:40.000");
        assert_eq!(format_content_play_head(1), "00:00:00.001");
        assert_eq!(format_content_play_head(360_000_000), "100:00:00.000");
    }
}
