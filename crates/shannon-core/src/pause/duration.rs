//! `NhNmNs`-style duration parsing for `/pause <duration>`.

use std::sync::OnceLock;

use regex::Regex;

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").expect("static duration regex is valid")
    })
}

/// Parse a duration string like `"1h30m15s"` into whole seconds. At least
/// one of the `h`/`m`/`s` components must be present; an empty string or
/// anything not matching the grammar returns `None`.
pub fn parse_duration_secs(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    let caps = duration_regex().captures(s)?;
    if caps.get(1).is_none() && caps.get(2).is_none() && caps.get(3).is_none() {
        return None;
    }
    let component = |i: usize| -> u64 {
        caps.get(i)
            .map(|m| m.as_str().parse::<u64>().unwrap_or(0))
            .unwrap_or(0)
    };
    Some(component(1) * 3600 + component(2) * 60 + component(3))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_table_matches_spec() {
        assert_eq!(parse_duration_secs("2h"), Some(7200));
        assert_eq!(parse_duration_secs("30m"), Some(1800));
        assert_eq!(parse_duration_secs("1h30m"), Some(5400));
        assert_eq!(parse_duration_secs("1h30m15s"), Some(5415));
        assert_eq!(parse_duration_secs("abc"), None);
        assert_eq!(parse_duration_secs(""), None);
    }

    #[test]
    fn seconds_only() {
        assert_eq!(parse_duration_secs("45s"), Some(45));
    }
}
