//! Durations written the short way: `500ms`, `10s`, `2m`, `1h30m`.
//!
//! A bare number is a number of seconds. Use as
//! `#[serde(with = "crate::duration")]`.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;
use std::time::Duration;

pub fn parse(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("expected a number in {input:?}"));
        }
        let value: u64 = rest[..digits].parse().map_err(|_| format!("number too large in {input:?}"))?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let (unit, tail) = rest.split_at(unit_len);
        rest = tail;
        let seconds = |factor: u64| value.checked_mul(factor).map(Duration::from_secs);
        let part = match unit.trim() {
            "ms" => Some(Duration::from_millis(value)),
            "s" => seconds(1),
            "m" => seconds(60),
            "h" => seconds(3600),
            "" => return Err(format!("missing unit in {input:?}")),
            other => return Err(format!("unknown unit {other:?} in {input:?}")),
        };
        total = part
            .and_then(|part| total.checked_add(part))
            .ok_or_else(|| format!("duration too large: {input:?}"))?;
    }
    Ok(total)
}

/// The shortest exact rendering that [`parse`] reads back.
pub fn render(duration: Duration) -> String {
    if duration.subsec_millis() != 0 {
        return format!("{}ms", duration.as_millis());
    }
    match duration.as_secs() {
        0 => "0s".to_string(),
        secs if secs % 3600 == 0 => format!("{}h", secs / 3600),
        secs if secs % 60 == 0 => format!("{}m", secs / 60),
        secs => format!("{secs}s"),
    }
}

pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&render(*duration))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    deserializer.deserialize_any(DurationVisitor)
}

struct DurationVisitor;
impl<'de> Visitor<'de> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a duration such as \"10s\", \"2m\" or \"500ms\", or a number of seconds")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
        parse(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
        Ok(Duration::from_secs(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
        u64::try_from(value)
            .map(Duration::from_secs)
            .map_err(|_| E::custom("duration cannot be negative"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("10s", Duration::from_secs(10))]
    #[case("2m", Duration::from_secs(120))]
    #[case("500ms", Duration::from_millis(500))]
    #[case("1h30m", Duration::from_secs(5400))]
    #[case("1m 30s", Duration::from_secs(90))]
    #[case("45", Duration::from_secs(45))]
    #[case(" 0s ", Duration::ZERO)]
    fn test_parse(#[case] input: &str, #[case] expected: Duration) {
        assert_eq!(parse(input), Ok(expected));
    }

    #[rstest]
    #[case("")]
    #[case("s")]
    #[case("10x")]
    #[case("10 parsecs")]
    #[case("-5s")]
    #[case("99999999999999999999s")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(parse(input).is_err(), "{input:?} should not parse");
    }

    #[rstest]
    #[case(Duration::from_secs(10), "10s")]
    #[case(Duration::from_secs(120), "2m")]
    #[case(Duration::from_secs(7200), "2h")]
    #[case(Duration::from_millis(1500), "1500ms")]
    #[case(Duration::ZERO, "0s")]
    fn test_render(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(render(duration), expected);
        assert_eq!(parse(expected), Ok(duration));
    }
}
