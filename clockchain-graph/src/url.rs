//! Canonical path codec
//!
//! Maps the temporal and location fields of a moment onto its canonical
//! eight-segment path and back:
//!
//! ```text
//! /<year>/<month>/<day>/<time>/<country>/<region>/<city>/<slug>
//! /1969/july/20/2056/united-states/florida/cape-canaveral/apollo-11-moon-landing
//! ```
//!
//! The codec is pure: no I/O, no clock, no store access.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Lowercase English month names, index 0 is January
pub const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Segment names in path order
pub const SEGMENTS: [&str; 8] = [
    "year", "month", "day", "time", "country", "region", "city", "slug",
];

/// Month name for a 1-based month number
pub fn month_name(month: u8) -> Option<&'static str> {
    if (1..=12).contains(&month) {
        Some(MONTHS[usize::from(month) - 1])
    } else {
        None
    }
}

/// 1-based month number for a month name (case-insensitive)
pub fn month_number(name: &str) -> Option<u8> {
    let lower = name.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == lower)
        .and_then(|i| u8::try_from(i + 1).ok())
}

fn kebab_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("kebab-case pattern"))
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?[0-9]+$").expect("year pattern"))
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:[01][0-9]|2[0-3])[0-5][0-9]$").expect("time pattern"))
}

fn day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{1,2}$").expect("day pattern"))
}

/// Fully-specified path fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathFields {
    /// Signed year, negative for BCE
    pub year: i32,
    /// Month number, 1-12
    pub month: u8,
    /// Day of month, 1-31
    pub day: u8,
    /// 24-hour `HHMM`
    pub time: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub slug: String,
}

impl PathFields {
    /// Month name for this tuple, if the month number is in range
    pub fn month_name(&self) -> Option<&'static str> {
        month_name(self.month)
    }

    /// Check every field against its segment shape
    pub fn validate(&self) -> Result<()> {
        if month_name(self.month).is_none() {
            return Err(GraphError::invalid_field(
                "month",
                format!("{} is not in 1-12", self.month),
            ));
        }
        if !(1..=31).contains(&self.day) {
            return Err(GraphError::invalid_field(
                "day",
                format!("{} is not in 1-31", self.day),
            ));
        }
        if !time_re().is_match(&self.time) {
            return Err(GraphError::invalid_field(
                "time",
                format!("'{}' is not a 4-digit 24-hour time", self.time),
            ));
        }
        check_text_segment("country", &self.country)?;
        check_text_segment("region", &self.region)?;
        check_text_segment("city", &self.city)?;
        check_text_segment("slug", &self.slug)?;
        Ok(())
    }
}

fn check_text_segment(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(GraphError::invalid_field(field, "must not be empty"));
    }
    if value.contains('/') {
        return Err(GraphError::invalid_field(
            field,
            format!("'{}' contains a path separator", value),
        ));
    }
    if value.chars().any(|c| c.is_uppercase()) {
        return Err(GraphError::invalid_field(
            field,
            format!("'{}' must be lowercase", value),
        ));
    }
    if !kebab_re().is_match(value) {
        return Err(GraphError::invalid_field(
            field,
            format!("'{}' is not kebab-case", value),
        ));
    }
    Ok(())
}

/// Encode fields into their canonical path
pub fn encode(fields: &PathFields) -> Result<String> {
    fields.validate()?;
    let month = fields
        .month_name()
        .ok_or_else(|| GraphError::invalid_field("month", "out of range"))?;
    Ok(format!(
        "/{}/{}/{}/{}/{}/{}/{}/{}",
        fields.year,
        month,
        fields.day,
        fields.time,
        fields.country,
        fields.region,
        fields.city,
        fields.slug
    ))
}

/// Decode a canonical path into its fields
pub fn decode(path: &str) -> Result<PathFields> {
    let parts = split_segments(path);
    if parts.len() != SEGMENTS.len() {
        return Err(GraphError::malformed_path(
            path,
            format!("expected 8 segments, found {}", parts.len()),
        ));
    }

    Ok(PathFields {
        year: parse_year(path, parts[0])?,
        month: parse_month(path, parts[1])?,
        day: parse_day(path, parts[2])?,
        time: parse_time(path, parts[3])?,
        country: parse_text(path, "country", parts[4])?,
        region: parse_text(path, "region", parts[5])?,
        city: parse_text(path, "city", parts[6])?,
        slug: parse_text(path, "slug", parts[7])?,
    })
}

/// Leading segments of a path, each decoded with the full-path grammar
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPrefix {
    pub year: Option<i32>,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub time: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub slug: Option<String>,
}

impl PathPrefix {
    /// Number of populated leading segments
    pub fn depth(&self) -> usize {
        self.segments().len()
    }

    /// Canonical spelling of the populated segments, in path order
    pub fn segments(&self) -> Vec<String> {
        let mut out = Vec::new();
        let Some(year) = self.year else { return out };
        out.push(year.to_string());
        let Some(month) = self.month.and_then(month_name) else {
            return out;
        };
        out.push(month.to_string());
        let Some(day) = self.day else { return out };
        out.push(day.to_string());
        for seg in [
            &self.time,
            &self.country,
            &self.region,
            &self.city,
            &self.slug,
        ] {
            match seg {
                Some(s) => out.push(s.clone()),
                None => break,
            }
        }
        out
    }
}

/// Decode a path prefix of 0-8 segments
pub fn decode_partial(prefix: &str) -> Result<PathPrefix> {
    let trimmed = prefix.trim_matches('/');
    let mut out = PathPrefix::default();
    if trimmed.is_empty() {
        return Ok(out);
    }

    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.len() > SEGMENTS.len() {
        return Err(GraphError::malformed_path(
            prefix,
            format!("at most 8 segments allowed, found {}", parts.len()),
        ));
    }

    for (i, seg) in parts.iter().enumerate() {
        match i {
            0 => out.year = Some(parse_year(prefix, seg)?),
            1 => out.month = Some(parse_month(prefix, seg)?),
            2 => out.day = Some(parse_day(prefix, seg)?),
            3 => out.time = Some(parse_time(prefix, seg)?),
            4 => out.country = Some(parse_text(prefix, "country", seg)?),
            5 => out.region = Some(parse_text(prefix, "region", seg)?),
            6 => out.city = Some(parse_text(prefix, "city", seg)?),
            _ => out.slug = Some(parse_text(prefix, "slug", seg)?),
        }
    }

    Ok(out)
}

fn split_segments(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').collect()
}

fn parse_year(path: &str, seg: &str) -> Result<i32> {
    if !year_re().is_match(seg) {
        return Err(GraphError::malformed_path(
            path,
            format!("year '{}' must be an optionally signed integer", seg),
        ));
    }
    seg.parse::<i32>()
        .map_err(|e| GraphError::malformed_path(path, format!("year '{}': {}", seg, e)))
}

fn parse_month(path: &str, seg: &str) -> Result<u8> {
    month_number(seg).ok_or_else(|| {
        GraphError::malformed_path(path, format!("'{}' is not a month name", seg))
    })
}

fn parse_day(path: &str, seg: &str) -> Result<u8> {
    let day = if day_re().is_match(seg) {
        seg.parse::<u8>().ok()
    } else {
        None
    };
    match day {
        Some(d) if (1..=31).contains(&d) => Ok(d),
        _ => Err(GraphError::malformed_path(
            path,
            format!("day '{}' must be 1-31", seg),
        )),
    }
}

fn parse_time(path: &str, seg: &str) -> Result<String> {
    if time_re().is_match(seg) {
        Ok(seg.to_string())
    } else {
        Err(GraphError::malformed_path(
            path,
            format!("time '{}' must be 4-digit 24-hour HHMM", seg),
        ))
    }
}

fn parse_text(path: &str, field: &str, seg: &str) -> Result<String> {
    if kebab_re().is_match(seg) {
        Ok(seg.to_string())
    } else {
        Err(GraphError::malformed_path(
            path,
            format!("{} '{}' is not kebab-case", field, seg),
        ))
    }
}

/// Reduce free text to a kebab-case segment
///
/// Latin-1 letters are folded to ASCII, punctuation is dropped, and runs of
/// whitespace, hyphens and underscores collapse to a single hyphen.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_sep = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        let piece: Option<&str> = if c.is_ascii_alphanumeric() {
            None
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_sep = true;
            continue;
        } else if let Some(folded) = fold_latin(c) {
            Some(folded)
        } else {
            continue;
        };

        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        match piece {
            Some(s) => out.push_str(s),
            None => out.push(c),
        }
    }

    out
}

fn fold_latin(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => "a",
        'æ' => "ae",
        'ç' | 'č' | 'ć' => "c",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' => "i",
        'ñ' | 'ń' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => "o",
        'œ' => "oe",
        'ß' => "ss",
        'š' | 'ś' => "s",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' => "u",
        'ý' | 'ÿ' => "y",
        'ž' | 'ź' | 'ż' => "z",
        'ł' => "l",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moon_landing() -> PathFields {
        PathFields {
            year: 1969,
            month: 7,
            day: 20,
            time: "2056".into(),
            country: "united-states".into(),
            region: "florida".into(),
            city: "cape-canaveral".into(),
            slug: "apollo-11-moon-landing".into(),
        }
    }

    #[test]
    fn test_encode() {
        let path = encode(&moon_landing()).unwrap();
        assert_eq!(
            path,
            "/1969/july/20/2056/united-states/florida/cape-canaveral/apollo-11-moon-landing"
        );
    }

    #[test]
    fn test_encode_negative_year() {
        let fields = PathFields {
            year: -44,
            month: 3,
            day: 15,
            time: "1030".into(),
            country: "italy".into(),
            region: "lazio".into(),
            city: "rome".into(),
            slug: "assassination-of-julius-caesar".into(),
        };
        let path = encode(&fields).unwrap();
        assert_eq!(
            path,
            "/-44/march/15/1030/italy/lazio/rome/assassination-of-julius-caesar"
        );
        assert_eq!(decode(&path).unwrap(), fields);
    }

    #[test]
    fn test_round_trip() {
        let fields = moon_landing();
        assert_eq!(decode(&encode(&fields).unwrap()).unwrap(), fields);

        let midnight = PathFields {
            year: 0,
            month: 12,
            day: 31,
            time: "0000".into(),
            slug: "y0".into(),
            ..moon_landing()
        };
        assert_eq!(decode(&encode(&midnight).unwrap()).unwrap(), midnight);
    }

    #[test]
    fn test_round_trip_across_segment_extremes() {
        let years = [i32::MIN, -1, 0, 1, i32::MAX];
        let times = ["0000", "2359"];
        let places = [("a", "b", "c", "d"), ("united-states", "x", "y-2", "z9")];

        let mut checked = 0;
        for year in years {
            for month in 1..=12u8 {
                for day in [1u8, 31] {
                    for time in times {
                        for (country, region, city, slug) in places {
                            let fields = PathFields {
                                year,
                                month,
                                day,
                                time: time.into(),
                                country: country.into(),
                                region: region.into(),
                                city: city.into(),
                                slug: slug.into(),
                            };
                            let path = encode(&fields).unwrap();
                            assert_eq!(decode(&path).unwrap(), fields, "{}", path);
                            checked += 1;
                        }
                    }
                }
            }
        }
        assert_eq!(checked, 5 * 12 * 2 * 2 * 2);
    }

    #[test]
    fn test_partial_prefix_rebuilds_at_every_depth() {
        let path = encode(&moon_landing()).unwrap();
        let all: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        for depth in 0..=all.len() {
            let prefix = format!("/{}", all[..depth].join("/"));
            let decoded = decode_partial(&prefix).unwrap();
            assert_eq!(decoded.depth(), depth, "{}", prefix);
            assert_eq!(decoded.segments(), all[..depth].to_vec(), "{}", prefix);
        }
    }

    #[test]
    fn test_encode_rejects_separator() {
        let mut fields = moon_landing();
        fields.city = "cape/canaveral".into();
        let err = encode(&fields).unwrap_err();
        assert!(matches!(err, GraphError::InvalidField { field: "city", .. }));
    }

    #[test]
    fn test_encode_rejects_uppercase() {
        let mut fields = moon_landing();
        fields.slug = "Apollo-11".into();
        let err = encode(&fields).unwrap_err();
        assert!(matches!(err, GraphError::InvalidField { field: "slug", .. }));
    }

    #[test]
    fn test_encode_rejects_non_kebab() {
        let mut fields = moon_landing();
        fields.region = "new mexico".into();
        assert!(encode(&fields).is_err());

        fields.region = "-florida".into();
        assert!(encode(&fields).is_err());
    }

    #[test]
    fn test_encode_rejects_bad_time_and_month() {
        let mut fields = moon_landing();
        fields.time = "2460".into();
        assert!(matches!(
            encode(&fields),
            Err(GraphError::InvalidField { field: "time", .. })
        ));

        let mut fields = moon_landing();
        fields.month = 13;
        assert!(matches!(
            encode(&fields),
            Err(GraphError::InvalidField { field: "month", .. })
        ));
    }

    #[test]
    fn test_decode_wrong_segment_count() {
        assert!(matches!(
            decode("/not/enough/segments"),
            Err(GraphError::MalformedPath { .. })
        ));
        assert!(decode("").is_err());
        assert!(decode("/1969/july/20/2056/us/fl/cc/slug/extra").is_err());
    }

    #[test]
    fn test_decode_bad_month() {
        assert!(decode("/1969/badmonth/20/2056/us/fl/cc/slug").is_err());
    }

    #[test]
    fn test_decode_month_case_insensitive() {
        let fields = decode("/1969/July/20/2056/us/fl/cc/slug").unwrap();
        assert_eq!(fields.month, 7);
    }

    #[test]
    fn test_decode_signed_year() {
        assert_eq!(decode("/+1969/july/20/2056/us/fl/cc/s").unwrap().year, 1969);
        assert!(decode("/19a9/july/20/2056/us/fl/cc/s").is_err());
    }

    #[test]
    fn test_decode_bad_time() {
        assert!(decode("/1969/july/20/956/us/fl/cc/s").is_err());
        assert!(decode("/1969/july/20/2400/us/fl/cc/s").is_err());
    }

    #[test]
    fn test_decode_partial_empty() {
        assert_eq!(decode_partial("").unwrap(), PathPrefix::default());
        assert_eq!(decode_partial("/").unwrap().depth(), 0);
    }

    #[test]
    fn test_decode_partial_year_month() {
        let prefix = decode_partial("1969/july").unwrap();
        assert_eq!(prefix.year, Some(1969));
        assert_eq!(prefix.month, Some(7));
        assert_eq!(prefix.day, None);
        assert_eq!(prefix.segments(), vec!["1969", "july"]);
    }

    #[test]
    fn test_decode_partial_negative_year() {
        let prefix = decode_partial("-44/March/15").unwrap();
        assert_eq!(prefix.year, Some(-44));
        assert_eq!(prefix.month, Some(3));
        assert_eq!(prefix.day, Some(15));
        assert_eq!(prefix.segments(), vec!["-44", "march", "15"]);
    }

    #[test]
    fn test_decode_partial_rejects_bad_segment() {
        assert!(decode_partial("1969/smarch").is_err());
        assert!(decode_partial("a/b/c/d/e/f/g/h/i").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(
            slugify("Assassination of Julius Caesar"),
            "assassination-of-julius-caesar"
        );
        assert_eq!(slugify("Apollo 11 Moon Landing!"), "apollo-11-moon-landing");
        assert_eq!(slugify("  São Paulo -- Brazil "), "sao-paulo-brazil");
        assert_eq!(slugify("Don't Panic"), "dont-panic");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_month_lookup() {
        assert_eq!(month_name(1), Some("january"));
        assert_eq!(month_name(0), None);
        assert_eq!(month_number("DECEMBER"), Some(12));
        assert_eq!(month_number("smarch"), None);
    }
}
