// Utility helpers for parsing and basic statistics.
//
// This module centralizes all the "dirty" CSV/number/date handling so the
// rest of the code can assume clean, typed values.
use chrono::{NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d", "%m/%d/%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in spreadsheet exports.
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters (`NaN`, `n/a`, ...).
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    let v = parse_f64_safe(s)?;
    // Spreadsheet exports frequently write integer columns as `2024.0`.
    if v.fract() != 0.0 || v < i32::MIN as f64 || v > i32::MAX as f64 {
        return None;
    }
    Some(v as i32)
}

pub fn parse_u32_safe(s: Option<&str>) -> Option<u32> {
    parse_i32_safe(s).and_then(|v| u32::try_from(v).ok())
}

/// Tolerant date parsing: tries plain dates first, then date-times (the time
/// part is discarded). Anything else is `None`, never an error.
pub fn parse_date_tolerant(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Canonical form of a header cell used for alias matching: whitespace and
/// byte-order marks removed, lowercased, superscript three folded to `3`.
pub fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{feff}')
        .map(|c| if c == '³' { '3' } else { c })
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn average(v: &[f64]) -> f64 {
    // Standard arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimal places plus locale-aware thousands separators
    // (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    // Past u128 range, print the digits without separators.
    let mut res = match int_part.parse::<u128>() {
        Ok(v) => v.to_formatted_string(&Locale::en),
        Err(_) => int_part.to_string(),
    };
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

/// `format_number` for values that may be absent; absent renders as `-`.
pub fn format_optional(n: Option<f64>, decimals: usize) -> String {
    n.map(|v| format_number(v, decimals))
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Used for counts in console messages (e.g., `1,204 rows loaded`).
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_with_separators() {
        assert_eq!(parse_f64_safe(Some(" 1,234.5 ")), Some(1234.5));
        assert_eq!(parse_f64_safe(Some("")), None);
        assert_eq!(parse_f64_safe(Some("NaN")), None);
        assert_eq!(parse_f64_safe(None), None);
    }

    #[test]
    fn integer_columns_accept_float_exports() {
        assert_eq!(parse_i32_safe(Some("2024.0")), Some(2024));
        assert_eq!(parse_i32_safe(Some("3.5")), None);
        assert_eq!(parse_u32_safe(Some("-1")), None);
        assert_eq!(parse_u32_safe(Some("12")), Some(12));
    }

    #[test]
    fn tolerant_dates() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(parse_date_tolerant(Some("2024-01-05")), Some(d));
        assert_eq!(parse_date_tolerant(Some("2024/01/05")), Some(d));
        assert_eq!(parse_date_tolerant(Some("2024.01.05")), Some(d));
        assert_eq!(parse_date_tolerant(Some("20240105")), Some(d));
        assert_eq!(parse_date_tolerant(Some("2024-01-05 00:00:00")), Some(d));
        assert_eq!(parse_date_tolerant(Some("not a date")), None);
        assert_eq!(parse_date_tolerant(Some("2024-02-30")), None);
    }

    #[test]
    fn header_normalization() {
        assert_eq!(normalize_header(" Plan (m³) "), "plan(m3)");
        assert_eq!(normalize_header("계획 (m3)"), "계획(m3)");
        assert_eq!(normalize_header("DAY"), "day");
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-5.0, 1), "-5.0");
        assert_eq!(format_optional(None, 2), "-");
        assert_eq!(format_number(1e19, 2), "10,000,000,000,000,000,000.00");
        let huge = format_number(-1e40, 0);
        assert!(huge.starts_with("-10000000000000000"));
        assert!(!huge.contains(','));
        assert_eq!(format_int(9855usize), "9,855");
    }
}
