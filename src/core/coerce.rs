//! PL-004: Typed value coercion.
//!
//! Each coercion returns `Option<Value>`: `None` means the field is omitted
//! from the record. BOOLEAN is total: anything unrecognised becomes "false".
//! DATE_TIME and NUMBER never emit a guessed value.

use super::types::FieldType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use serde_json::{Number, Value};
use std::sync::LazyLock;

/// Date/time layouts carrying an explicit UTC offset.
const OFFSET_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Date/time layouts interpreted in the run's timezone.
const LOCAL_FORMATS: [&str; 10] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d %b %Y %H:%M:%S",
    "%b %d %Y %H:%M:%S",
];

/// Calendar-date layouts (midnight in the run's timezone).
const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d %b %Y",
    "%b %d %Y",
    "%B %d, %Y",
];

const DIGITS: &str = r"[0-9](?:_?[0-9])*";

static INT_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([+-]?)(?:0[xX]((?:_?[0-9a-fA-F])+)|0[oO]((?:_?[0-7])+)|0[bB]((?:_?[01])+)|(0(?:_?0)*|[1-9](?:_?[0-9])*))$",
    )
    .expect("integer literal pattern")
});

static FLOAT_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    let point = format!(r"(?:(?:{d})?\.{d}|{d}\.)", d = DIGITS);
    let pattern = format!(
        r"^[+-]?(?:(?:{p}|{d})[eE][+-]?{d}|{p})$",
        p = point,
        d = DIGITS
    );
    Regex::new(&pattern).expect("float literal pattern")
});

/// Coerce a raw value to `ty`. `None` = omit the field.
pub fn coerce(raw: &str, ty: FieldType, tz: Tz) -> Option<Value> {
    match ty {
        FieldType::String => Some(Value::String(raw.to_string())),
        FieldType::DateTime => coerce_date_time(raw, tz).map(Value::from),
        FieldType::Number => parse_number(raw).map(Value::Number),
        FieldType::Boolean => Some(Value::String(
            parse_bool(raw).unwrap_or(false).to_string(),
        )),
    }
}

/// Whether `raw` would coerce cleanly. Empty values always pass.
pub fn is_coercible(raw: &str, ty: FieldType, tz: Tz) -> bool {
    if raw.is_empty() {
        return true;
    }
    match ty {
        FieldType::String => true,
        FieldType::DateTime => coerce_date_time(raw, tz).is_some(),
        FieldType::Number => parse_number(raw).is_some(),
        FieldType::Boolean => parse_bool(raw).is_some(),
    }
}

/// Epoch milliseconds for a calendar literal, falling back to a bare
/// integer already in epoch milliseconds.
pub fn coerce_date_time(raw: &str, tz: Tz) -> Option<i64> {
    parse_date_time(raw, tz).or_else(|| raw.trim().parse::<i64>().ok())
}

/// Parse a calendar date/time literal to epoch milliseconds (UTC).
/// Values without an offset are localized to `tz`.
pub fn parse_date_time(raw: &str, tz: Tz) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    let zulu = match s.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{}+00:00", rest),
        None => s.to_string(),
    };
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&zulu, fmt) {
            return Some(dt.timestamp_millis());
        }
    }

    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    // Ambiguous wall-clock times (DST fall-back) take the earlier instant;
    // times skipped by DST do not exist and fail.
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// Parse a numeric literal (integer in any radix, or float). Infinite
/// results are rejected because the platform cannot store them.
pub fn parse_number(raw: &str) -> Option<Number> {
    let s = raw.trim();

    if let Some(caps) = INT_LITERAL.captures(s) {
        let negative = caps.get(1).is_some_and(|m| m.as_str() == "-");
        let (digits, radix) = if let Some(m) = caps.get(2) {
            (m.as_str(), 16)
        } else if let Some(m) = caps.get(3) {
            (m.as_str(), 8)
        } else if let Some(m) = caps.get(4) {
            (m.as_str(), 2)
        } else {
            (caps.get(5)?.as_str(), 10)
        };
        let digits = digits.replace('_', "");
        return match i128::from_str_radix(&digits, radix) {
            Ok(v) => {
                let v = if negative { -v } else { v };
                match i64::try_from(v) {
                    Ok(small) => Some(Number::from(small)),
                    Err(_) => Number::from_f64(v as f64),
                }
            }
            Err(_) if radix == 10 => {
                let v: f64 = digits.parse().ok()?;
                Number::from_f64(if negative { -v } else { v })
            }
            Err(_) => None,
        };
    }

    if FLOAT_LITERAL.is_match(s) {
        let v: f64 = s.replace('_', "").parse().ok()?;
        // from_f64 refuses NaN and +/-inf
        return Number::from_f64(v);
    }

    None
}

/// Recognise common boolean spellings, case-insensitively.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Offset, Utc};
    use proptest::prelude::*;

    #[test]
    fn test_pl004_date_utc_scenario() {
        assert_eq!(
            parse_date_time("2011-11-04T00:05:23", chrono_tz::UTC),
            Some(1_320_365_123_000)
        );
    }

    #[test]
    fn test_pl004_date_localized() {
        // 00:05:23 in New York (EDT, UTC-4) on 2011-11-04
        assert_eq!(
            parse_date_time("2011-11-04T00:05:23", chrono_tz::America::New_York),
            Some(1_320_365_123_000 + 4 * 3_600_000)
        );
    }

    #[test]
    fn test_pl004_date_explicit_offset_ignores_tz() {
        let tz = chrono_tz::Asia::Tokyo;
        assert_eq!(
            parse_date_time("2011-11-04T00:05:23Z", tz),
            Some(1_320_365_123_000)
        );
        assert_eq!(
            parse_date_time("2011-11-04T02:05:23+02:00", tz),
            Some(1_320_365_123_000)
        );
        assert_eq!(
            parse_date_time("2011-11-04 02:05:23+0200", tz),
            Some(1_320_365_123_000)
        );
    }

    #[test]
    fn test_pl004_date_formats() {
        let utc = chrono_tz::UTC;
        let midnight = 1_320_364_800_000;
        assert_eq!(parse_date_time("2011-11-04", utc), Some(midnight));
        assert_eq!(parse_date_time("2011/11/04", utc), Some(midnight));
        assert_eq!(parse_date_time("11/04/2011", utc), Some(midnight));
        assert_eq!(parse_date_time("04 Nov 2011", utc), Some(midnight));
        assert_eq!(parse_date_time("November 04, 2011", utc), Some(midnight));
        assert_eq!(
            parse_date_time("2011-11-04 00:05:23.500", utc),
            Some(1_320_365_123_500)
        );
        assert_eq!(parse_date_time("2011-11-04T00:05", utc), Some(1_320_365_100_000));
    }

    #[test]
    fn test_pl004_date_rejects_garbage() {
        let utc = chrono_tz::UTC;
        assert_eq!(parse_date_time("", utc), None);
        assert_eq!(parse_date_time("yesterday", utc), None);
        assert_eq!(parse_date_time("2011-13-45", utc), None);
        assert_eq!(parse_date_time("1320365123000", utc), None);
    }

    #[test]
    fn test_pl004_date_nonexistent_local_time() {
        // 02:30 on 2021-03-14 is skipped by the US spring-forward.
        assert_eq!(
            parse_date_time("2021-03-14 02:30:00", chrono_tz::America::New_York),
            None
        );
    }

    #[test]
    fn test_pl004_date_integer_fallback() {
        let utc = chrono_tz::UTC;
        assert_eq!(coerce_date_time("1320365123000", utc), Some(1_320_365_123_000));
        assert_eq!(coerce_date_time(" -5 ", utc), Some(-5));
        assert_eq!(coerce_date_time("12.5", utc), None);
        assert_eq!(coerce_date_time("soon", utc), None);
    }

    #[test]
    fn test_pl004_number_integers() {
        assert_eq!(parse_number("42"), Some(Number::from(42)));
        assert_eq!(parse_number("-42"), Some(Number::from(-42)));
        assert_eq!(parse_number("+7"), Some(Number::from(7)));
        assert_eq!(parse_number("1_000"), Some(Number::from(1000)));
        assert_eq!(parse_number("0x1F"), Some(Number::from(31)));
        assert_eq!(parse_number("0o17"), Some(Number::from(15)));
        assert_eq!(parse_number("0b101"), Some(Number::from(5)));
        assert_eq!(parse_number(" 0 "), Some(Number::from(0)));
    }

    #[test]
    fn test_pl004_number_floats() {
        assert_eq!(parse_number("3.25"), Number::from_f64(3.25));
        assert_eq!(parse_number("-0.5"), Number::from_f64(-0.5));
        assert_eq!(parse_number(".5"), Number::from_f64(0.5));
        assert_eq!(parse_number("5."), Number::from_f64(5.0));
        assert_eq!(parse_number("1e3"), Number::from_f64(1000.0));
        assert_eq!(parse_number("2.5E-1"), Number::from_f64(0.25));
    }

    #[test]
    fn test_pl004_number_big_integer_becomes_float() {
        let n = parse_number("123456789012345678901234567890").unwrap();
        assert!(n.is_f64());
    }

    #[test]
    fn test_pl004_number_rejects() {
        for bad in ["", "abc", "1,000", "007", "inf", "-inf", "nan", "1e999", "-1e999", "1__0", "0x"] {
            assert_eq!(parse_number(bad), None, "{:?}", bad);
        }
    }

    #[test]
    fn test_pl004_bool_spellings() {
        for t in ["true", "TRUE", "True", "yes", "Y", "on", "1", "t"] {
            assert_eq!(parse_bool(t), Some(true), "{}", t);
        }
        for f in ["false", "FALSE", "no", "N", "off", "0", "f"] {
            assert_eq!(parse_bool(f), Some(false), "{}", f);
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_pl004_coerce_boolean_never_absent() {
        let utc = chrono_tz::UTC;
        assert_eq!(coerce("yes", FieldType::Boolean, utc), Some(Value::from("true")));
        assert_eq!(coerce("no", FieldType::Boolean, utc), Some(Value::from("false")));
        assert_eq!(coerce("perhaps", FieldType::Boolean, utc), Some(Value::from("false")));
    }

    #[test]
    fn test_pl004_coerce_dispatch() {
        let utc = chrono_tz::UTC;
        assert_eq!(coerce("Prez", FieldType::String, utc), Some(Value::from("Prez")));
        assert_eq!(
            coerce("2011-11-04T00:05:23", FieldType::DateTime, utc),
            Some(Value::from(1_320_365_123_000i64))
        );
        assert_eq!(coerce("12", FieldType::Number, utc), Some(Value::from(12)));
        assert_eq!(coerce("twelve", FieldType::Number, utc), None);
        assert_eq!(coerce("someday", FieldType::DateTime, utc), None);
    }

    #[test]
    fn test_pl004_is_coercible() {
        let utc = chrono_tz::UTC;
        assert!(is_coercible("", FieldType::Number, utc));
        assert!(is_coercible("", FieldType::Boolean, utc));
        assert!(is_coercible("anything", FieldType::String, utc));
        assert!(is_coercible("2020-01-01", FieldType::DateTime, utc));
        assert!(!is_coercible("2020-01-99", FieldType::DateTime, utc));
        assert!(!is_coercible("x", FieldType::Number, utc));
        assert!(!is_coercible("maybe", FieldType::Boolean, utc));
    }

    proptest! {
        #[test]
        fn prop_pl004_boolean_total(raw in ".*") {
            let v = coerce(&raw, FieldType::Boolean, chrono_tz::UTC);
            prop_assert!(v == Some(Value::from("true")) || v == Some(Value::from("false")));
        }

        #[test]
        fn prop_pl004_integer_passthrough(ms in any::<i64>()) {
            prop_assert_eq!(coerce_date_time(&ms.to_string(), chrono_tz::UTC), Some(ms));
        }

        #[test]
        fn prop_pl004_number_never_infinite(raw in "[-+]?[0-9]{0,4}(\\.[0-9]{0,3})?([eE][-+]?[0-9]{1,4})?|[-+]?inf|nan") {
            if let Some(n) = parse_number(&raw) {
                let f = n.as_f64().unwrap();
                prop_assert!(f.is_finite());
            }
        }

        #[test]
        fn prop_pl004_date_matches_offset_arithmetic(
            secs in 0i64..4_000_000_000,
            offset_min in -720i32..=840,
        ) {
            let utc = DateTime::<Utc>::from_timestamp(secs, 0).unwrap();
            let local = utc.naive_utc() + chrono::Duration::minutes(offset_min as i64);
            let sign = if offset_min < 0 { '-' } else { '+' };
            let abs = offset_min.abs();
            let literal = format!(
                "{}{}{:02}:{:02}",
                local.format("%Y-%m-%dT%H:%M:%S"),
                sign,
                abs / 60,
                abs % 60
            );
            prop_assert_eq!(parse_date_time(&literal, chrono_tz::UTC), Some(secs * 1000));
        }

        #[test]
        fn prop_pl004_date_named_zone_matches_utc_offset(
            zone in prop::sample::select(vec![
                chrono_tz::America::New_York,
                chrono_tz::Europe::Berlin,
                chrono_tz::Asia::Kolkata,
                chrono_tz::Australia::Sydney,
            ]),
            year in 1990i32..2035,
            // mid-January and mid-July sit well clear of DST transitions
            month in prop::sample::select(vec![1u32, 7]),
            day in 5u32..25,
            secs_of_day in 0u32..86_400,
        ) {
            let utc = NaiveDate::from_ymd_opt(year, month, day)
                .unwrap()
                .and_hms_opt(secs_of_day / 3600, secs_of_day / 60 % 60, secs_of_day % 60)
                .unwrap();
            let offset = zone.offset_from_utc_datetime(&utc).fix().local_minus_utc();
            let local = utc + chrono::Duration::seconds(offset as i64);
            let literal = local.format("%Y-%m-%d %H:%M:%S").to_string();
            prop_assert_eq!(
                parse_date_time(&literal, zone),
                Some(utc.and_utc().timestamp_millis())
            );
        }

        #[test]
        fn prop_pl004_date_utc_naive(days in 0i64..40_000, secs_of_day in 0i64..86_400) {
            let base = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
            let naive = base + chrono::Duration::seconds(days * 86_400 + secs_of_day);
            let literal = naive.format("%Y-%m-%d %H:%M:%S").to_string();
            prop_assert_eq!(
                parse_date_time(&literal, chrono_tz::UTC),
                Some((days * 86_400 + secs_of_day) * 1000)
            );
        }
    }
}
