//! Date and time values

use std::fmt::Write;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rand::{Rng, RngCore};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::schema::builtins::decimal_to_i128;
use crate::schema::facets::{parse_duration, strip_timezone};
use crate::schema::{BuiltinType, Facets};

/// 2000-01-01T00:00:00Z
const EPOCH_2000: i64 = 946_684_800;
/// Roughly thirty years, the sampling window of unbounded sides
const WINDOW_SECONDS: i64 = 30 * 365 * 86_400;
const SECONDS_PER_DAY: i64 = 86_400;
/// Thirty days, the sampling window of unbounded durations
const DURATION_WINDOW: i64 = 30 * SECONDS_PER_DAY;

/// A value of a date/time built-in inside its range facets
pub(crate) fn value(builtin: BuiltinType, facets: &Facets, rng: &mut dyn RngCore) -> Result<String> {
    match builtin {
        BuiltinType::Date => {
            let (lo, hi) = range(facets, SECONDS_PER_DAY, |v| {
                NaiveDate::parse_from_str(v, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc().timestamp())
            })?;
            let days = rng.random_range(lo.div_euclid(SECONDS_PER_DAY)..=hi.div_euclid(SECONDS_PER_DAY));
            Ok(timestamp(days * SECONDS_PER_DAY)?.format("%Y-%m-%d").to_string())
        }
        BuiltinType::DateTime => {
            let (lo, hi) = range(facets, 1, |v| {
                NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| dt.and_utc().timestamp())
            })?;
            let seconds = rng.random_range(lo..=hi);
            Ok(timestamp(seconds)?.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
        BuiltinType::Time => {
            let (lo, hi) = bounded(
                facets,
                1,
                |v| {
                    NaiveTime::parse_from_str(v, "%H:%M:%S%.f")
                        .ok()
                        .map(|t| i64::from(t.num_seconds_from_midnight()))
                },
                (0, SECONDS_PER_DAY - 1),
            )?;
            let seconds = rng.random_range(lo..=hi);
            Ok(format!(
                "{:02}:{:02}:{:02}",
                seconds / 3600,
                seconds / 60 % 60,
                seconds % 60
            ))
        }
        BuiltinType::GYear => {
            let (lo, hi) = bounded(facets, 1, |v| v.parse::<i64>().ok(), (1970, 2030))?;
            Ok(year(rng.random_range(lo..=hi)))
        }
        BuiltinType::GYearMonth => {
            let (lo, hi) = bounded(facets, 1, month_index, (2000 * 12, 2030 * 12 + 11))?;
            let index = rng.random_range(lo..=hi);
            Ok(format!("{}-{:02}", year(index.div_euclid(12)), index.rem_euclid(12) + 1))
        }
        BuiltinType::GMonth => {
            let (lo, hi) = bounded(facets, 1, |v| v.strip_prefix("--")?.parse().ok(), (1, 12))?;
            Ok(format!("--{:02}", rng.random_range(lo..=hi)))
        }
        BuiltinType::GDay => {
            let (lo, hi) = bounded(facets, 1, |v| v.strip_prefix("---")?.parse().ok(), (1, 31))?;
            Ok(format!("---{:02}", rng.random_range(lo..=hi)))
        }
        BuiltinType::GMonthDay => {
            // Ordinal days of a leap year, so that --02-29 is reachable
            let (lo, hi) = bounded(facets, 1, month_day_ordinal, (1, 366))?;
            let ordinal = rng.random_range(lo..=hi);
            let date = u32::try_from(ordinal)
                .ok()
                .and_then(|o| NaiveDate::from_yo_opt(2000, o))
                .ok_or_else(|| Error::generation(format!("no month-day with ordinal {}", ordinal)))?;
            Ok(date.format("--%m-%d").to_string())
        }
        other => Err(Error::generation(format!("{} is not a date/time type", other))),
    }
}

/// A duration inside the range facets
///
/// Months and seconds are sampled separately within the bounds, so the
/// result is ordered against each bound on both parts.
pub(crate) fn duration(facets: &Facets, rng: &mut dyn RngCore) -> Result<String> {
    let parse = |bound: &Option<String>| bound.as_deref().and_then(parse_duration);
    let lower = [
        parse(&facets.min_inclusive).and_then(|(m, s)| Some((m, whole(s.ceil())?))),
        parse(&facets.min_exclusive).and_then(|(m, s)| Some((m, whole(s.floor())? + 1))),
    ]
    .into_iter()
    .flatten()
    .reduce(|a, b| (a.0.max(b.0), a.1.max(b.1)));
    let upper = [
        parse(&facets.max_inclusive).and_then(|(m, s)| Some((m, whole(s.floor())?))),
        parse(&facets.max_exclusive).and_then(|(m, s)| Some((m, whole(s.ceil())? - 1))),
    ]
    .into_iter()
    .flatten()
    .reduce(|a, b| (a.0.min(b.0), a.1.min(b.1)));

    let (lo, hi) = match (lower, upper) {
        (None, None) => ((0, 0), (0, DURATION_WINDOW)),
        (Some(lo), None) => (lo, (lo.0, lo.1.saturating_add(DURATION_WINDOW))),
        (None, Some(hi)) => (
            (hi.0.min(0), hi.1.min(0).saturating_sub(DURATION_WINDOW)),
            hi,
        ),
        (Some(lo), Some(hi)) => (lo, hi),
    };
    // Both parts of a duration share one sign
    let (lo, hi) = if hi.0 >= 0 && hi.1 >= 0 {
        ((lo.0.max(0), lo.1.max(0)), hi)
    } else {
        (lo, (hi.0.min(0), hi.1.min(0)))
    };
    if lo.0 > hi.0 || lo.1 > hi.1 {
        return Err(Error::generation("range facets admit no duration"));
    }
    let months = rng.random_range(lo.0..=hi.0);
    let seconds = rng.random_range(lo.1..=hi.1);
    Ok(format_duration(months, seconds))
}

fn format_duration(months: i64, seconds: i64) -> String {
    let mut out = String::new();
    if months < 0 || seconds < 0 {
        out.push('-');
    }
    out.push('P');
    let (months, seconds) = (months.unsigned_abs(), seconds.unsigned_abs());
    let days = seconds / 86_400;
    let time = seconds % 86_400;
    // Writing to a String cannot fail
    let _ = match (months / 12, months % 12) {
        (0, 0) => Ok(()),
        (0, m) => write!(out, "{}M", m),
        (y, 0) => write!(out, "{}Y", y),
        (y, m) => write!(out, "{}Y{}M", y, m),
    };
    if days > 0 {
        let _ = write!(out, "{}D", days);
    }
    if time > 0 || out.ends_with('P') {
        out.push('T');
        for (amount, unit) in [(time / 3600, 'H'), (time / 60 % 60, 'M')] {
            if amount > 0 {
                let _ = write!(out, "{}{}", amount, unit);
            }
        }
        if time % 60 > 0 || out.ends_with('T') {
            let _ = write!(out, "{}S", time % 60);
        }
    }
    out
}

fn whole(value: Decimal) -> Option<i64> {
    decimal_to_i128(value).and_then(|v| i64::try_from(v).ok())
}

/// Months since year zero of a `gYearMonth`
fn month_index(value: &str) -> Option<i64> {
    let (year, month) = value.rsplit_once('-')?;
    let month: i64 = month.parse().ok()?;
    Some(year.parse::<i64>().ok()? * 12 + month - 1)
}

/// Day of a leap year of a `gMonthDay`
fn month_day_ordinal(value: &str) -> Option<i64> {
    let (month, day) = value.strip_prefix("--")?.split_once('-')?;
    NaiveDate::from_ymd_opt(2000, month.parse().ok()?, day.parse().ok()?)
        .map(|date| i64::from(date.ordinal()))
}

fn year(year: i64) -> String {
    if year < 0 {
        format!("-{:04}", -year)
    } else {
        format!("{:04}", year)
    }
}

fn timestamp(seconds: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| Error::generation(format!("timestamp {} is out of range", seconds)))
}

/// Inclusive bounds from the range facets, in the units of `parse`
///
/// `step` is the smallest representable increment, used to turn exclusive
/// bounds into inclusive ones.
fn facet_bounds(
    facets: &Facets,
    step: i64,
    parse: impl Fn(&str) -> Option<i64>,
) -> (Option<i64>, Option<i64>) {
    let parse = |bound: &Option<String>| bound.as_deref().map(strip_timezone).and_then(&parse);
    let lo = match (parse(&facets.min_inclusive), parse(&facets.min_exclusive)) {
        (Some(a), Some(b)) => Some(a.max(b + step)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b + step),
        (None, None) => None,
    };
    let hi = match (parse(&facets.max_inclusive), parse(&facets.max_exclusive)) {
        (Some(a), Some(b)) => Some(a.min(b - step)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b - step),
        (None, None) => None,
    };
    (lo, hi)
}

/// Facet bounds clipped to `natural`, the range of the value space
fn bounded(
    facets: &Facets,
    step: i64,
    parse: impl Fn(&str) -> Option<i64>,
    natural: (i64, i64),
) -> Result<(i64, i64)> {
    let (lo, hi) = facet_bounds(facets, step, parse);
    let (lo, hi) = match (lo, hi) {
        (None, None) => natural,
        (Some(lo), None) => (lo, lo.max(natural.1)),
        (None, Some(hi)) => (hi.min(natural.0), hi),
        (Some(lo), Some(hi)) => (lo, hi),
    };
    if lo > hi {
        return Err(Error::generation("range facets admit no date or time"));
    }
    Ok((lo, hi))
}

/// Timestamp bounds, defaulting to a window from 2000
fn range(
    facets: &Facets,
    step: i64,
    parse: impl Fn(&str) -> Option<i64>,
) -> Result<(i64, i64)> {
    let (lo, hi) = facet_bounds(facets, step, parse);
    let (lo, hi) = match (lo, hi) {
        (None, None) => (EPOCH_2000, EPOCH_2000 + WINDOW_SECONDS),
        (Some(lo), None) => (lo, lo.saturating_add(WINDOW_SECONDS)),
        (None, Some(hi)) => (hi.saturating_sub(WINDOW_SECONDS), hi),
        (Some(lo), Some(hi)) => (lo, hi),
    };
    if lo > hi {
        return Err(Error::generation("range facets admit no date or time"));
    }
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SimpleValueType, Variety};
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn assert_valid(builtin: BuiltinType, facets: &Facets, value: &str) {
        let value_type = SimpleValueType {
            name: None,
            variety: Variety::Atomic(builtin),
            facets: facets.clone(),
        };
        assert!(value_type.check(value).is_ok(), "{} rejected '{}'", builtin, value);
    }

    #[test]
    fn test_date_bounds() {
        let facets = Facets {
            min_inclusive: Some("2024-02-27".into()),
            max_exclusive: Some("2024-03-02".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(21);
        for _ in 0..50 {
            let date = value(BuiltinType::Date, &facets, &mut rng).unwrap();
            assert_valid(BuiltinType::Date, &facets, &date);
        }
    }

    #[test]
    fn test_datetime_with_timezone_bound() {
        let facets = Facets {
            min_inclusive: Some("2030-01-01T00:00:00Z".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(22);
        for _ in 0..50 {
            let dt = value(BuiltinType::DateTime, &facets, &mut rng).unwrap();
            assert!(dt.as_str() >= "2030-01-01T00:00:00");
        }
    }

    #[test]
    fn test_time_exclusive() {
        let facets = Facets {
            min_exclusive: Some("23:59:58".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(23);
        assert_eq!(value(BuiltinType::Time, &facets, &mut rng).unwrap(), "23:59:59");
    }

    #[test]
    fn test_fragments_are_lexically_valid() {
        let mut rng = XorShiftRng::seed_from_u64(24);
        for builtin in [
            BuiltinType::GYear,
            BuiltinType::GYearMonth,
            BuiltinType::GMonth,
            BuiltinType::GDay,
            BuiltinType::GMonthDay,
        ] {
            for _ in 0..20 {
                let v = value(builtin, &Facets::default(), &mut rng).unwrap();
                assert!(builtin.is_valid_lexical(&v), "{builtin}: {v}");
            }
        }
        let d = duration(&Facets::default(), &mut rng).unwrap();
        assert!(BuiltinType::Duration.is_valid_lexical(&d), "{d}");
    }

    #[test]
    fn test_fragment_bounds() {
        let mut rng = XorShiftRng::seed_from_u64(25);
        let cases = [
            (BuiltinType::GYearMonth, Some("2099-01"), None, None),
            (BuiltinType::GYearMonth, None, None, Some("1999-03")),
            (BuiltinType::GMonth, None, Some("--10"), None),
            (BuiltinType::GDay, Some("---29"), None, None),
            (BuiltinType::GMonthDay, None, Some("--02-28"), Some("--03-02")),
        ];
        for (builtin, min_inclusive, min_exclusive, max_exclusive) in cases {
            let facets = Facets {
                min_inclusive: min_inclusive.map(Into::into),
                min_exclusive: min_exclusive.map(Into::into),
                max_exclusive: max_exclusive.map(Into::into),
                ..Facets::default()
            };
            for _ in 0..30 {
                let v = value(builtin, &facets, &mut rng).unwrap();
                assert_valid(builtin, &facets, &v);
            }
        }
    }

    #[test]
    fn test_month_day_ordinal_range() {
        let facets = Facets {
            min_exclusive: Some("--02-28".into()),
            max_exclusive: Some("--03-01".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(26);
        assert_eq!(value(BuiltinType::GMonthDay, &facets, &mut rng).unwrap(), "--02-29");
    }

    #[test]
    fn test_duration_bounds() {
        let mut rng = XorShiftRng::seed_from_u64(27);
        let cases = [
            (Some("PT1H"), None, None, Some("PT2H")),
            (None, Some("P1Y"), None, None),
            (None, None, Some("-P1D"), None),
            (Some("-P2D"), None, None, Some("-PT1.5S")),
        ];
        for (min_inclusive, min_exclusive, max_inclusive, max_exclusive) in cases {
            let facets = Facets {
                min_inclusive: min_inclusive.map(Into::into),
                min_exclusive: min_exclusive.map(Into::into),
                max_inclusive: max_inclusive.map(Into::into),
                max_exclusive: max_exclusive.map(Into::into),
                ..Facets::default()
            };
            for _ in 0..30 {
                let d = duration(&facets, &mut rng).unwrap();
                assert_valid(BuiltinType::Duration, &facets, &d);
            }
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0, 0), "PT0S");
        assert_eq!(format_duration(14, 90_061), "P1Y2M1DT1H1M1S");
        assert_eq!(format_duration(0, -3_600), "-PT1H");
        assert_eq!(format_duration(12, 0), "P1Y");
    }
}
