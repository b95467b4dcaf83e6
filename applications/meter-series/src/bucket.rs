//! Resolution dividers and location-aware time bucketing.
//!
//! A [`Divider`] maps an instant to the start of the interval containing it.
//! Day and month intervals follow the local calendar of the configured
//! location, so a "1-days" bucket is 23 or 25 hours wide in UTC across a DST
//! transition.

use crate::error::{AppError, Result};
use crate::reading::ensure_utc;
use chrono::offset::LocalResult;
use chrono::{
    DateTime, Datelike, Months, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc,
};
use chrono_tz::Tz;
use std::str::FromStr;

/// Interval length parsed from `"<n>-minutes"`, `"1-days"` or `"1-months"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Length in half minutes, so "2.5-minutes" is 5.
    Minutes { half_minutes: u32 },
    Days,
    Months,
}

impl Resolution {
    fn step_seconds(half_minutes: u32) -> i64 {
        i64::from(half_minutes) * 30
    }
}

impl FromStr for Resolution {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let (numeral, unit) = s
            .split_once('-')
            .ok_or_else(|| AppError::Format(format!("invalid interval: {}", s)))?;

        let parse_numeral = || {
            numeral
                .parse::<f64>()
                .map_err(|_| AppError::Range(format!("invalid interval numeral: {}", s)))
        };

        match unit {
            "minutes" => {
                let minutes = parse_numeral()?;
                if !(minutes > 0.0 && minutes <= 60.0) {
                    return Err(AppError::Range(format!(
                        "minutes must be in (0, 60]: {}",
                        s
                    )));
                }
                let halves = minutes * 2.0;
                if halves.fract() != 0.0 {
                    return Err(AppError::Range(format!(
                        "minutes must be a multiple of 0.5: {}",
                        s
                    )));
                }
                Ok(Resolution::Minutes {
                    half_minutes: halves as u32,
                })
            }
            "days" | "months" => {
                if parse_numeral()? != 1.0 {
                    return Err(AppError::Range(format!(
                        "only a multiplier of 1 is supported for {}: {}",
                        unit, s
                    )));
                }
                Ok(if unit == "days" {
                    Resolution::Days
                } else {
                    Resolution::Months
                })
            }
            _ => Err(AppError::Format(format!("unknown interval unit: {}", s))),
        }
    }
}

/// Calendar period used for period totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Month,
    Year,
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "day" => Ok(Period::Day),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            _ => Err(AppError::Format(format!(
                "unknown period: {}. Supported: day, month, year",
                s
            ))),
        }
    }
}

/// Maps an instant to the start of its containing interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Divider {
    resolution: Resolution,
    location: Tz,
    origin: DateTime<Utc>,
}

impl Divider {
    /// Divider counting intervals from the Unix epoch in UTC.
    pub fn parse(spec: &str) -> Result<Self> {
        Ok(Self {
            resolution: spec.parse()?,
            location: Tz::UTC,
            origin: DateTime::<Utc>::UNIX_EPOCH,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Start of the interval containing `ts`.
    ///
    /// Intervals are counted on the local wall clock from the local origin.
    /// A boundary that resolves after `ts` (it fell into a DST gap) gives
    /// way to the one before it.
    pub fn divide(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let origin = self.local_origin();
        let local = self.local(ts);

        let mut index = self.intervals_between(origin, local);
        loop {
            let Some(boundary) = self.boundary(origin, index) else {
                return ts;
            };
            let resolved = self.resolve(boundary);
            if resolved <= ts {
                return resolved;
            }
            index -= 1;
        }
    }

    /// `ts` advanced by exactly one local interval.
    pub fn next(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let local = self.local(ts);
        match self.resolution {
            Resolution::Minutes { half_minutes } => {
                let step = TimeDelta::seconds(Resolution::step_seconds(half_minutes));
                let stepped = self.resolve(local + step);
                // Stepping out of a repeated hour can resolve backwards.
                if stepped > ts {
                    stepped
                } else {
                    ts + step
                }
            }
            Resolution::Days => self.resolve(local + TimeDelta::days(1)),
            Resolution::Months => self.resolve(shift_months(local, 1).unwrap_or(local)),
        }
    }

    /// Whole intervals from `origin` to the last boundary not after `local`.
    fn intervals_between(&self, origin: NaiveDateTime, local: NaiveDateTime) -> i64 {
        let index = match self.resolution {
            Resolution::Minutes { half_minutes } => (local - origin)
                .num_seconds()
                .div_euclid(Resolution::step_seconds(half_minutes)),
            Resolution::Days => (local.date() - origin.date()).num_days(),
            Resolution::Months => month_index(&local) - month_index(&origin),
        };
        match self.boundary(origin, index) {
            Some(boundary) if boundary > local => index - 1,
            _ => index,
        }
    }

    /// Local wall-clock time of boundary number `index`.
    fn boundary(&self, origin: NaiveDateTime, index: i64) -> Option<NaiveDateTime> {
        match self.resolution {
            Resolution::Minutes { half_minutes } => origin.checked_add_signed(
                TimeDelta::try_seconds(index.checked_mul(Resolution::step_seconds(half_minutes))?)?,
            ),
            Resolution::Days => origin.checked_add_signed(TimeDelta::try_days(index)?),
            Resolution::Months => shift_months(origin, index),
        }
    }

    /// The divider as a plain function.
    pub fn as_fn(&self) -> impl Fn(DateTime<Utc>) -> DateTime<Utc> + '_ {
        move |ts| self.divide(ts)
    }

    fn local(&self, ts: DateTime<Utc>) -> NaiveDateTime {
        ts.with_timezone(&self.location).naive_local()
    }

    fn local_origin(&self) -> NaiveDateTime {
        self.local(self.origin)
    }

    fn resolve(&self, local: NaiveDateTime) -> DateTime<Utc> {
        resolve_local(&self.location, local)
    }
}

/// Interval arithmetic anchored at a location and an origin instant.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBucketer {
    location: Tz,
    origin: DateTime<Utc>,
}

impl TimeBucketer {
    /// `origin` must carry a zero UTC offset.
    pub fn new<O: TimeZone>(location: Tz, origin: DateTime<O>) -> Result<Self> {
        Ok(Self {
            location,
            origin: ensure_utc(&origin, "bucketing origin")?,
        })
    }

    pub fn location(&self) -> Tz {
        self.location
    }

    pub fn origin(&self) -> DateTime<Utc> {
        self.origin
    }

    pub fn divider(&self, spec: &str) -> Result<Divider> {
        Ok(Divider {
            resolution: spec.parse()?,
            location: self.location,
            origin: self.origin,
        })
    }

    /// Stepping function advancing an instant by one interval of `spec`.
    pub fn next(&self, spec: &str) -> Result<impl Fn(DateTime<Utc>) -> DateTime<Utc>> {
        let divider = self.divider(spec)?;
        Ok(move |ts| divider.next(ts))
    }

    /// End of the local calendar period containing the origin.
    pub fn period_end(&self, period: Period) -> Result<DateTime<Utc>> {
        let local = self.origin.with_timezone(&self.location).date_naive();
        let next = match period {
            Period::Day => local.succ_opt(),
            Period::Month => NaiveDate::from_ymd_opt(local.year(), local.month(), 1)
                .and_then(|first| first.checked_add_months(Months::new(1))),
            Period::Year => NaiveDate::from_ymd_opt(local.year() + 1, 1, 1),
        }
        .ok_or_else(|| AppError::Range(format!("period end out of range for {}", local)))?;

        Ok(resolve_local(&self.location, next.and_time(chrono::NaiveTime::MIN)))
    }
}

fn month_index(local: &NaiveDateTime) -> i64 {
    i64::from(local.year()) * 12 + i64::from(local.month0())
}

fn shift_months(local: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        local.checked_add_months(magnitude)
    } else {
        local.checked_sub_months(magnitude)
    }
}

/// Local wall-clock time to UTC. Ambiguous times resolve to the earlier
/// instant; times inside a DST gap use the offset in effect before the gap.
fn resolve_local(location: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match location.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let before = location
                .offset_from_utc_datetime(&(local - TimeDelta::days(1)))
                .fix()
                .local_minus_utc();
            (local - TimeDelta::seconds(i64::from(before))).and_utc()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Copenhagen;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn copenhagen_bucketer() -> TimeBucketer {
        TimeBucketer::new(Copenhagen, utc("2023-12-31T23:00:00Z")).unwrap()
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!(
            "5-minutes".parse::<Resolution>().unwrap(),
            Resolution::Minutes { half_minutes: 10 }
        );
        assert_eq!(
            "2.5-minutes".parse::<Resolution>().unwrap(),
            Resolution::Minutes { half_minutes: 5 }
        );
        assert_eq!(
            "60-minutes".parse::<Resolution>().unwrap(),
            Resolution::Minutes { half_minutes: 120 }
        );
        assert_eq!("1-days".parse::<Resolution>().unwrap(), Resolution::Days);
        assert_eq!("1-months".parse::<Resolution>().unwrap(), Resolution::Months);
    }

    #[test]
    fn test_parse_resolution_range_errors() {
        for spec in [
            "0-minutes",
            "61-minutes",
            "2.25-minutes",
            "x-minutes",
            "2-days",
            "3-months",
        ] {
            assert!(
                matches!(spec.parse::<Resolution>(), Err(AppError::Range(_))),
                "expected range error for {}",
                spec
            );
        }
    }

    #[test]
    fn test_parse_resolution_format_errors() {
        for spec in ["5minutes", "5-hours", "", "1-weeks"] {
            assert!(
                matches!(spec.parse::<Resolution>(), Err(AppError::Format(_))),
                "expected format error for {}",
                spec
            );
        }
    }

    #[test]
    fn test_plain_minute_dividers() {
        let five = Divider::parse("5-minutes").unwrap();
        assert_eq!(
            five.divide(utc("2024-05-01T10:07:31Z")),
            utc("2024-05-01T10:05:00Z")
        );
        assert_eq!(
            five.divide(utc("2024-05-01T10:05:00Z")),
            utc("2024-05-01T10:05:00Z")
        );

        let half = Divider::parse("2.5-minutes").unwrap();
        assert_eq!(
            half.divide(utc("2024-05-01T10:07:31Z")),
            utc("2024-05-01T10:07:30Z")
        );
        assert_eq!(
            half.divide(utc("2024-05-01T10:06:59Z")),
            utc("2024-05-01T10:05:00Z")
        );
    }

    #[test]
    fn test_plain_calendar_dividers() {
        let day = Divider::parse("1-days").unwrap();
        assert_eq!(
            day.divide(utc("2024-05-01T10:07:31Z")),
            utc("2024-05-01T00:00:00Z")
        );
        let month = Divider::parse("1-months").unwrap();
        assert_eq!(
            month.divide(utc("2024-05-17T10:07:31Z")),
            utc("2024-05-01T00:00:00Z")
        );
        assert_eq!(
            month.next(utc("2024-05-01T00:00:00Z")),
            utc("2024-06-01T00:00:00Z")
        );
    }

    #[test]
    fn test_divide_is_idempotent_and_not_after_input() {
        let bucketer = copenhagen_bucketer();
        let dividers = ["2.5-minutes", "15-minutes", "60-minutes", "1-days", "1-months"]
            .map(|spec| bucketer.divider(spec).unwrap());

        let mut ts = utc("2024-03-30T00:00:00Z");
        let end = utc("2024-04-02T00:00:00Z");
        while ts < end {
            for divider in &dividers {
                let start = divider.divide(ts);
                assert!(start <= ts, "{:?} at {}", divider.resolution(), ts);
                assert_eq!(divider.divide(start), start);
            }
            ts += TimeDelta::minutes(17);
        }
    }

    fn assert_round_trip(bucketer: &TimeBucketer, specs: &[&str], from: &str, to: &str) {
        let dividers: Vec<Divider> = specs.iter().map(|s| bucketer.divider(s).unwrap()).collect();
        let mut ts = utc(from);
        let end = utc(to);
        while ts < end {
            for divider in &dividers {
                let start = divider.divide(ts);
                assert!(start <= ts, "{:?} at {}: {}", divider.resolution(), ts, start);
                assert_eq!(divider.divide(start), start, "{:?} at {}", divider.resolution(), ts);
            }
            ts += TimeDelta::minutes(7);
        }
    }

    #[test]
    fn test_round_trip_across_fall_back() {
        assert_round_trip(
            &copenhagen_bucketer(),
            &["2.5-minutes", "7-minutes", "45-minutes", "60-minutes", "1-days", "1-months"],
            "2024-10-26T18:00:00Z",
            "2024-10-28T06:00:00Z",
        );
    }

    #[test]
    fn test_round_trip_for_steps_not_dividing_an_hour() {
        assert_round_trip(
            &copenhagen_bucketer(),
            &["7-minutes", "45-minutes", "13.5-minutes"],
            "2024-03-30T18:00:00Z",
            "2024-04-01T06:00:00Z",
        );
    }

    #[test]
    fn test_round_trip_with_origin_inside_dst_gap_time_of_day() {
        // 02:30 local, a wall-clock time that does not exist on 2024-03-31.
        let bucketer = TimeBucketer::new(Copenhagen, utc("2024-01-01T01:30:00Z")).unwrap();
        assert_round_trip(
            &bucketer,
            &["45-minutes", "60-minutes", "1-days", "1-months"],
            "2024-03-30T00:00:00Z",
            "2024-04-01T06:00:00Z",
        );

        let day = bucketer.divider("1-days").unwrap();
        // 03:00 CEST, before the gap-resolved boundary at 01:30Z
        assert_eq!(
            day.divide(utc("2024-03-31T01:00:00Z")),
            utc("2024-03-30T01:30:00Z")
        );
        assert_eq!(
            day.divide(utc("2024-03-31T01:45:00Z")),
            utc("2024-03-31T01:30:00Z")
        );
    }

    #[test]
    fn test_minute_buckets_follow_local_origin_after_dst() {
        let bucketer = copenhagen_bucketer();
        let divider = bucketer.divider("45-minutes").unwrap();

        // Local midnight 2024-04-01 is 2912 whole intervals after the origin.
        assert_eq!(
            divider.divide(utc("2024-03-31T22:00:00Z")),
            utc("2024-03-31T22:00:00Z")
        );
        assert_eq!(
            divider.divide(utc("2024-03-31T22:44:59Z")),
            utc("2024-03-31T22:00:00Z")
        );
        assert_eq!(
            divider.next(utc("2024-03-31T22:00:00Z")),
            utc("2024-03-31T22:45:00Z")
        );
    }

    #[test]
    fn test_day_bucket_across_spring_forward_is_23_hours() {
        let bucketer = copenhagen_bucketer();
        let day = bucketer.divider("1-days").unwrap();
        let next = bucketer.next("1-days").unwrap();

        let start = day.divide(utc("2024-03-31T12:00:00Z"));
        assert_eq!(start, utc("2024-03-30T23:00:00Z"));
        let end = next(start);
        assert_eq!(end, utc("2024-03-31T22:00:00Z"));
        assert_eq!((end - start).num_hours(), 23);
    }

    #[test]
    fn test_day_bucket_across_fall_back_is_25_hours() {
        let bucketer = copenhagen_bucketer();
        let day = bucketer.divider("1-days").unwrap();
        let next = bucketer.next("1-days").unwrap();

        let start = day.divide(utc("2024-10-27T12:00:00Z"));
        assert_eq!(start, utc("2024-10-26T22:00:00Z"));
        let end = next(start);
        assert_eq!(end, utc("2024-10-27T23:00:00Z"));
        assert_eq!((end - start).num_hours(), 25);
        assert_eq!(day.divide(end - TimeDelta::seconds(1)), start);
    }

    #[test]
    fn test_local_month_buckets() {
        let bucketer = copenhagen_bucketer();
        let month = bucketer.divider("1-months").unwrap();

        let start = month.divide(utc("2024-03-15T10:00:00Z"));
        assert_eq!(start, utc("2024-02-29T23:00:00Z"));
        assert_eq!(month.next(start), utc("2024-03-31T22:00:00Z"));

        // before the origin
        assert_eq!(
            month.divide(utc("2023-11-20T10:00:00Z")),
            utc("2023-10-31T23:00:00Z")
        );
    }

    #[test]
    fn test_period_end() {
        let bucketer = TimeBucketer::new(Copenhagen, utc("2024-03-15T10:00:00Z")).unwrap();
        assert_eq!(
            bucketer.period_end(Period::Day).unwrap(),
            utc("2024-03-15T23:00:00Z")
        );
        assert_eq!(
            bucketer.period_end(Period::Month).unwrap(),
            utc("2024-03-31T22:00:00Z")
        );
        assert_eq!(
            bucketer.period_end(Period::Year).unwrap(),
            utc("2024-12-31T23:00:00Z")
        );
    }

    #[test]
    fn test_bucketer_rejects_non_utc_origin() {
        let origin = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+01:00").unwrap();
        assert!(matches!(
            TimeBucketer::new(Copenhagen, origin),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_period() {
        assert_eq!("Day".parse::<Period>().unwrap(), Period::Day);
        assert_eq!("month".parse::<Period>().unwrap(), Period::Month);
        assert_eq!("YEAR".parse::<Period>().unwrap(), Period::Year);
        assert!("week".parse::<Period>().is_err());
    }
}
