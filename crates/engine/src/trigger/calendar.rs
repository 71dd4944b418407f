//! Calendar-recurrence descriptor and "next firing instant" arithmetic.
//! Computed from primitive fields rather than a cron library, to keep the
//! "advance to next valid Feb 29 / day 31" policy explicit and testable.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

use crate::error::EngineError;

/// A calendar-recurrence descriptor, or a fixed millisecond interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleDescriptor {
    EveryMinute { second: u32 },
    EveryHour { minute: u32, second: u32 },
    EveryDay { hour: u32, minute: u32, second: u32 },
    EveryMonth { day: u32, hour: u32, minute: u32, second: u32 },
    EveryYear { month: u32, day: u32, hour: u32, minute: u32, second: u32 },
    EveryInterval { millis: u64 },
}

const ONE_YEAR_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// Validate field ranges. Does not check whether a specific
/// calendar date can ever occur (day 31 in February is valid input — it
/// just skips February at firing time).
pub fn validate(descriptor: &ScheduleDescriptor) -> Result<(), EngineError> {
    let invalid = |msg: String| Err(EngineError::ScheduleInvalid(msg));
    match descriptor {
        ScheduleDescriptor::EveryMinute { second } => {
            if *second > 59 {
                return invalid(format!("second {second} out of range 0-59"));
            }
        }
        ScheduleDescriptor::EveryHour { minute, second } => {
            if *minute > 59 {
                return invalid(format!("minute {minute} out of range 0-59"));
            }
            if *second > 59 {
                return invalid(format!("second {second} out of range 0-59"));
            }
        }
        ScheduleDescriptor::EveryDay { hour, minute, second } => {
            if *hour > 23 {
                return invalid(format!("hour {hour} out of range 0-23"));
            }
            if *minute > 59 {
                return invalid(format!("minute {minute} out of range 0-59"));
            }
            if *second > 59 {
                return invalid(format!("second {second} out of range 0-59"));
            }
        }
        ScheduleDescriptor::EveryMonth { day, hour, minute, second } => {
            if !(1..=31).contains(day) {
                return invalid(format!("day {day} out of range 1-31"));
            }
            if *hour > 23 {
                return invalid(format!("hour {hour} out of range 0-23"));
            }
            if *minute > 59 {
                return invalid(format!("minute {minute} out of range 0-59"));
            }
            if *second > 59 {
                return invalid(format!("second {second} out of range 0-59"));
            }
        }
        ScheduleDescriptor::EveryYear { month, day, hour, minute, second } => {
            if !(1..=12).contains(month) {
                return invalid(format!("month {month} out of range 1-12"));
            }
            if !(1..=31).contains(day) {
                return invalid(format!("day {day} out of range 1-31"));
            }
            if *hour > 23 {
                return invalid(format!("hour {hour} out of range 0-23"));
            }
            if *minute > 59 {
                return invalid(format!("minute {minute} out of range 0-59"));
            }
            if *second > 59 {
                return invalid(format!("second {second} out of range 0-59"));
            }
        }
        ScheduleDescriptor::EveryInterval { millis } => {
            if *millis == 0 {
                return invalid("interval must be > 0".to_string());
            }
            if *millis as u64 >= ONE_YEAR_MS {
                return invalid("interval must be less than one year".to_string());
            }
        }
    }
    Ok(())
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
        .day()
}

/// The smallest future instant that matches `descriptor`, strictly after
/// `now`, in UTC.
pub fn next_execution_time(
    descriptor: &ScheduleDescriptor,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, EngineError> {
    match descriptor {
        ScheduleDescriptor::EveryMinute { second } => {
            let candidate = now
                .date_naive()
                .and_hms_opt(now.hour(), now.minute(), 0)
                .unwrap()
                + chrono::Duration::seconds(*second as i64);
            let candidate = Utc.from_utc_datetime(&candidate);
            Ok(if candidate > now { candidate } else { candidate + chrono::Duration::minutes(1) })
        }
        ScheduleDescriptor::EveryHour { minute, second } => {
            let candidate = now
                .date_naive()
                .and_hms_opt(now.hour(), 0, 0)
                .unwrap()
                + chrono::Duration::minutes(*minute as i64)
                + chrono::Duration::seconds(*second as i64);
            let candidate = Utc.from_utc_datetime(&candidate);
            Ok(if candidate > now { candidate } else { candidate + chrono::Duration::hours(1) })
        }
        ScheduleDescriptor::EveryDay { hour, minute, second } => {
            let candidate = now
                .date_naive()
                .and_hms_opt(*hour, *minute, *second)
                .ok_or_else(|| EngineError::ScheduleInvalid("invalid time of day".to_string()))?;
            let candidate = Utc.from_utc_datetime(&candidate);
            Ok(if candidate > now { candidate } else { candidate + chrono::Duration::days(1) })
        }
        ScheduleDescriptor::EveryMonth { day, hour, minute, second } => {
            let mut year = now.year();
            let mut month = now.month();
            for _ in 0..24 {
                if *day <= days_in_month(year, month) {
                    let date = NaiveDate::from_ymd_opt(year, month, *day).unwrap();
                    let candidate = Utc.from_utc_datetime(
                        &date.and_hms_opt(*hour, *minute, *second).unwrap(),
                    );
                    if candidate > now {
                        return Ok(candidate);
                    }
                }
                if month == 12 {
                    month = 1;
                    year += 1;
                } else {
                    month += 1;
                }
            }
            Err(EngineError::ScheduleInvalid("no future month has day-of-month".to_string()))
        }
        ScheduleDescriptor::EveryYear { month, day, hour, minute, second } => {
            let mut year = now.year();
            for _ in 0..16 {
                if *day <= days_in_month(year, *month) {
                    let date = NaiveDate::from_ymd_opt(year, *month, *day).unwrap();
                    let candidate = Utc.from_utc_datetime(
                        &date.and_hms_opt(*hour, *minute, *second).unwrap(),
                    );
                    if candidate > now {
                        return Ok(candidate);
                    }
                }
                year += 1;
            }
            Err(EngineError::ScheduleInvalid("no future year has the given month/day".to_string()))
        }
        ScheduleDescriptor::EveryInterval { millis } => Ok(now + chrono::Duration::milliseconds(*millis as i64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, s).unwrap())
    }

    #[test]
    fn every_minute_sixty_second_delay() {
        // "now" at 12:00:30, second=10 -> next firing 12:01:10 (60s delay).
        let now = dt(2026, 1, 1, 12, 0, 30);
        let next = next_execution_time(&ScheduleDescriptor::EveryMinute { second: 10 }, now).unwrap();
        assert_eq!(next, dt(2026, 1, 1, 12, 1, 10));
    }

    #[test]
    fn every_minute_future_second_same_minute() {
        let now = dt(2026, 1, 1, 12, 0, 5);
        let next = next_execution_time(&ScheduleDescriptor::EveryMinute { second: 10 }, now).unwrap();
        assert_eq!(next, dt(2026, 1, 1, 12, 0, 10));
    }

    #[test]
    fn day_31_skips_short_months() {
        // April has 30 days; day 31 must skip to May 31.
        let now = dt(2026, 4, 1, 0, 0, 0);
        let next = next_execution_time(
            &ScheduleDescriptor::EveryMonth { day: 31, hour: 0, minute: 0, second: 0 },
            now,
        )
        .unwrap();
        assert_eq!(next, dt(2026, 5, 31, 0, 0, 0));
    }

    #[test]
    fn feb_29_advances_to_next_leap_year() {
        // 2026-02-28T23:00Z is not a leap year -> next Feb 29 is 2028.
        let now = dt(2026, 2, 28, 23, 0, 0);
        let next = next_execution_time(
            &ScheduleDescriptor::EveryYear { month: 2, day: 29, hour: 0, minute: 0, second: 0 },
            now,
        )
        .unwrap();
        assert_eq!(next, dt(2028, 2, 29, 0, 0, 0));
    }

    #[test]
    fn every_year_feb_29_from_2023_lands_on_2024() {
        // A non-leap year one day out should still land on the next leap year.
        let now = dt(2023, 2, 28, 23, 0, 0);
        let next = next_execution_time(
            &ScheduleDescriptor::EveryYear { month: 2, day: 29, hour: 0, minute: 0, second: 0 },
            now,
        )
        .unwrap();
        assert_eq!(next, dt(2024, 2, 29, 0, 0, 0));
    }

    #[test]
    fn interval_must_be_positive_and_under_a_year() {
        assert!(validate(&ScheduleDescriptor::EveryInterval { millis: 0 }).is_err());
        assert!(validate(&ScheduleDescriptor::EveryInterval { millis: ONE_YEAR_MS }).is_err());
        assert!(validate(&ScheduleDescriptor::EveryInterval { millis: 1000 }).is_ok());
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        assert!(validate(&ScheduleDescriptor::EveryHour { minute: 60, second: 0 }).is_err());
        assert!(validate(&ScheduleDescriptor::EveryDay { hour: 24, minute: 0, second: 0 }).is_err());
        assert!(validate(&ScheduleDescriptor::EveryYear { month: 13, day: 1, hour: 0, minute: 0, second: 0 }).is_err());
    }
}
