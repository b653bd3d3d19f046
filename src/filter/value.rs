//! # Value Resolution
//!
//! Special `$` tokens resolved against the caller and a single compilation
//! instant. Both compiled forms read the same resolved value.
//!
//! Dynamic dates are evaluated in UTC. Weeks start on Monday.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;

use crate::auth::User;
use crate::meta::MetaRegistry;
use crate::record::native_date;

/// Everything a compilation may read besides the filter itself
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    pub registry: &'a MetaRegistry,
    pub user: &'a User,
    pub now: DateTime<Utc>,
}

impl<'a> FilterContext<'a> {
    pub fn new(registry: &'a MetaRegistry, user: &'a User) -> Self {
        Self {
            registry,
            user,
            now: Utc::now(),
        }
    }

    /// Pin the compilation instant
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Resolves `raw` if it is a special token.
///
/// Returns `Ok(None)` for ordinary strings and `Err` with a reason when a
/// token names a date outside the representable range.
pub fn resolve_token(raw: &str, ctx: &FilterContext<'_>) -> Result<Option<Value>, String> {
    if !raw.starts_with('$') {
        return Ok(None);
    }
    let user = ctx.user;
    let value = match raw {
        "$user" => Value::String(user.id.clone()),
        "$group" => user.group.clone().map(Value::String).unwrap_or(Value::Null),
        "$groups" => ids(user.groups.iter().cloned()),
        "$allgroups" => ids(user.all_group_ids().into_iter()),
        _ => match raw.strip_prefix("$user.") {
            Some(path) if !path.is_empty() => user.lookup(path).cloned().unwrap_or(Value::Null),
            _ => match resolve_date(raw, ctx.now)? {
                Some(at) => native_date(at),
                None => return Ok(None),
            },
        },
    };
    Ok(Some(value))
}

fn ids(values: impl Iterator<Item = String>) -> Value {
    Value::Array(values.map(Value::String).collect())
}

fn resolve_date(raw: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, String> {
    let today = now.date_naive();
    let from_monday = i64::from(today.weekday().num_days_from_monday());
    let date = match raw {
        "$now" => return Ok(Some(now)),
        "$today" => start_of(today),
        "$yesterday" => start_of(shift_days(today, -1)?),
        "$startOfWeek" => start_of(shift_days(today, -from_monday)?),
        "$startOfMonth" => start_of(today.with_day(1).ok_or_else(|| overflow(raw))?),
        "$startOfYear" => start_of(first_of_year(today.year()).ok_or_else(|| overflow(raw))?),
        "$endOfDay" => end_of(today),
        "$endOfWeek" => end_of(shift_days(today, 6 - from_monday)?),
        "$endOfMonth" => end_of(last_of_month(today).ok_or_else(|| overflow(raw))?),
        "$endOfYear" => end_of(
            first_of_year(today.year() + 1)
                .and_then(|d| d.pred_opt())
                .ok_or_else(|| overflow(raw))?,
        ),
        _ => return resolve_relative(raw, now),
    };
    Ok(Some(date))
}

fn resolve_relative(raw: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, String> {
    let Some((name, amount)) = raw.split_once(':') else {
        return Ok(None);
    };
    let Ok(n) = amount.parse::<u32>() else {
        return Ok(None);
    };
    let today = now.date_naive();
    let at = match name {
        "$hoursAgo" => now.checked_sub_signed(Duration::hours(i64::from(n))),
        "$hoursFromNow" => now.checked_add_signed(Duration::hours(i64::from(n))),
        "$daysAgo" => shift_days(today, -i64::from(n)).ok().map(start_of),
        "$daysFromNow" => shift_days(today, i64::from(n)).ok().map(start_of),
        "$monthsAgo" => today.checked_sub_months(Months::new(n)).map(start_of),
        "$monthsFromNow" => today.checked_add_months(Months::new(n)).map(start_of),
        _ => return Ok(None),
    };
    at.map(Some).ok_or_else(|| overflow(raw))
}

fn overflow(raw: &str) -> String {
    format!("date token {} is out of range", raw)
}

fn shift_days(date: NaiveDate, days: i64) -> Result<NaiveDate, String> {
    date.checked_add_signed(Duration::days(days))
        .ok_or_else(|| "date out of range".to_string())
}

fn first_of_year(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
}

fn last_of_month(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)?.checked_add_months(Months::new(1))?.pred_opt()
}

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn end_of(date: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(last))
}
