//! Date rules for Ontario statutory holidays and special shopping days.

use super::HolidayCategory;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashSet;

/// Distances to holidays are capped here; it also stands in for "none found".
pub const MAX_HOLIDAY_DISTANCE: i64 = 366;

/// One holiday occurrence, either on its calendar date or an observed weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observance {
    pub date: NaiveDate,
    pub category: HolidayCategory,
    pub observed: bool,
}

impl Observance {
    pub fn name(&self) -> String {
        if self.observed {
            format!("{} (observed)", self.category.display_name())
        } else {
            self.category.display_name().to_string()
        }
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Easter Sunday (Gregorian calendar, anonymous algorithm).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year.rem_euclid(19);
    let b = year.div_euclid(100);
    let c = year.rem_euclid(100);
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

/// Latest `weekday` on or before the given date.
fn weekday_on_or_before(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let back = (7 + date.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    date - Duration::days(i64::from(back))
}

/// Statutory holidays on their calendar dates, sorted.
pub fn statutory_dates(year: i32) -> Vec<(NaiveDate, HolidayCategory)> {
    use HolidayCategory::*;
    let candidates = [
        (NaiveDate::from_ymd_opt(year, 1, 1), NewYearsDay),
        (nth_weekday(year, 2, Weekday::Mon, 3), FamilyDay),
        (
            easter_sunday(year).map(|d| d - Duration::days(2)),
            GoodFriday,
        ),
        (
            NaiveDate::from_ymd_opt(year, 5, 24).map(|d| weekday_on_or_before(d, Weekday::Mon)),
            VictoriaDay,
        ),
        (NaiveDate::from_ymd_opt(year, 7, 1), CanadaDay),
        (nth_weekday(year, 8, Weekday::Mon, 1), CivicHoliday),
        (nth_weekday(year, 9, Weekday::Mon, 1), LabourDay),
        (nth_weekday(year, 10, Weekday::Mon, 2), Thanksgiving),
        (NaiveDate::from_ymd_opt(year, 12, 25), ChristmasDay),
        (NaiveDate::from_ymd_opt(year, 12, 26), BoxingDay),
    ];
    let mut dates: Vec<_> = candidates
        .into_iter()
        .filter_map(|(date, category)| date.map(|d| (d, category)))
        .collect();
    dates.sort_by_key(|(d, _)| *d);
    dates
}

/// Statutory holidays including observed weekdays for fixed-date holidays
/// that fall on a weekend.
///
/// An observed day moves to the next weekday that is not already a holiday,
/// so Christmas on a Saturday is observed Monday and Boxing Day Tuesday.
pub fn statutory_holidays(year: i32) -> Vec<Observance> {
    let actual = statutory_dates(year);
    let mut taken: HashSet<NaiveDate> = actual.iter().map(|(d, _)| *d).collect();
    let mut out: Vec<Observance> = actual
        .iter()
        .map(|&(date, category)| Observance {
            date,
            category,
            observed: false,
        })
        .collect();

    for &(date, category) in &actual {
        if !category.is_fixed_date() || !is_weekend(date) {
            continue;
        }
        let mut observed = date + Duration::days(1);
        while is_weekend(observed) || taken.contains(&observed) {
            observed += Duration::days(1);
        }
        taken.insert(observed);
        out.push(Observance {
            date: observed,
            category,
            observed: true,
        });
    }
    out.sort_by_key(|o| o.date);
    out
}

/// Built-in special days: Black Friday, Christmas Eve, New Year's Eve.
pub fn special_days(year: i32) -> Vec<(NaiveDate, HolidayCategory)> {
    let black_friday =
        nth_weekday(year, 11, Weekday::Thu, 4).map(|thanksgiving| thanksgiving + Duration::days(1));
    [
        (black_friday, HolidayCategory::BlackFriday),
        (
            NaiveDate::from_ymd_opt(year, 12, 24),
            HolidayCategory::ChristmasEve,
        ),
        (
            NaiveDate::from_ymd_opt(year, 12, 31),
            HolidayCategory::NewYearsEve,
        ),
    ]
    .into_iter()
    .filter_map(|(date, category)| date.map(|d| (d, category)))
    .collect()
}

/// Days until the next statutory holiday (0 on the holiday itself).
pub fn days_to_next_statutory(date: NaiveDate) -> i64 {
    [date.year(), date.year() + 1]
        .into_iter()
        .flat_map(statutory_dates)
        .map(|(d, _)| (d - date).num_days())
        .filter(|&n| n >= 0)
        .min()
        .unwrap_or(MAX_HOLIDAY_DISTANCE)
        .min(MAX_HOLIDAY_DISTANCE)
}

/// Days since the previous statutory holiday (0 on the holiday itself).
pub fn days_since_previous_statutory(date: NaiveDate) -> i64 {
    [date.year() - 1, date.year()]
        .into_iter()
        .flat_map(statutory_dates)
        .map(|(d, _)| (date - d).num_days())
        .filter(|&n| n >= 0)
        .min()
        .unwrap_or(MAX_HOLIDAY_DISTANCE)
        .min(MAX_HOLIDAY_DISTANCE)
}
