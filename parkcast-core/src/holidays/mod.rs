//! Holiday calendar: statutory holidays, special shopping days and custom dates.
//!
//! Lookups are pure functions of the date. Holiday identities are encoded into
//! the fixed [`HolidayCategory`] scheme used as a model feature; names the
//! scheme does not know fall back to [`HolidayCategory::Generic`].

pub mod rules;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use rules::{Observance, is_weekend};

/// Fixed categorical encoding of holiday identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidayCategory {
    None,
    Generic,
    NewYearsDay,
    FamilyDay,
    GoodFriday,
    VictoriaDay,
    CanadaDay,
    CivicHoliday,
    LabourDay,
    Thanksgiving,
    ChristmasDay,
    BoxingDay,
    BlackFriday,
    ChristmasEve,
    NewYearsEve,
    Weekend,
}

impl HolidayCategory {
    /// Numeric code fed to the models. Codes are append-only.
    pub fn code(self) -> u8 {
        match self {
            HolidayCategory::None => 0,
            HolidayCategory::Generic => 1,
            HolidayCategory::NewYearsDay => 2,
            HolidayCategory::FamilyDay => 3,
            HolidayCategory::GoodFriday => 4,
            HolidayCategory::VictoriaDay => 5,
            HolidayCategory::CanadaDay => 6,
            HolidayCategory::CivicHoliday => 7,
            HolidayCategory::LabourDay => 8,
            HolidayCategory::Thanksgiving => 9,
            HolidayCategory::ChristmasDay => 10,
            HolidayCategory::BoxingDay => 11,
            HolidayCategory::BlackFriday => 12,
            HolidayCategory::ChristmasEve => 13,
            HolidayCategory::NewYearsEve => 14,
            HolidayCategory::Weekend => 15,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            HolidayCategory::None => "",
            HolidayCategory::Generic => "Holiday",
            HolidayCategory::NewYearsDay => "New Year's Day",
            HolidayCategory::FamilyDay => "Family Day",
            HolidayCategory::GoodFriday => "Good Friday",
            HolidayCategory::VictoriaDay => "Victoria Day",
            HolidayCategory::CanadaDay => "Canada Day",
            HolidayCategory::CivicHoliday => "Civic Holiday",
            HolidayCategory::LabourDay => "Labour Day",
            HolidayCategory::Thanksgiving => "Thanksgiving",
            HolidayCategory::ChristmasDay => "Christmas Day",
            HolidayCategory::BoxingDay => "Boxing Day",
            HolidayCategory::BlackFriday => "Black Friday",
            HolidayCategory::ChristmasEve => "Christmas Eve",
            HolidayCategory::NewYearsEve => "New Year's Eve",
            HolidayCategory::Weekend => "Weekend",
        }
    }

    /// Holidays pinned to a calendar date, which get an observed weekday.
    pub fn is_fixed_date(self) -> bool {
        matches!(
            self,
            HolidayCategory::NewYearsDay
                | HolidayCategory::CanadaDay
                | HolidayCategory::ChristmasDay
                | HolidayCategory::BoxingDay
        )
    }

    /// Encode a holiday name. Empty names are `None`, unknown names `Generic`.
    pub fn from_name(name: &str) -> Self {
        let normalized: String = name
            .trim()
            .trim_end_matches("(observed)")
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| *c != '\'' && *c != '\u{2019}')
            .collect();
        match normalized.as_str() {
            "" => HolidayCategory::None,
            "new years day" => HolidayCategory::NewYearsDay,
            "family day" => HolidayCategory::FamilyDay,
            "good friday" => HolidayCategory::GoodFriday,
            "victoria day" => HolidayCategory::VictoriaDay,
            "canada day" | "dominion day" => HolidayCategory::CanadaDay,
            "civic holiday" => HolidayCategory::CivicHoliday,
            "labour day" | "labor day" => HolidayCategory::LabourDay,
            "thanksgiving" | "thanksgiving day" => HolidayCategory::Thanksgiving,
            "christmas day" | "christmas" => HolidayCategory::ChristmasDay,
            "boxing day" => HolidayCategory::BoxingDay,
            "black friday" => HolidayCategory::BlackFriday,
            "christmas eve" => HolidayCategory::ChristmasEve,
            "new years eve" => HolidayCategory::NewYearsEve,
            "saturday" | "sunday" | "weekend" => HolidayCategory::Weekend,
            _ => HolidayCategory::Generic,
        }
    }
}

/// Where a holiday came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidayKind {
    None,
    Official,
    Special,
    Custom,
    Weekend,
}

/// Result of a holiday lookup for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayInfo {
    pub is_holiday: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: HolidayKind,
}

impl HolidayInfo {
    pub fn none() -> Self {
        Self {
            is_holiday: false,
            name: None,
            kind: HolidayKind::None,
        }
    }

    pub fn new(name: impl Into<String>, kind: HolidayKind) -> Self {
        Self {
            is_holiday: true,
            name: Some(name.into()),
            kind,
        }
    }

    /// Categorical encoding of this holiday.
    pub fn category(&self) -> HolidayCategory {
        if !self.is_holiday {
            return HolidayCategory::None;
        }
        match self.name.as_deref() {
            Some(name) => match HolidayCategory::from_name(name) {
                HolidayCategory::None => HolidayCategory::Generic,
                category => category,
            },
            None => HolidayCategory::Generic,
        }
    }
}

/// Capability interface over a holiday calendar. Must be a pure function of `date`.
pub trait HolidayLookup {
    fn lookup(&self, date: NaiveDate) -> HolidayInfo;
}

/// Which source wins when a date is both an official holiday and a custom date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidayPrecedence {
    #[default]
    OfficialFirst,
    CustomFirst,
}

/// Ontario holiday calendar with special days and configured custom dates.
#[derive(Debug, Clone)]
pub struct HolidayCalendar {
    weekends_as_holidays: bool,
    special_days: bool,
    precedence: HolidayPrecedence,
    custom: BTreeMap<NaiveDate, String>,
}

impl Default for HolidayCalendar {
    fn default() -> Self {
        Self {
            weekends_as_holidays: true,
            special_days: true,
            precedence: HolidayPrecedence::OfficialFirst,
            custom: BTreeMap::new(),
        }
    }
}

impl HolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weekends_as_holidays(mut self, enabled: bool) -> Self {
        self.weekends_as_holidays = enabled;
        self
    }

    pub fn with_special_days(mut self, enabled: bool) -> Self {
        self.special_days = enabled;
        self
    }

    pub fn with_precedence(mut self, precedence: HolidayPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    /// Mark an extra date. A custom date replaces a built-in special day on the same date.
    pub fn with_custom(mut self, date: NaiveDate, name: impl Into<String>) -> Self {
        self.custom.insert(date, name.into());
        self
    }

    fn official(&self, date: NaiveDate) -> Option<HolidayInfo> {
        rules::statutory_holidays(date.year())
            .into_iter()
            .find(|o| o.date == date)
            .map(|o| HolidayInfo::new(o.name(), HolidayKind::Official))
    }

    fn marked(&self, date: NaiveDate) -> Option<HolidayInfo> {
        if let Some(name) = self.custom.get(&date) {
            return Some(HolidayInfo::new(name.clone(), HolidayKind::Custom));
        }
        if !self.special_days {
            return None;
        }
        rules::special_days(date.year())
            .into_iter()
            .find(|(d, _)| *d == date)
            .map(|(_, category)| HolidayInfo::new(category.display_name(), HolidayKind::Special))
    }

    fn weekend(&self, date: NaiveDate) -> Option<HolidayInfo> {
        if !self.weekends_as_holidays {
            return None;
        }
        match date.weekday() {
            Weekday::Sat => Some(HolidayInfo::new("Saturday", HolidayKind::Weekend)),
            Weekday::Sun => Some(HolidayInfo::new("Sunday", HolidayKind::Weekend)),
            _ => None,
        }
    }

    /// Every non-weekend holiday in `year`, resolved with this calendar's precedence.
    pub fn holidays_in_year(&self, year: i32) -> Vec<(NaiveDate, HolidayInfo)> {
        let mut dates: Vec<NaiveDate> = rules::statutory_holidays(year)
            .into_iter()
            .map(|o| o.date)
            .collect();
        if self.special_days {
            dates.extend(rules::special_days(year).into_iter().map(|(d, _)| d));
        }
        dates.extend(self.custom.keys().filter(|d| d.year() == year).copied());
        dates.sort_unstable();
        dates.dedup();
        dates
            .into_iter()
            .map(|d| {
                let info = match self.precedence {
                    HolidayPrecedence::OfficialFirst => self.official(d).or_else(|| self.marked(d)),
                    HolidayPrecedence::CustomFirst => self.marked(d).or_else(|| self.official(d)),
                };
                (d, info.unwrap_or_else(HolidayInfo::none))
            })
            .filter(|(_, info)| info.is_holiday)
            .collect()
    }
}

impl HolidayLookup for HolidayCalendar {
    fn lookup(&self, date: NaiveDate) -> HolidayInfo {
        let dated = match self.precedence {
            HolidayPrecedence::OfficialFirst => self.official(date).or_else(|| self.marked(date)),
            HolidayPrecedence::CustomFirst => self.marked(date).or_else(|| self.official(date)),
        };
        dated
            .or_else(|| self.weekend(date))
            .unwrap_or_else(HolidayInfo::none)
    }
}
