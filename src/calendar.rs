use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Datelike, NaiveDate, Weekday};

pub const DEFAULT_HOLIDAY_NOTE: &str = "Official Holiday";
pub const WEEKEND_NOTE: &str = "Weekend";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HolidayInfo {
    pub is_holiday: bool,
    pub note: Option<String>,
}

/// Calendar verdict for one date
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub note: Option<String>,
}

impl CalendarDay {
    pub fn working(date: NaiveDate) -> Self {
        Self {
            date,
            is_weekend: false,
            is_holiday: false,
            note: None,
        }
    }

    pub fn is_day_off(&self) -> bool {
        self.is_weekend || self.is_holiday
    }
}

/// Answers whether a date is a weekend or an official holiday for a tenant
pub trait CalendarOracle: Send + Sync {
    fn is_weekend(&self, tenant_id: &str, date: NaiveDate) -> bool;

    fn holiday_info(&self, tenant_id: &str, date: NaiveDate) -> HolidayInfo;

    fn day(&self, tenant_id: &str, date: NaiveDate) -> CalendarDay {
        let holiday = self.holiday_info(tenant_id, date);
        let is_weekend = self.is_weekend(tenant_id, date);
        let note = if holiday.is_holiday {
            holiday
                .note
                .or_else(|| Some(DEFAULT_HOLIDAY_NOTE.to_string()))
        } else if is_weekend {
            Some(WEEKEND_NOTE.to_string())
        } else {
            None
        };

        CalendarDay {
            date,
            is_weekend,
            is_holiday: holiday.is_holiday,
            note,
        }
    }
}

/// Fixed weekend days plus a holiday table. Holidays registered without a
/// tenant apply to every tenant.
pub struct HolidayCalendar {
    weekend: Vec<Weekday>,
    holidays: RwLock<HashMap<(Option<String>, NaiveDate), String>>,
}

impl HolidayCalendar {
    pub fn new(weekend: Vec<Weekday>) -> Self {
        Self {
            weekend,
            holidays: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_holiday(&self, tenant_id: Option<&str>, date: NaiveDate, note: &str) {
        self.holidays
            .write()
            .expect("holiday calendar poisoned")
            .insert((tenant_id.map(str::to_string), date), note.to_string());
    }

    pub fn remove_holiday(&self, tenant_id: Option<&str>, date: NaiveDate) -> bool {
        self.holidays
            .write()
            .expect("holiday calendar poisoned")
            .remove(&(tenant_id.map(str::to_string), date))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.holidays
            .read()
            .expect("holiday calendar poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CalendarOracle for HolidayCalendar {
    fn is_weekend(&self, _tenant_id: &str, date: NaiveDate) -> bool {
        self.weekend.contains(&date.weekday())
    }

    fn holiday_info(&self, tenant_id: &str, date: NaiveDate) -> HolidayInfo {
        let holidays = self.holidays.read().expect("holiday calendar poisoned");
        let note = holidays
            .get(&(Some(tenant_id.to_string()), date))
            .or_else(|| holidays.get(&(None, date)));

        match note {
            Some(note) => HolidayInfo {
                is_holiday: true,
                note: if note.is_empty() {
                    None
                } else {
                    Some(note.clone())
                },
            },
            None => HolidayInfo::default(),
        }
    }
}

/// Parse a comma separated weekday list such as `Fri,Sat`
pub fn parse_weekend(value: &str) -> Result<Vec<Weekday>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Weekday>()
                .map_err(|_| format!("invalid weekday: {}", s))
        })
        .collect()
}
