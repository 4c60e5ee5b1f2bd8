use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::leave::LeaveType;

/// Canonical per-day status produced by the status engine
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AttendanceStatus {
    OnTime,
    Present,
    Late,
    EarlyDeparture,
    Absent,
    ForgotCheckIn,
    ForgotCheckOut,
    WorkFromHome,
    Vacation,
    SickLeave,
    Mission,
    Weekend,
}

impl AttendanceStatus {
    /// Statuses that count as an attended day
    pub fn is_present(&self) -> bool {
        matches!(
            self,
            AttendanceStatus::OnTime
                | AttendanceStatus::Present
                | AttendanceStatus::Late
                | AttendanceStatus::EarlyDeparture
                | AttendanceStatus::WorkFromHome
                | AttendanceStatus::Mission
        )
    }

    /// Statuses that count as a missed day when the day was a working day
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            AttendanceStatus::Absent
                | AttendanceStatus::ForgotCheckIn
                | AttendanceStatus::ForgotCheckOut
        )
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CheckMethod {
    Biometric,
    Manual,
    Wfh,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WorkLocation {
    Office,
    Home,
    Remote,
}

/// Expected working window of an employee, as tenant-local times of day
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkSchedule {
    #[schema(example = "09:00:00", value_type = String, format = "time")]
    pub start: NaiveTime,
    #[schema(example = "17:00:00", value_type = String, format = "time")]
    pub end: NaiveTime,
    #[schema(example = 8.0)]
    pub expected_hours: f64,
}

impl WorkSchedule {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        let expected_hours = Self::span(start, end).num_minutes() as f64 / 60.0;
        Self {
            start,
            end,
            expected_hours,
        }
    }

    /// Length of the window; an end at or before the start wraps past midnight
    fn span(start: NaiveTime, end: NaiveTime) -> Duration {
        let span = end - start;
        if span <= Duration::zero() {
            span + Duration::hours(24)
        } else {
            span
        }
    }

    pub fn ends_next_day(&self) -> bool {
        self.end <= self.start
    }

    pub fn midpoint(&self) -> NaiveTime {
        let half = Self::span(self.start, self.end) / 2;
        self.start.overflowing_add_signed(half).0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckIn {
    #[schema(example = "2026-01-04T03:20:00Z", value_type = String, format = "date-time")]
    pub time: DateTime<Utc>,
    pub method: CheckMethod,
    pub location: WorkLocation,
    pub is_late: bool,
    pub late_minutes: i64,
}

impl CheckIn {
    pub fn new(time: DateTime<Utc>, method: CheckMethod, location: WorkLocation) -> Self {
        Self {
            time,
            method,
            location,
            is_late: false,
            late_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckOut {
    #[schema(example = "2026-01-04T11:00:00Z", value_type = String, format = "date-time")]
    pub time: DateTime<Utc>,
    pub method: CheckMethod,
    pub location: WorkLocation,
    pub is_early: bool,
    pub early_minutes: i64,
}

impl CheckOut {
    pub fn new(time: DateTime<Utc>, method: CheckMethod, location: WorkLocation) -> Self {
        Self {
            time,
            method,
            location,
            is_early: false,
            early_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Hours {
    pub actual: f64,
    pub expected: f64,
    pub overtime: f64,
    pub work_from_home: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Flags {
    pub is_late: bool,
    pub is_early_departure: bool,
    pub is_missing: bool,
    pub needs_approval: bool,
}

/// Reference to the leave covering a record's date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeaveLink {
    pub leave_id: u64,
    pub leave_type: LeaveType,
    pub approved: bool,
}

/// Unique identity of an attendance record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub tenant_id: String,
    pub employee_id: u64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = "acme")]
    pub tenant_id: String,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = 10, nullable = true)]
    pub department_id: Option<u64>,
    #[schema(example = 3, nullable = true)]
    pub position_id: Option<u64>,
    #[schema(example = "2026-01-04", value_type = String, format = "date")]
    pub date: NaiveDate,
    pub schedule: WorkSchedule,
    pub check_in: Option<CheckIn>,
    pub check_out: Option<CheckOut>,
    pub hours: Hours,
    pub status: AttendanceStatus,
    pub leave: Option<LeaveLink>,
    pub work_from_home: bool,
    pub wfh_approved: bool,
    /// Day explicitly marked as non-working for this employee
    pub day_off: bool,
    pub flags: Flags,
    pub is_working_day: bool,
    pub auto_generated: bool,
    pub approved_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl AttendanceRecord {
    /// Blank record for a day, before any status derivation
    pub fn new(key: RecordKey, schedule: WorkSchedule) -> Self {
        Self {
            tenant_id: key.tenant_id,
            employee_id: key.employee_id,
            department_id: None,
            position_id: None,
            date: key.date,
            schedule,
            check_in: None,
            check_out: None,
            hours: Hours {
                expected: schedule.expected_hours,
                ..Hours::default()
            },
            status: AttendanceStatus::Absent,
            leave: None,
            work_from_home: false,
            wfh_approved: false,
            day_off: false,
            flags: Flags::default(),
            is_working_day: true,
            auto_generated: false,
            approved_by: None,
            approved_at: None,
            notes: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            tenant_id: self.tenant_id.clone(),
            employee_id: self.employee_id,
            date: self.date,
        }
    }
}

/// Aggregated attendance figures for one employee over a date range
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceMetrics {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub start: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end: NaiveDate,
    pub recorded_days: u32,
    pub working_days: u32,
    pub present_days: u32,
    pub absent_days: u32,
    pub late_days: u32,
    pub early_departure_days: u32,
    pub leave_days: u32,
    pub non_working_days: u32,
    #[schema(value_type = Object)]
    pub status_counts: BTreeMap<AttendanceStatus, u32>,
    pub actual_hours: f64,
    pub expected_hours: f64,
    pub overtime_hours: f64,
    pub work_from_home_hours: f64,
    pub total_hours: f64,
    /// Present days over present plus absent days, in percent
    pub attendance_rate: f64,
}
