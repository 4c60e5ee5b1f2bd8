//! Pure rules turning a record's inputs into its status, flags and hours.
//!
//! Rules are evaluated in precedence order and the first match wins:
//! calendar day off, approved leave, approved work from home, day marked
//! non-working, then the check-in/check-out combinations.

use chrono::{DateTime, Duration, Utc};

use crate::calendar::{CalendarDay, DEFAULT_HOLIDAY_NOTE};
use crate::model::attendance::{
    AttendanceRecord, AttendanceStatus, Flags, Hours, WorkLocation, WorkSchedule,
};
use crate::model::leave::LeaveType;
use crate::policy::AttendancePolicy;

/// Re-derive status, flags, hours and punctuality of `record`
pub fn derive_status(
    mut record: AttendanceRecord,
    day: &CalendarDay,
    policy: &AttendancePolicy,
) -> AttendanceRecord {
    record.flags = Flags::default();
    record.hours = Hours {
        expected: record.schedule.expected_hours,
        ..Hours::default()
    };

    // calendar always wins, even over manual entries
    if day.is_day_off() {
        record.is_working_day = false;
        record.check_in = None;
        record.check_out = None;
        record.hours = Hours::default();
        record.status = AttendanceStatus::Absent;
        record.notes = Some(
            day.note
                .clone()
                .unwrap_or_else(|| DEFAULT_HOLIDAY_NOTE.to_string()),
        );
        return record;
    }

    record.is_working_day = !record.day_off;
    score_punctuality(&mut record, policy);

    if let Some(leave_type) = record
        .leave
        .as_ref()
        .filter(|leave| leave.approved)
        .map(|leave| leave.leave_type)
    {
        record.status = status_for_leave(leave_type);
        if leave_type == LeaveType::Mission {
            // a mission is a full worked day
            record.is_working_day = true;
            record.hours.actual = record.schedule.expected_hours;
            record.hours.total = record.schedule.expected_hours;
        }
        return record;
    }

    if record.work_from_home && record.wfh_approved {
        record.status = AttendanceStatus::WorkFromHome;
        compute_hours(&mut record);
        return record;
    }

    if !record.is_working_day {
        record.check_in = None;
        record.check_out = None;
        record.hours = Hours::default();
        record.status = AttendanceStatus::Weekend;
        return record;
    }

    let approved = record.approved_by.is_some();
    let is_late = record.check_in.as_ref().is_some_and(|c| c.is_late);
    let is_early = record.check_out.as_ref().is_some_and(|c| c.is_early);
    record.flags.is_late = is_late;
    record.flags.is_early_departure = is_early;

    record.status = match (record.check_in.is_some(), record.check_out.is_some()) {
        (false, false) => {
            record.flags.is_missing = true;
            AttendanceStatus::Absent
        }
        (false, true) => {
            record.flags.is_missing = true;
            record.flags.needs_approval = !approved;
            AttendanceStatus::ForgotCheckIn
        }
        (true, false) => {
            record.flags.needs_approval = !approved;
            AttendanceStatus::ForgotCheckOut
        }
        (true, true) => {
            compute_hours(&mut record);
            if is_late {
                AttendanceStatus::Late
            } else if is_early {
                AttendanceStatus::EarlyDeparture
            } else {
                // neither late nor early; `Present` is never derived from punches
                AttendanceStatus::OnTime
            }
        }
    };

    record
}

pub fn status_for_leave(leave_type: LeaveType) -> AttendanceStatus {
    match leave_type {
        LeaveType::Annual | LeaveType::Casual => AttendanceStatus::Vacation,
        LeaveType::Sick => AttendanceStatus::SickLeave,
        LeaveType::Mission => AttendanceStatus::Mission,
        _ => AttendanceStatus::Vacation,
    }
}

/// Scheduled start and end of the record's day as instants
pub fn scheduled_window(
    record: &AttendanceRecord,
    policy: &AttendancePolicy,
) -> (DateTime<Utc>, DateTime<Utc>) {
    window_for(record.date, &record.schedule, policy)
}

fn window_for(
    date: chrono::NaiveDate,
    schedule: &WorkSchedule,
    policy: &AttendancePolicy,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = policy.to_utc(date, schedule.start);
    let mut end = policy.to_utc(date, schedule.end);
    if schedule.ends_next_day() {
        end += Duration::days(1);
    }
    (start, end)
}

fn score_punctuality(record: &mut AttendanceRecord, policy: &AttendancePolicy) {
    let (start, end) = scheduled_window(record, policy);
    let tolerance = Duration::minutes(policy.tolerance_minutes);

    if let Some(check_in) = record.check_in.as_mut() {
        check_in.is_late = check_in.time > start + tolerance;
        check_in.late_minutes = (check_in.time - start).num_minutes().max(0);
    }

    if let Some(check_out) = record.check_out.as_mut() {
        check_out.is_early = check_out.time < end - tolerance;
        check_out.early_minutes = (end - check_out.time).num_minutes().max(0);
    }
}

fn compute_hours(record: &mut AttendanceRecord) {
    let (Some(check_in), Some(check_out)) = (record.check_in.as_ref(), record.check_out.as_ref())
    else {
        return;
    };

    let worked = (check_out.time - check_in.time).num_seconds().max(0) as f64 / 3600.0;
    let actual = round2(worked);
    let expected = record.schedule.expected_hours;
    let work_from_home = if check_in.location == WorkLocation::Home {
        actual
    } else {
        0.0
    };

    record.hours = Hours {
        actual,
        expected,
        overtime: round2((actual - expected).max(0.0)),
        work_from_home,
        total: round2(actual + work_from_home),
    };
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
