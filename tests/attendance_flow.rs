mod common;

use common::*;

use hrm_attendance::error::AttendanceError;
use hrm_attendance::model::attendance::{AttendanceStatus, CheckMethod, WorkLocation};
use hrm_attendance::model::leave::{Leave, LeaveStatus, LeaveType};
use hrm_attendance::service::PunchInput;
use hrm_attendance::store::RecordScope;

fn punch(employee_id: u64, at: chrono::DateTime<chrono::Utc>, day: chrono::NaiveDate) -> PunchInput {
    PunchInput {
        employee_id,
        date: day,
        time: at,
        method: CheckMethod::Manual,
        location: WorkLocation::Office,
    }
}

fn leave(id: u64, leave_type: LeaveType, start: chrono::NaiveDate, end: chrono::NaiveDate) -> Leave {
    Leave {
        id,
        employee_id: 1000,
        department_id: Some(10),
        position_id: Some(3),
        leave_type,
        start_date: start,
        end_date: end,
        status: LeaveStatus::Approved,
    }
}

#[tokio::test]
async fn test_late_day_with_hours() {
    let h = Harness::new();
    let day = date(2026, 1, 4);

    h.attendance
        .record_check_in(TENANT, punch(1000, utc(2026, 1, 4, 9, 20), day))
        .await
        .unwrap();
    let record = h
        .attendance
        .record_check_out(TENANT, punch(1000, utc(2026, 1, 4, 17, 0), day))
        .await
        .unwrap();

    assert_eq!(record.status, AttendanceStatus::Late);
    assert_eq!(record.hours.actual, 7.67);
    assert_eq!(record.hours.overtime, 0.0);
    assert_eq!(record.check_in.as_ref().unwrap().late_minutes, 20);
    assert!(record.flags.is_late);
    assert!(record.is_working_day);
    assert_eq!(record.department_id, Some(10));
}

#[tokio::test]
async fn test_weekend_discards_punches() {
    let h = Harness::new();
    // 2026-01-02 is a Friday
    let friday = date(2026, 1, 2);

    let record = h
        .attendance
        .record_check_in(TENANT, punch(1000, utc(2026, 1, 2, 9, 0), friday))
        .await
        .unwrap();

    assert_eq!(record.status, AttendanceStatus::Absent);
    assert!(!record.is_working_day);
    assert!(record.check_in.is_none());
    assert_eq!(record.hours.total, 0.0);
    assert_eq!(record.notes.as_deref(), Some("Weekend"));
}

#[tokio::test]
async fn test_holiday_declared_later_is_applied_on_recompute() {
    let h = Harness::new();
    let day = date(2026, 2, 22);

    h.attendance
        .record_check_in(TENANT, punch(1000, utc(2026, 2, 22, 9, 0), day))
        .await
        .unwrap();
    h.attendance
        .record_check_in(TENANT, punch(1001, utc(2026, 2, 22, 9, 30), day))
        .await
        .unwrap();

    h.calendar.add_holiday(Some(TENANT), day, "");
    let records = h.attendance.recompute_date(TENANT, day).await.unwrap();

    assert_eq!(records.len(), 2);
    for record in records {
        assert_eq!(record.status, AttendanceStatus::Absent);
        assert!(!record.is_working_day);
        assert!(record.check_in.is_none());
        assert_eq!(record.notes.as_deref(), Some("Official Holiday"));
    }
}

#[tokio::test]
async fn test_mission_leave_counts_as_worked_day() {
    let h = Harness::new();
    let records = h
        .attendance
        .create_from_leave(
            TENANT,
            &leave(7, LeaveType::Mission, date(2026, 1, 4), date(2026, 1, 5)),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.status, AttendanceStatus::Mission);
        assert!(record.is_working_day);
        assert_eq!(record.hours.actual, 8.0);
        assert_eq!(record.hours.expected, 8.0);
        assert!(record.auto_generated);
    }
}

#[tokio::test]
async fn test_leave_generation_is_idempotent() {
    let h = Harness::new();
    // Thursday to Saturday: two weekend days inside the range
    let sick = leave(8, LeaveType::Sick, date(2026, 1, 1), date(2026, 1, 3));

    h.attendance.create_from_leave(TENANT, &sick).await.unwrap();
    let second = h.attendance.create_from_leave(TENANT, &sick).await.unwrap();

    assert_eq!(second.len(), 3);
    assert_eq!(h.records.len(), 3);
    assert_eq!(second[0].status, AttendanceStatus::SickLeave);
    // the calendar still wins on weekend days
    assert_eq!(second[1].status, AttendanceStatus::Absent);
    assert!(!second[2].is_working_day);
}

#[tokio::test]
async fn test_leave_over_existing_check_in() {
    let h = Harness::new();
    let day = date(2026, 1, 4);
    h.attendance
        .record_check_in(TENANT, punch(1000, utc(2026, 1, 4, 9, 0), day))
        .await
        .unwrap();

    let records = h
        .attendance
        .create_from_leave(TENANT, &leave(9, LeaveType::Annual, day, day))
        .await
        .unwrap();

    assert_eq!(records[0].status, AttendanceStatus::Vacation);
    assert!(!records[0].auto_generated);
    assert_eq!(h.records.len(), 1);
}

#[tokio::test]
async fn test_reversed_leave_range() {
    let h = Harness::new();
    let result = h
        .attendance
        .create_from_leave(
            TENANT,
            &leave(10, LeaveType::Annual, date(2026, 1, 6), date(2026, 1, 4)),
        )
        .await;

    assert!(matches!(result, Err(AttendanceError::InvalidLeaveRange { .. })));
    assert_eq!(h.records.len(), 0);
}

#[tokio::test]
async fn test_check_out_before_check_in_is_clamped() {
    let h = Harness::new();
    let day = date(2026, 1, 4);

    h.attendance
        .record_check_in(TENANT, punch(1000, utc(2026, 1, 4, 10, 0), day))
        .await
        .unwrap();
    let record = h
        .attendance
        .record_check_out(TENANT, punch(1000, utc(2026, 1, 4, 8, 0), day))
        .await
        .unwrap();

    assert_eq!(record.hours.actual, 0.0);
    assert_eq!(record.hours.total, 0.0);
}

#[tokio::test]
async fn test_manual_check_out_needs_check_in() {
    let h = Harness::new();
    let day = date(2026, 1, 4);

    let result = h
        .attendance
        .record_check_out(TENANT, punch(1000, utc(2026, 1, 4, 17, 0), day))
        .await;

    assert!(matches!(
        result,
        Err(AttendanceError::RecordNotFound { employee_id: 1000, .. })
    ));
    assert_eq!(h.records.len(), 0);
}

#[tokio::test]
async fn test_lateness_is_judged_in_tenant_time() {
    let h = Harness::with_policy(policy(chrono_tz::Asia::Dhaka));
    let day = date(2026, 1, 4);

    // 03:20 UTC is 09:20 at +06:00
    let record = h
        .attendance
        .record_check_in(TENANT, punch(1000, utc(2026, 1, 4, 3, 20), day))
        .await
        .unwrap();

    let check_in = record.check_in.unwrap();
    assert!(check_in.is_late);
    assert_eq!(check_in.late_minutes, 20);
}

#[tokio::test]
async fn test_blank_tenant() {
    let h = Harness::new();
    let result = h
        .attendance
        .record_check_in("", punch(1000, utc(2026, 1, 4, 9, 0), date(2026, 1, 4)))
        .await;

    assert!(matches!(result, Err(AttendanceError::TenantRequired)));
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let h = Harness::new();
    let day = date(2026, 1, 4);

    // employee 2000 belongs to the other tenant
    let result = h
        .attendance
        .record_check_in(TENANT, punch(2000, utc(2026, 1, 4, 9, 0), day))
        .await;
    assert!(matches!(result, Err(AttendanceError::EmployeeNotFound(2000))));

    h.attendance
        .record_check_in(OTHER_TENANT, punch(2000, utc(2026, 1, 4, 9, 0), day))
        .await
        .unwrap();
    let mine = h
        .attendance
        .get_records_for_range(TENANT, RecordScope::Tenant, day, day)
        .await
        .unwrap();
    assert!(mine.is_empty());
}

#[tokio::test]
async fn test_approval_clears_needs_approval() {
    let h = Harness::new();
    let day = date(2026, 1, 4);

    let record = h
        .attendance
        .record_check_in(TENANT, punch(1000, utc(2026, 1, 4, 9, 0), day))
        .await
        .unwrap();
    assert_eq!(record.status, AttendanceStatus::ForgotCheckOut);
    assert!(record.flags.needs_approval);

    let record = h
        .attendance
        .approve_record(TENANT, 1000, day, 1)
        .await
        .unwrap();
    assert_eq!(record.status, AttendanceStatus::ForgotCheckOut);
    assert!(!record.flags.needs_approval);
    assert_eq!(record.approved_by, Some(1));
}

#[tokio::test]
async fn test_work_from_home_and_day_off() {
    let h = Harness::new();
    let monday = date(2026, 1, 5);

    let record = h
        .attendance
        .declare_work_from_home(TENANT, 1000, monday, true)
        .await
        .unwrap();
    assert_eq!(record.status, AttendanceStatus::WorkFromHome);

    let record = h
        .attendance
        .mark_day_off(TENANT, 1001, monday, Some("Compensatory".to_string()))
        .await
        .unwrap();
    assert_eq!(record.status, AttendanceStatus::Weekend);
    assert!(!record.is_working_day);
}

#[tokio::test]
async fn test_concurrent_check_in_and_check_out() {
    let h = Harness::new();
    let day = date(2026, 1, 4);
    h.attendance
        .record_check_in(TENANT, punch(1000, utc(2026, 1, 4, 9, 0), day))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.attendance
            .record_check_in(TENANT, punch(1000, utc(2026, 1, 4, 8, 55), day)),
        h.attendance
            .record_check_out(TENANT, punch(1000, utc(2026, 1, 4, 17, 0), day)),
    );
    a.unwrap();
    b.unwrap();

    let record = h
        .attendance
        .get_record(TENANT, 1000, day)
        .await
        .unwrap()
        .unwrap();
    assert!(record.check_in.is_some());
    assert!(record.check_out.is_some());
    assert_eq!(record.status, AttendanceStatus::OnTime);
}

#[tokio::test]
async fn test_metrics_over_a_week() {
    let h = Harness::new();

    // Sunday: on time, Monday: late, Tuesday: forgot check-out
    for (d, in_h, in_m) in [(4, 9, 0), (5, 9, 30), (6, 9, 0)] {
        h.attendance
            .record_check_in(TENANT, punch(1000, utc(2026, 1, d, in_h, in_m), date(2026, 1, d)))
            .await
            .unwrap();
    }
    for d in [4, 5] {
        h.attendance
            .record_check_out(TENANT, punch(1000, utc(2026, 1, d, 18, 0), date(2026, 1, d)))
            .await
            .unwrap();
    }
    h.attendance
        .create_from_leave(
            TENANT,
            &leave(11, LeaveType::Sick, date(2026, 1, 7), date(2026, 1, 7)),
        )
        .await
        .unwrap();

    let metrics = h
        .attendance
        .compute_metrics(TENANT, 1000, date(2026, 1, 4), date(2026, 1, 10))
        .await
        .unwrap();

    assert_eq!(metrics.recorded_days, 4);
    assert_eq!(metrics.present_days, 2);
    assert_eq!(metrics.absent_days, 1);
    assert_eq!(metrics.late_days, 1);
    assert_eq!(metrics.leave_days, 1);
    assert_eq!(metrics.status_counts[&AttendanceStatus::OnTime], 1);
    assert_eq!(metrics.actual_hours, 17.5);
    assert_eq!(metrics.overtime_hours, 1.5);
}
