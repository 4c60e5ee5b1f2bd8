use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use crate::calendar::CalendarOracle;
use crate::error::{AttendanceError, AttendanceResult};
use crate::model::attendance::{
    AttendanceMetrics, AttendanceRecord, CheckIn, CheckMethod, CheckOut, LeaveLink, RecordKey,
    WorkLocation,
};
use crate::model::employee::EmployeeProfile;
use crate::model::leave::Leave;
use crate::policy::{AttendancePolicy, AttendancePolicyBook};
use crate::status_engine::{derive_status, round2};
use crate::store::{AttendanceStore, RecordScope};
use crate::utils::employee_cache::EmployeeResolver;

/// Check-in or check-out at a known instant
#[derive(Debug, Clone)]
pub struct PunchInput {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub time: DateTime<Utc>,
    pub method: CheckMethod,
    pub location: WorkLocation,
}

/// What a check-out does when the day has no check-in yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingCheckIn {
    /// Manual path: reject with `RecordNotFound`
    Reject,
    /// Device path: logs may arrive out of order, keep the check-out alone
    Accept,
}

pub(crate) fn require_tenant(tenant_id: &str) -> AttendanceResult<&str> {
    let tenant_id = tenant_id.trim();
    if tenant_id.is_empty() {
        return Err(AttendanceError::TenantRequired);
    }
    Ok(tenant_id)
}

/// Sole owner of attendance record mutation.
/// Every write re-runs the status engine inside the store's atomic modify.
pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
    employees: Arc<EmployeeResolver>,
    calendar: Arc<dyn CalendarOracle>,
    policies: Arc<AttendancePolicyBook>,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        employees: Arc<EmployeeResolver>,
        calendar: Arc<dyn CalendarOracle>,
        policies: Arc<AttendancePolicyBook>,
    ) -> Self {
        Self {
            store,
            employees,
            calendar,
            policies,
        }
    }

    pub fn policy(&self, tenant_id: &str) -> &AttendancePolicy {
        self.policies.for_tenant(tenant_id)
    }

    async fn profile(&self, tenant_id: &str, employee_id: u64) -> AttendanceResult<EmployeeProfile> {
        self.employees
            .resolve_id(tenant_id, employee_id)
            .await?
            .ok_or(AttendanceError::EmployeeNotFound(employee_id))
    }

    /// Empty record seeded from the employee's schedule and master data
    fn seed(
        tenant_id: &str,
        profile: &EmployeeProfile,
        date: NaiveDate,
        policy: &AttendancePolicy,
    ) -> AttendanceRecord {
        let mut record = AttendanceRecord::new(
            RecordKey {
                tenant_id: tenant_id.to_string(),
                employee_id: profile.employee_id,
                date,
            },
            profile.schedule_or(policy.default_schedule),
        );
        record.department_id = profile.department_id;
        record.position_id = profile.position_id;
        record
    }

    #[instrument(skip(self, input), fields(employee_id = input.employee_id, date = %input.date))]
    pub async fn record_check_in(
        &self,
        tenant_id: &str,
        input: PunchInput,
    ) -> AttendanceResult<AttendanceRecord> {
        let tenant_id = require_tenant(tenant_id)?;
        let profile = self.profile(tenant_id, input.employee_id).await?;
        let policy = self.policy(tenant_id).clone();
        let day = self.calendar.day(tenant_id, input.date);
        let seed = Self::seed(tenant_id, &profile, input.date, &policy);
        let key = seed.key();
        let check_in = CheckIn::new(input.time, input.method, input.location);

        let record = self
            .store
            .modify(
                &key,
                Box::new(move |existing| {
                    let mut record = existing.unwrap_or_else(|| seed.clone());
                    // last write wins
                    record.check_in = Some(check_in.clone());
                    Ok(derive_status(record, &day, &policy))
                }),
            )
            .await?;

        if record.check_in.is_none() {
            debug!(status = %record.status, "Check-in discarded on a non-working day");
        }
        info!(status = %record.status, "Check-in recorded");
        Ok(record)
    }

    /// Manual check-out; requires a check-in on the same day
    pub async fn record_check_out(
        &self,
        tenant_id: &str,
        input: PunchInput,
    ) -> AttendanceResult<AttendanceRecord> {
        self.check_out(tenant_id, input, MissingCheckIn::Reject)
            .await
    }

    /// Device check-out; an out-of-order log may precede its check-in
    pub async fn record_device_check_out(
        &self,
        tenant_id: &str,
        input: PunchInput,
    ) -> AttendanceResult<AttendanceRecord> {
        self.check_out(tenant_id, input, MissingCheckIn::Accept)
            .await
    }

    #[instrument(skip(self, input), fields(employee_id = input.employee_id, date = %input.date))]
    async fn check_out(
        &self,
        tenant_id: &str,
        input: PunchInput,
        missing_check_in: MissingCheckIn,
    ) -> AttendanceResult<AttendanceRecord> {
        let tenant_id = require_tenant(tenant_id)?;
        let profile = self.profile(tenant_id, input.employee_id).await?;
        let policy = self.policy(tenant_id).clone();
        let day = self.calendar.day(tenant_id, input.date);
        let seed = Self::seed(tenant_id, &profile, input.date, &policy);
        let key = seed.key();
        let check_out = CheckOut::new(input.time, input.method, input.location);
        let (employee_id, date) = (input.employee_id, input.date);

        let record = self
            .store
            .modify(
                &key,
                Box::new(move |existing| {
                    let mut record = match (existing, missing_check_in) {
                        (Some(record), _) if record.check_in.is_some() => record,
                        (existing, MissingCheckIn::Accept) => {
                            existing.unwrap_or_else(|| seed.clone())
                        }
                        (_, MissingCheckIn::Reject) => {
                            return Err(AttendanceError::RecordNotFound { employee_id, date });
                        }
                    };
                    record.check_out = Some(check_out.clone());
                    Ok(derive_status(record, &day, &policy))
                }),
            )
            .await?;

        info!(status = %record.status, "Check-out recorded");
        Ok(record)
    }

    /// Link an approved leave to every day it covers. Safe to repeat: records
    /// are upserted by key, never duplicated.
    #[instrument(skip(self, leave), fields(leave_id = leave.id, employee_id = leave.employee_id))]
    pub async fn create_from_leave(
        &self,
        tenant_id: &str,
        leave: &Leave,
    ) -> AttendanceResult<Vec<AttendanceRecord>> {
        let tenant_id = require_tenant(tenant_id)?;
        if leave.end_date < leave.start_date {
            return Err(AttendanceError::InvalidLeaveRange {
                start: leave.start_date,
                end: leave.end_date,
            });
        }
        if !leave.is_approved() {
            return Err(AttendanceError::LeaveNotApproved(leave.id));
        }

        let profile = self.profile(tenant_id, leave.employee_id).await?;
        let policy = self.policy(tenant_id).clone();
        let link = LeaveLink {
            leave_id: leave.id,
            leave_type: leave.leave_type,
            approved: true,
        };

        let mut records = Vec::new();
        for date in leave.days() {
            let day = self.calendar.day(tenant_id, date);
            let mut seed = Self::seed(tenant_id, &profile, date, &policy);
            seed.auto_generated = true;
            let key = seed.key();
            let link = link.clone();
            let policy = policy.clone();
            let (department_id, position_id) = (leave.department_id, leave.position_id);

            let record = self
                .store
                .modify(
                    &key,
                    Box::new(move |existing| {
                        let mut record = existing.unwrap_or_else(|| seed.clone());
                        record.leave = Some(link.clone());
                        record.department_id = department_id.or(record.department_id);
                        record.position_id = position_id.or(record.position_id);
                        Ok(derive_status(record, &day, &policy))
                    }),
                )
                .await?;
            records.push(record);
        }

        info!(days = records.len(), "Attendance generated from leave");
        Ok(records)
    }

    pub async fn get_records_for_range(
        &self,
        tenant_id: &str,
        scope: RecordScope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AttendanceResult<Vec<AttendanceRecord>> {
        let tenant_id = require_tenant(tenant_id)?;
        if end < start {
            return Err(AttendanceError::InvalidDateRange { start, end });
        }

        self.store.range(tenant_id, scope, start, end).await
    }

    pub async fn get_record(
        &self,
        tenant_id: &str,
        employee_id: u64,
        date: NaiveDate,
    ) -> AttendanceResult<Option<AttendanceRecord>> {
        let tenant_id = require_tenant(tenant_id)?;
        self.store
            .find(&RecordKey {
                tenant_id: tenant_id.to_string(),
                employee_id,
                date,
            })
            .await
    }

    pub async fn compute_metrics(
        &self,
        tenant_id: &str,
        employee_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AttendanceResult<AttendanceMetrics> {
        let records = self
            .get_records_for_range(tenant_id, RecordScope::Employee(employee_id), start, end)
            .await?;

        Ok(summarize(employee_id, start, end, &records))
    }

    /// Approve a record that needed attention (missing punches)
    #[instrument(skip(self))]
    pub async fn approve_record(
        &self,
        tenant_id: &str,
        employee_id: u64,
        date: NaiveDate,
        approver_id: u64,
    ) -> AttendanceResult<AttendanceRecord> {
        let tenant_id = require_tenant(tenant_id)?;
        let policy = self.policy(tenant_id).clone();
        let day = self.calendar.day(tenant_id, date);
        let key = RecordKey {
            tenant_id: tenant_id.to_string(),
            employee_id,
            date,
        };
        let approved_at = Utc::now();

        self.store
            .modify(
                &key,
                Box::new(move |existing| {
                    let mut record =
                        existing.ok_or(AttendanceError::RecordNotFound { employee_id, date })?;
                    record.approved_by = Some(approver_id);
                    record.approved_at = Some(approved_at);
                    Ok(derive_status(record, &day, &policy))
                }),
            )
            .await
    }

    /// Declare (and optionally approve) work from home for a day
    #[instrument(skip(self))]
    pub async fn declare_work_from_home(
        &self,
        tenant_id: &str,
        employee_id: u64,
        date: NaiveDate,
        approved: bool,
    ) -> AttendanceResult<AttendanceRecord> {
        self.upsert_with(tenant_id, employee_id, date, move |record| {
            record.work_from_home = true;
            record.wfh_approved = approved;
        })
        .await
    }

    /// Mark a single employee-day as non-working (compensatory day off etc.)
    #[instrument(skip(self, note))]
    pub async fn mark_day_off(
        &self,
        tenant_id: &str,
        employee_id: u64,
        date: NaiveDate,
        note: Option<String>,
    ) -> AttendanceResult<AttendanceRecord> {
        self.upsert_with(tenant_id, employee_id, date, move |record| {
            record.day_off = true;
            if note.is_some() {
                record.notes = note.clone();
            }
        })
        .await
    }

    async fn upsert_with<F>(
        &self,
        tenant_id: &str,
        employee_id: u64,
        date: NaiveDate,
        change: F,
    ) -> AttendanceResult<AttendanceRecord>
    where
        F: Fn(&mut AttendanceRecord) + Send + Sync + 'static,
    {
        let tenant_id = require_tenant(tenant_id)?;
        let profile = self.profile(tenant_id, employee_id).await?;
        let policy = self.policy(tenant_id).clone();
        let day = self.calendar.day(tenant_id, date);
        let seed = Self::seed(tenant_id, &profile, date, &policy);
        let key = seed.key();

        self.store
            .modify(
                &key,
                Box::new(move |existing| {
                    let mut record = existing.unwrap_or_else(|| seed.clone());
                    change(&mut record);
                    Ok(derive_status(record, &day, &policy))
                }),
            )
            .await
    }

    /// Re-derive every record of the tenant on `date` against the current
    /// calendar, e.g. after a holiday is declared
    #[instrument(skip(self))]
    pub async fn recompute_date(
        &self,
        tenant_id: &str,
        date: NaiveDate,
    ) -> AttendanceResult<Vec<AttendanceRecord>> {
        let tenant_id = require_tenant(tenant_id)?;
        let policy = self.policy(tenant_id).clone();
        let day = self.calendar.day(tenant_id, date);
        let existing = self
            .store
            .range(tenant_id, RecordScope::Tenant, date, date)
            .await?;

        let mut records = Vec::with_capacity(existing.len());
        for record in existing {
            let day = day.clone();
            let policy = policy.clone();
            let record = self
                .store
                .modify(
                    &record.key(),
                    Box::new(move |current| {
                        let record = current.unwrap_or_else(|| record.clone());
                        Ok(derive_status(record, &day, &policy))
                    }),
                )
                .await?;
            records.push(record);
        }

        info!(count = records.len(), "Attendance recomputed for date");
        Ok(records)
    }
}

fn summarize(
    employee_id: u64,
    start: NaiveDate,
    end: NaiveDate,
    records: &[AttendanceRecord],
) -> AttendanceMetrics {
    let mut metrics = AttendanceMetrics {
        employee_id,
        start,
        end,
        recorded_days: 0,
        working_days: 0,
        present_days: 0,
        absent_days: 0,
        late_days: 0,
        early_departure_days: 0,
        leave_days: 0,
        non_working_days: 0,
        status_counts: BTreeMap::new(),
        actual_hours: 0.0,
        expected_hours: 0.0,
        overtime_hours: 0.0,
        work_from_home_hours: 0.0,
        total_hours: 0.0,
        attendance_rate: 0.0,
    };

    for record in records {
        metrics.recorded_days += 1;
        *metrics.status_counts.entry(record.status).or_insert(0) += 1;

        if record.is_working_day {
            metrics.working_days += 1;
            metrics.expected_hours += record.hours.expected;
        } else {
            metrics.non_working_days += 1;
        }
        if record.status.is_present() {
            metrics.present_days += 1;
        }
        if record.is_working_day && record.status.is_absence() {
            metrics.absent_days += 1;
        }
        if record.leave.as_ref().is_some_and(|l| l.approved) && record.is_working_day {
            metrics.leave_days += 1;
        }
        if record.flags.is_late {
            metrics.late_days += 1;
        }
        if record.flags.is_early_departure {
            metrics.early_departure_days += 1;
        }

        metrics.actual_hours += record.hours.actual;
        metrics.overtime_hours += record.hours.overtime;
        metrics.work_from_home_hours += record.hours.work_from_home;
        metrics.total_hours += record.hours.total;
    }

    metrics.actual_hours = round2(metrics.actual_hours);
    metrics.expected_hours = round2(metrics.expected_hours);
    metrics.overtime_hours = round2(metrics.overtime_hours);
    metrics.work_from_home_hours = round2(metrics.work_from_home_hours);
    metrics.total_hours = round2(metrics.total_hours);

    let attended = metrics.present_days + metrics.absent_days;
    if attended > 0 {
        metrics.attendance_rate =
            (f64::from(metrics.present_days) / f64::from(attended) * 10_000.0).round() / 100.0;
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::HolidayCalendar;
    use crate::model::attendance::{AttendanceStatus, WorkSchedule};
    use crate::model::leave::{LeaveStatus, LeaveType};
    use crate::store::{MockAttendanceStore, MockEmployeeDirectory};
    use chrono::{NaiveTime, TimeZone, Weekday};
    use std::time::Duration;

    fn policy() -> AttendancePolicy {
        AttendancePolicy {
            tolerance_minutes: 0,
            timezone: chrono_tz::UTC,
            default_schedule: WorkSchedule::new(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            ),
        }
    }

    fn profile() -> EmployeeProfile {
        EmployeeProfile {
            employee_id: 1000,
            employee_code: "EMP-001".to_string(),
            department_id: Some(10),
            position_id: Some(3),
            shift_start: None,
            shift_end: None,
        }
    }

    fn service(store: MockAttendanceStore) -> AttendanceService {
        let mut mock_directory = MockEmployeeDirectory::new();
        mock_directory
            .expect_find_by_id()
            .returning(|_, id| Ok((id == 1000).then(profile)));

        AttendanceService::new(
            Arc::new(store),
            Arc::new(EmployeeResolver::new(
                Arc::new(mock_directory),
                Duration::from_secs(60),
            )),
            Arc::new(HolidayCalendar::new(vec![Weekday::Fri, Weekday::Sat])),
            Arc::new(AttendancePolicyBook::new(policy())),
        )
    }

    fn sunday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 4).unwrap()
    }

    fn punch(h: u32, m: u32) -> PunchInput {
        PunchInput {
            employee_id: 1000,
            date: sunday(),
            time: Utc.with_ymd_and_hms(2026, 1, 4, h, m, 0).unwrap(),
            method: CheckMethod::Manual,
            location: WorkLocation::Office,
        }
    }

    #[tokio::test]
    async fn test_blank_tenant_is_rejected() {
        let service = service(MockAttendanceStore::new());

        let result = service.record_check_in("  ", punch(9, 0)).await;
        assert!(matches!(result, Err(AttendanceError::TenantRequired)));

        let result = service
            .get_records_for_range("", RecordScope::Tenant, sunday(), sunday())
            .await;
        assert!(matches!(result, Err(AttendanceError::TenantRequired)));
    }

    #[tokio::test]
    async fn test_check_in_creates_seeded_record() {
        let mut mock_store = MockAttendanceStore::new();
        mock_store
            .expect_modify()
            .withf(|key: &RecordKey, _| key.tenant_id == "acme" && key.employee_id == 1000)
            .times(1)
            .returning(|_, mutator| mutator(None));

        let record = service(mock_store)
            .record_check_in("acme", punch(9, 20))
            .await
            .unwrap();

        assert_eq!(record.department_id, Some(10));
        assert_eq!(record.status, AttendanceStatus::ForgotCheckOut);
        assert_eq!(record.check_in.as_ref().unwrap().late_minutes, 20);
    }

    #[tokio::test]
    async fn test_check_in_mutator_can_be_replayed() {
        let mut mock_store = MockAttendanceStore::new();
        mock_store
            .expect_modify()
            .times(1)
            .returning(|_, mutator| {
                let first = mutator(None)?;
                let second = mutator(None)?;
                assert_eq!(first.check_in, second.check_in);
                assert_eq!(first.status, second.status);
                Ok(second)
            });

        let record = service(mock_store)
            .record_check_in("acme", punch(9, 0))
            .await
            .unwrap();

        assert!(record.check_in.is_some());
    }

    #[tokio::test]
    async fn test_manual_check_out_without_check_in() {
        let mut mock_store = MockAttendanceStore::new();
        mock_store
            .expect_modify()
            .times(1)
            .returning(|_, mutator| mutator(None));

        let result = service(mock_store)
            .record_check_out("acme", punch(17, 0))
            .await;

        assert!(matches!(
            result,
            Err(AttendanceError::RecordNotFound { employee_id: 1000, .. })
        ));
    }

    #[tokio::test]
    async fn test_device_check_out_without_check_in() {
        let mut mock_store = MockAttendanceStore::new();
        mock_store
            .expect_modify()
            .times(1)
            .returning(|_, mutator| mutator(None));

        let record = service(mock_store)
            .record_device_check_out("acme", punch(17, 0))
            .await
            .unwrap();

        assert_eq!(record.status, AttendanceStatus::ForgotCheckIn);
        assert!(record.check_out.is_some());
    }

    #[tokio::test]
    async fn test_unknown_employee() {
        let service = service(MockAttendanceStore::new());
        let mut input = punch(9, 0);
        input.employee_id = 42;

        let result = service.record_check_in("acme", input).await;
        assert!(matches!(result, Err(AttendanceError::EmployeeNotFound(42))));
    }

    #[tokio::test]
    async fn test_leave_range_validation() {
        let service = service(MockAttendanceStore::new());
        let mut leave = Leave {
            id: 5,
            employee_id: 1000,
            department_id: None,
            position_id: None,
            leave_type: LeaveType::Sick,
            start_date: sunday(),
            end_date: sunday().pred_opt().unwrap(),
            status: LeaveStatus::Approved,
        };

        let result = service.create_from_leave("acme", &leave).await;
        assert!(matches!(result, Err(AttendanceError::InvalidLeaveRange { .. })));

        leave.end_date = sunday();
        leave.status = LeaveStatus::Pending;
        let result = service.create_from_leave("acme", &leave).await;
        assert!(matches!(result, Err(AttendanceError::LeaveNotApproved(5))));
    }

    #[tokio::test]
    async fn test_approve_missing_record() {
        let mut mock_store = MockAttendanceStore::new();
        mock_store
            .expect_modify()
            .times(1)
            .returning(|_, mutator| mutator(None));

        let result = service(mock_store)
            .approve_record("acme", 1000, sunday(), 1)
            .await;
        assert!(matches!(result, Err(AttendanceError::RecordNotFound { .. })));
    }

    #[tokio::test]
    async fn test_range_rejects_reversed_dates() {
        let service = service(MockAttendanceStore::new());
        let result = service
            .compute_metrics("acme", 1000, sunday(), sunday().pred_opt().unwrap())
            .await;
        assert!(matches!(result, Err(AttendanceError::InvalidDateRange { .. })));
    }

    #[test]
    fn test_summarize_counts() {
        let key = |day: u32| RecordKey {
            tenant_id: "acme".to_string(),
            employee_id: 1000,
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
        };
        let schedule = policy().default_schedule;

        let mut on_time = AttendanceRecord::new(key(4), schedule);
        on_time.status = AttendanceStatus::OnTime;
        on_time.hours.actual = 8.0;
        on_time.hours.total = 8.0;

        let mut forgot = AttendanceRecord::new(key(5), schedule);
        forgot.status = AttendanceStatus::ForgotCheckOut;

        let mut holiday = AttendanceRecord::new(key(6), schedule);
        holiday.status = AttendanceStatus::Absent;
        holiday.is_working_day = false;
        holiday.hours = Default::default();

        let mut mission = AttendanceRecord::new(key(7), schedule);
        mission.status = AttendanceStatus::Mission;
        mission.hours.actual = 8.0;
        mission.leave = Some(LeaveLink {
            leave_id: 1,
            leave_type: LeaveType::Mission,
            approved: true,
        });

        let metrics = summarize(
            1000,
            key(4).date,
            key(7).date,
            &[on_time, forgot, holiday, mission],
        );

        assert_eq!(metrics.recorded_days, 4);
        assert_eq!(metrics.present_days, 2);
        assert_eq!(metrics.absent_days, 1);
        assert_eq!(metrics.non_working_days, 1);
        assert_eq!(metrics.leave_days, 1);
        assert_eq!(metrics.actual_hours, 16.0);
        assert_eq!(metrics.status_counts[&AttendanceStatus::Absent], 1);
        assert_eq!(metrics.attendance_rate, 66.67);
    }

    #[test]
    fn test_summarize_rounds_hour_totals() {
        let schedule = policy().default_schedule;
        let records: Vec<AttendanceRecord> = [4, 5, 6]
            .into_iter()
            .zip([5.75, 5.75, 5.75])
            .map(|(day, hours)| {
                let key = RecordKey {
                    tenant_id: "acme".to_string(),
                    employee_id: 1000,
                    date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
                };
                let mut record = AttendanceRecord::new(key, schedule);
                record.status = AttendanceStatus::OnTime;
                record.hours.actual = hours;
                record.hours.overtime = 0.1;
                record.hours.total = hours + 0.1;
                record
            })
            .collect();

        let metrics = summarize(
            1000,
            records[0].date,
            records[2].date,
            &records,
        );

        assert_eq!(metrics.actual_hours, 17.25);
        assert_eq!(metrics.overtime_hours, 0.3);
        assert_eq!(metrics.total_hours, 17.55);
    }
}
