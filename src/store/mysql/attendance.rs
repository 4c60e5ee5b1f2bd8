use std::future::Future;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{debug, warn};

use crate::error::{AttendanceError, AttendanceResult};
use crate::model::attendance::{
    AttendanceRecord, AttendanceStatus, CheckIn, CheckMethod, CheckOut, Flags, Hours, LeaveLink,
    RecordKey, WorkLocation, WorkSchedule,
};
use crate::model::leave::LeaveType;
use crate::store::{AttendanceStore, RecordMutator, RecordScope};

/// Attempts per `modify` before a deadlock or lock wait timeout is returned
const MAX_LOCK_ATTEMPTS: u32 = 3;

const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;

const SELECT_COLUMNS: &str = r#"
    tenant_id, employee_id, work_date, department_id, position_id,
    scheduled_start, scheduled_end, expected_hours,
    check_in_time, check_in_method, check_in_location, check_in_late, check_in_late_minutes,
    check_out_time, check_out_method, check_out_location, check_out_early, check_out_early_minutes,
    hours_actual, hours_expected, hours_overtime, hours_wfh, hours_total,
    status, leave_id, leave_type, leave_approved,
    work_from_home, wfh_approved, day_off,
    flag_late, flag_early_departure, flag_missing, flag_needs_approval,
    is_working_day, auto_generated, approved_by, approved_at, notes
"#;

#[derive(Debug, sqlx::FromRow)]
struct AttendanceRow {
    tenant_id: String,
    employee_id: u64,
    work_date: NaiveDate,
    department_id: Option<u64>,
    position_id: Option<u64>,
    scheduled_start: NaiveTime,
    scheduled_end: NaiveTime,
    expected_hours: f64,
    check_in_time: Option<NaiveDateTime>,
    check_in_method: Option<String>,
    check_in_location: Option<String>,
    check_in_late: bool,
    check_in_late_minutes: i64,
    check_out_time: Option<NaiveDateTime>,
    check_out_method: Option<String>,
    check_out_location: Option<String>,
    check_out_early: bool,
    check_out_early_minutes: i64,
    hours_actual: f64,
    hours_expected: f64,
    hours_overtime: f64,
    hours_wfh: f64,
    hours_total: f64,
    status: String,
    leave_id: Option<u64>,
    leave_type: Option<String>,
    leave_approved: bool,
    work_from_home: bool,
    wfh_approved: bool,
    day_off: bool,
    flag_late: bool,
    flag_early_departure: bool,
    flag_missing: bool,
    flag_needs_approval: bool,
    is_working_day: bool,
    auto_generated: bool,
    approved_by: Option<u64>,
    approved_at: Option<NaiveDateTime>,
    notes: Option<String>,
}

fn parse_enum<T: FromStr>(column: &str, value: &str) -> anyhow::Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("unexpected {} value: {}", column, value))
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = anyhow::Error;

    fn try_from(row: AttendanceRow) -> anyhow::Result<Self> {
        let check_in = match (row.check_in_time, row.check_in_method, row.check_in_location) {
            (Some(time), Some(method), Some(location)) => Some(CheckIn {
                time: time.and_utc(),
                method: parse_enum::<CheckMethod>("check_in_method", &method)?,
                location: parse_enum::<WorkLocation>("check_in_location", &location)?,
                is_late: row.check_in_late,
                late_minutes: row.check_in_late_minutes,
            }),
            _ => None,
        };

        let check_out = match (row.check_out_time, row.check_out_method, row.check_out_location)
        {
            (Some(time), Some(method), Some(location)) => Some(CheckOut {
                time: time.and_utc(),
                method: parse_enum::<CheckMethod>("check_out_method", &method)?,
                location: parse_enum::<WorkLocation>("check_out_location", &location)?,
                is_early: row.check_out_early,
                early_minutes: row.check_out_early_minutes,
            }),
            _ => None,
        };

        let leave = match (row.leave_id, row.leave_type) {
            (Some(leave_id), Some(leave_type)) => Some(LeaveLink {
                leave_id,
                leave_type: parse_enum::<LeaveType>("leave_type", &leave_type)?,
                approved: row.leave_approved,
            }),
            _ => None,
        };

        Ok(AttendanceRecord {
            tenant_id: row.tenant_id,
            employee_id: row.employee_id,
            department_id: row.department_id,
            position_id: row.position_id,
            date: row.work_date,
            schedule: WorkSchedule {
                start: row.scheduled_start,
                end: row.scheduled_end,
                expected_hours: row.expected_hours,
            },
            check_in,
            check_out,
            hours: Hours {
                actual: row.hours_actual,
                expected: row.hours_expected,
                overtime: row.hours_overtime,
                work_from_home: row.hours_wfh,
                total: row.hours_total,
            },
            status: parse_enum::<AttendanceStatus>("status", &row.status)?,
            leave,
            work_from_home: row.work_from_home,
            wfh_approved: row.wfh_approved,
            day_off: row.day_off,
            flags: Flags {
                is_late: row.flag_late,
                is_early_departure: row.flag_early_departure,
                is_missing: row.flag_missing,
                needs_approval: row.flag_needs_approval,
            },
            is_working_day: row.is_working_day,
            auto_generated: row.auto_generated,
            approved_by: row.approved_by,
            approved_at: row.approved_at.map(|t| t.and_utc()),
            notes: row.notes,
        })
    }
}

/// Deadlock or lock wait timeout reported by MySQL. Two first writes for the
/// same key both take a gap lock on the missing row and one of them loses.
fn is_lock_conflict(error: &anyhow::Error) -> bool {
    match error.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) => db
            .try_downcast_ref::<MySqlDatabaseError>()
            .is_some_and(|e| matches!(e.number(), ER_LOCK_DEADLOCK | ER_LOCK_WAIT_TIMEOUT)),
        _ => false,
    }
}

/// Run `op` again while it fails with a store error `is_conflict` accepts,
/// up to `MAX_LOCK_ATTEMPTS` runs in total
async fn retry_lock_conflicts<T, F, Fut>(
    mut op: F,
    is_conflict: impl Fn(&anyhow::Error) -> bool,
) -> AttendanceResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttendanceResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Err(AttendanceError::Store(e)) if attempt < MAX_LOCK_ATTEMPTS && is_conflict(&e) => {
                warn!(attempt, error = %e, "Attendance write lost a lock conflict, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

pub struct MySqlAttendanceStore {
    pool: MySqlPool,
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn lock_row(
        tx: &mut Transaction<'_, MySql>,
        key: &RecordKey,
    ) -> anyhow::Result<Option<AttendanceRecord>> {
        let sql = format!(
            "SELECT {} FROM attendance_records WHERE tenant_id = ? AND employee_id = ? AND work_date = ? FOR UPDATE",
            SELECT_COLUMNS
        );

        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(&key.tenant_id)
            .bind(key.employee_id)
            .bind(key.date)
            .fetch_optional(&mut **tx)
            .await
            .context("failed to lock attendance record")?;

        row.map(AttendanceRecord::try_from).transpose()
    }

    async fn upsert(
        tx: &mut Transaction<'_, MySql>,
        record: &AttendanceRecord,
    ) -> anyhow::Result<()> {
        let check_in = record.check_in.as_ref();
        let check_out = record.check_out.as_ref();
        let leave = record.leave.as_ref();

        sqlx::query(
            r#"
            INSERT INTO attendance_records (
                tenant_id, employee_id, work_date, department_id, position_id,
                scheduled_start, scheduled_end, expected_hours,
                check_in_time, check_in_method, check_in_location, check_in_late, check_in_late_minutes,
                check_out_time, check_out_method, check_out_location, check_out_early, check_out_early_minutes,
                hours_actual, hours_expected, hours_overtime, hours_wfh, hours_total,
                status, leave_id, leave_type, leave_approved,
                work_from_home, wfh_approved, day_off,
                flag_late, flag_early_departure, flag_missing, flag_needs_approval,
                is_working_day, auto_generated, approved_by, approved_at, notes
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                department_id = VALUES(department_id),
                position_id = VALUES(position_id),
                scheduled_start = VALUES(scheduled_start),
                scheduled_end = VALUES(scheduled_end),
                expected_hours = VALUES(expected_hours),
                check_in_time = VALUES(check_in_time),
                check_in_method = VALUES(check_in_method),
                check_in_location = VALUES(check_in_location),
                check_in_late = VALUES(check_in_late),
                check_in_late_minutes = VALUES(check_in_late_minutes),
                check_out_time = VALUES(check_out_time),
                check_out_method = VALUES(check_out_method),
                check_out_location = VALUES(check_out_location),
                check_out_early = VALUES(check_out_early),
                check_out_early_minutes = VALUES(check_out_early_minutes),
                hours_actual = VALUES(hours_actual),
                hours_expected = VALUES(hours_expected),
                hours_overtime = VALUES(hours_overtime),
                hours_wfh = VALUES(hours_wfh),
                hours_total = VALUES(hours_total),
                status = VALUES(status),
                leave_id = VALUES(leave_id),
                leave_type = VALUES(leave_type),
                leave_approved = VALUES(leave_approved),
                work_from_home = VALUES(work_from_home),
                wfh_approved = VALUES(wfh_approved),
                day_off = VALUES(day_off),
                flag_late = VALUES(flag_late),
                flag_early_departure = VALUES(flag_early_departure),
                flag_missing = VALUES(flag_missing),
                flag_needs_approval = VALUES(flag_needs_approval),
                is_working_day = VALUES(is_working_day),
                auto_generated = VALUES(auto_generated),
                approved_by = VALUES(approved_by),
                approved_at = VALUES(approved_at),
                notes = VALUES(notes),
                updated_at = CURRENT_TIMESTAMP(3)
            "#,
        )
        .bind(&record.tenant_id)
        .bind(record.employee_id)
        .bind(record.date)
        .bind(record.department_id)
        .bind(record.position_id)
        .bind(record.schedule.start)
        .bind(record.schedule.end)
        .bind(record.schedule.expected_hours)
        .bind(check_in.map(|c| c.time.naive_utc()))
        .bind(check_in.map(|c| c.method.to_string()))
        .bind(check_in.map(|c| c.location.to_string()))
        .bind(check_in.is_some_and(|c| c.is_late))
        .bind(check_in.map_or(0, |c| c.late_minutes))
        .bind(check_out.map(|c| c.time.naive_utc()))
        .bind(check_out.map(|c| c.method.to_string()))
        .bind(check_out.map(|c| c.location.to_string()))
        .bind(check_out.is_some_and(|c| c.is_early))
        .bind(check_out.map_or(0, |c| c.early_minutes))
        .bind(record.hours.actual)
        .bind(record.hours.expected)
        .bind(record.hours.overtime)
        .bind(record.hours.work_from_home)
        .bind(record.hours.total)
        .bind(record.status.as_ref())
        .bind(leave.map(|l| l.leave_id))
        .bind(leave.map(|l| l.leave_type.to_string()))
        .bind(leave.is_some_and(|l| l.approved))
        .bind(record.work_from_home)
        .bind(record.wfh_approved)
        .bind(record.day_off)
        .bind(record.flags.is_late)
        .bind(record.flags.is_early_departure)
        .bind(record.flags.is_missing)
        .bind(record.flags.needs_approval)
        .bind(record.is_working_day)
        .bind(record.auto_generated)
        .bind(record.approved_by)
        .bind(record.approved_at.map(|t| t.naive_utc()))
        .bind(&record.notes)
        .execute(&mut **tx)
        .await
        .context("failed to upsert attendance record")?;

        Ok(())
    }

    async fn modify_once(
        &self,
        key: &RecordKey,
        mutator: &RecordMutator,
    ) -> AttendanceResult<AttendanceRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open attendance transaction")?;

        let existing = Self::lock_row(&mut tx, key).await?;
        // an Err from the mutator drops the transaction, which rolls it back
        let record = mutator(existing)?;
        Self::upsert(&mut tx, &record).await?;

        tx.commit()
            .await
            .context("failed to commit attendance record")?;

        Ok(record)
    }
}

#[async_trait]
impl AttendanceStore for MySqlAttendanceStore {
    async fn find(&self, key: &RecordKey) -> AttendanceResult<Option<AttendanceRecord>> {
        let sql = format!(
            "SELECT {} FROM attendance_records WHERE tenant_id = ? AND employee_id = ? AND work_date = ?",
            SELECT_COLUMNS
        );

        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(&key.tenant_id)
            .bind(key.employee_id)
            .bind(key.date)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch attendance record")?;

        Ok(row.map(AttendanceRecord::try_from).transpose()?)
    }

    async fn modify(
        &self,
        key: &RecordKey,
        mutator: RecordMutator,
    ) -> AttendanceResult<AttendanceRecord> {
        let mutator = &mutator;
        let record =
            retry_lock_conflicts(move |_| self.modify_once(key, mutator), is_lock_conflict).await?;

        debug!(
            tenant_id = %key.tenant_id,
            employee_id = key.employee_id,
            date = %key.date,
            status = %record.status,
            "Attendance record persisted"
        );

        Ok(record)
    }

    async fn range(
        &self,
        tenant_id: &str,
        scope: RecordScope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AttendanceResult<Vec<AttendanceRecord>> {
        let (scope_sql, scope_id) = match scope {
            RecordScope::Employee(id) => (" AND employee_id = ?", Some(id)),
            RecordScope::Department(id) => (" AND department_id = ?", Some(id)),
            RecordScope::Tenant => ("", None),
        };

        let sql = format!(
            "SELECT {} FROM attendance_records WHERE tenant_id = ? AND work_date BETWEEN ? AND ?{} ORDER BY work_date, employee_id",
            SELECT_COLUMNS, scope_sql
        );

        let mut query = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(tenant_id)
            .bind(start)
            .bind(end);
        if let Some(id) = scope_id {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch attendance range")?;

        let records = rows
            .into_iter()
            .map(AttendanceRecord::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(records)
    }
}
