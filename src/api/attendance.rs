use crate::auth::auth::AuthUser;
use crate::model::attendance::{AttendanceMetrics, AttendanceRecord, CheckMethod, WorkLocation};
use crate::model::device::Direction;
use crate::model::leave::Leave;
use crate::service::{AttendanceService, ImportRow, IngestionPipeline, IngestionResult, PunchInput};
use crate::store::RecordScope;
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema, Default)]
pub struct SelfPunchRequest {
    /// Where the employee works from today; defaults to office
    pub location: Option<WorkLocation>,
}

/// Self-service check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = SelfPunchRequest,
    responses(
        (status = 200, description = "Checked in", body = AttendanceRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile or tenant"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: Option<web::Json<SelfPunchRequest>>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    let location = body
        .and_then(|b| b.into_inner().location)
        .unwrap_or(WorkLocation::Office);
    let now = Utc::now();

    let record = service
        .record_check_in(
            auth.tenant(),
            PunchInput {
                employee_id,
                date: service.policy(auth.tenant()).local_date(now),
                time: now,
                method: CheckMethod::Manual,
                location,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(record))
}

/// Self-service check-out endpoint
#[utoipa::path(
    put,
    path = "/api/attendance",
    request_body = SelfPunchRequest,
    responses(
        (status = 200, description = "Checked out", body = AttendanceRecord),
        (status = 404, description = "No check-in found for today", body = Object, example = json!({
            "message": "No attendance record with a check-in for employee 1000 on 2026-01-04"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: Option<web::Json<SelfPunchRequest>>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    let location = body
        .and_then(|b| b.into_inner().location)
        .unwrap_or(WorkLocation::Office);
    let now = Utc::now();

    let record = service
        .record_check_out(
            auth.tenant(),
            PunchInput {
                employee_id,
                date: service.policy(auth.tenant()).local_date(now),
                time: now,
                method: CheckMethod::Manual,
                location,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(record))
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct RangeFilter {
    /// Filter by employee ID (employees always see only their own records)
    #[schema(example = 1000)]
    pub employee_id: Option<u64>,
    /// Filter by department ID
    pub department_id: Option<u64>,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start: NaiveDate,
    #[schema(example = "2026-01-31", format = "date", value_type = String)]
    pub end: NaiveDate,
}

fn scope_for(auth: &AuthUser, filter: &RangeFilter) -> actix_web::Result<RecordScope> {
    if !auth.role.manages_attendance() {
        let own = auth.require_employee()?;
        return match filter.employee_id {
            Some(id) if id != own => Err(actix_web::error::ErrorForbidden(
                "Employees can only view their own attendance",
            )),
            _ => Ok(RecordScope::Employee(own)),
        };
    }

    Ok(match (filter.employee_id, filter.department_id) {
        (Some(id), _) => RecordScope::Employee(id),
        (None, Some(id)) => RecordScope::Department(id),
        (None, None) => RecordScope::Tenant,
    })
}

/// List attendance records in a date range
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(RangeFilter),
    responses(
        (status = 200, description = "Records ordered by date then employee", body = [AttendanceRecord]),
        (status = 400, description = "End before start"),
        (status = 403, description = "Forbidden"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn list_records(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<RangeFilter>,
) -> actix_web::Result<impl Responder> {
    let filter = query.into_inner();
    let scope = scope_for(&auth, &filter)?;

    let records = service
        .get_records_for_range(auth.tenant(), scope, filter.start, filter.end)
        .await?;

    Ok(HttpResponse::Ok().json(records))
}

/// Attendance metrics of one employee
#[utoipa::path(
    get,
    path = "/api/attendance/metrics",
    params(RangeFilter),
    responses(
        (status = 200, description = "Aggregated figures", body = AttendanceMetrics),
        (status = 400, description = "Missing employee or end before start"),
        (status = 403, description = "Forbidden"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn metrics(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<RangeFilter>,
) -> actix_web::Result<impl Responder> {
    let filter = query.into_inner();
    let RecordScope::Employee(employee_id) = scope_for(&auth, &filter)? else {
        return Err(actix_web::error::ErrorBadRequest("employee_id is required"));
    };

    let metrics = service
        .compute_metrics(auth.tenant(), employee_id, filter.start, filter.end)
        .await?;

    Ok(HttpResponse::Ok().json(metrics))
}

#[derive(Deserialize, ToSchema)]
pub struct ManualEntryRequest {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2026-01-04", format = "date", value_type = String)]
    pub date: NaiveDate,
    /// Tenant-local time of day
    #[schema(example = "09:05:00", value_type = String)]
    pub time: NaiveTime,
    pub direction: Direction,
    pub location: Option<WorkLocation>,
}

/// HR correction: record a check-in or check-out on behalf of an employee
#[utoipa::path(
    post,
    path = "/api/attendance/manual",
    request_body = ManualEntryRequest,
    responses(
        (status = 200, description = "Record after the correction", body = AttendanceRecord),
        (status = 404, description = "Check-out without a check-in, or unknown employee"),
        (status = 403, description = "HR/Admin only"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn manual_entry(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<ManualEntryRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let req = body.into_inner();

    let input = PunchInput {
        employee_id: req.employee_id,
        date: req.date,
        time: service.policy(auth.tenant()).to_utc(req.date, req.time),
        method: CheckMethod::Manual,
        location: req.location.unwrap_or(WorkLocation::Office),
    };
    let record = match req.direction {
        Direction::CheckIn => service.record_check_in(auth.tenant(), input).await?,
        Direction::CheckOut => service.record_check_out(auth.tenant(), input).await?,
    };

    Ok(HttpResponse::Ok().json(record))
}

/// Generate attendance for every day of an approved leave
#[utoipa::path(
    post,
    path = "/api/attendance/leave",
    request_body = Leave,
    responses(
        (status = 200, description = "One record per covered day", body = [AttendanceRecord]),
        (status = 400, description = "Invalid range or leave not approved"),
        (status = 403, description = "HR/Admin only"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn from_leave(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<Leave>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let records = service.create_from_leave(auth.tenant(), &body).await?;
    Ok(HttpResponse::Ok().json(records))
}

#[derive(Deserialize, ToSchema)]
pub struct RecomputeRequest {
    #[schema(example = "2026-02-21", format = "date", value_type = String)]
    pub date: NaiveDate,
}

/// Re-derive all records of a date, e.g. after a holiday was declared
#[utoipa::path(
    post,
    path = "/api/attendance/recompute",
    request_body = RecomputeRequest,
    responses(
        (status = 200, description = "Recomputed records", body = [AttendanceRecord]),
        (status = 403, description = "HR/Admin only"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn recompute(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<RecomputeRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let records = service.recompute_date(auth.tenant(), body.date).await?;
    Ok(HttpResponse::Ok().json(records))
}

#[derive(Deserialize, ToSchema)]
pub struct RecordRef {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2026-01-04", format = "date", value_type = String)]
    pub date: NaiveDate,
}

/// Approve a record flagged for attention
#[utoipa::path(
    post,
    path = "/api/attendance/approve",
    request_body = RecordRef,
    responses(
        (status = 200, description = "Approved record", body = AttendanceRecord),
        (status = 404, description = "No such record"),
        (status = 403, description = "HR/Admin only"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn approve(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<RecordRef>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let record = service
        .approve_record(auth.tenant(), body.employee_id, body.date, auth.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

#[derive(Deserialize, ToSchema)]
pub struct WorkFromHomeRequest {
    /// Defaults to the caller's own employee id
    pub employee_id: Option<u64>,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    /// Only HR/Admin may approve
    #[serde(default)]
    pub approved: bool,
}

/// Declare work from home for a day
#[utoipa::path(
    post,
    path = "/api/attendance/wfh",
    request_body = WorkFromHomeRequest,
    responses(
        (status = 200, description = "Updated record", body = AttendanceRecord),
        (status = 403, description = "Forbidden"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn work_from_home(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<WorkFromHomeRequest>,
) -> actix_web::Result<impl Responder> {
    let req = body.into_inner();
    let employee_id = match req.employee_id {
        Some(id) if auth.employee_id != Some(id) => {
            auth.require_hr_or_admin()?;
            id
        }
        Some(id) => id,
        None => auth.require_employee()?,
    };
    if req.approved {
        auth.require_hr_or_admin()?;
    }

    let record = service
        .declare_work_from_home(auth.tenant(), employee_id, req.date, req.approved)
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

#[derive(Deserialize, ToSchema)]
pub struct DayOffRequest {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "Compensatory day off")]
    pub note: Option<String>,
}

/// Mark one employee-day as non-working
#[utoipa::path(
    post,
    path = "/api/attendance/day-off",
    request_body = DayOffRequest,
    responses(
        (status = 200, description = "Updated record", body = AttendanceRecord),
        (status = 403, description = "HR/Admin only"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn day_off(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<DayOffRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let req = body.into_inner();
    let record = service
        .mark_day_off(auth.tenant(), req.employee_id, req.date, req.note)
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Bulk import of pre-parsed rows (CSV upload front ends)
#[utoipa::path(
    post,
    path = "/api/attendance/import",
    request_body = [ImportRow],
    responses(
        (status = 200, description = "Counts and per-row errors", body = IngestionResult),
        (status = 403, description = "HR/Admin only"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn import(
    auth: AuthUser,
    pipeline: web::Data<IngestionPipeline>,
    body: web::Json<Vec<ImportRow>>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let result = pipeline
        .import_rows(auth.tenant(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(result))
}
