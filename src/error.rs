use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::NaiveDate;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("Tenant context is required")]
    TenantRequired,

    #[error("No attendance record with a check-in for employee {employee_id} on {date}")]
    RecordNotFound { employee_id: u64, date: NaiveDate },

    #[error("Device {0} is already syncing")]
    DeviceBusy(u64),

    #[error("Unknown employee code: {0}")]
    EntryResolution(String),

    #[error("Invalid leave range: {end} is before {start}")]
    InvalidLeaveRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid date range: {end} is before {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Leave {0} is not approved")]
    LeaveNotApproved(u64),

    #[error("Employee not found: {0}")]
    EmployeeNotFound(u64),

    #[error("Device not found: {0}")]
    DeviceNotFound(u64),

    #[error("Device already exists: {0}")]
    DeviceAlreadyExists(String),

    #[error("Invalid device name: {0}")]
    InvalidDeviceName(String),

    #[error("Device {0} rejected the supplied secret")]
    DeviceUnauthorized(u64),

    #[error("Device {0} does not support pull sync")]
    PullUnsupported(u64),

    #[error("Failed to fetch device logs: {0}")]
    DeviceFetch(String),

    #[error("Storage error: {0}")]
    Store(#[from] anyhow::Error),
}

pub type AttendanceResult<T> = Result<T, AttendanceError>;

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::TenantRequired => StatusCode::FORBIDDEN,
            AttendanceError::RecordNotFound { .. }
            | AttendanceError::EmployeeNotFound(_)
            | AttendanceError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            AttendanceError::DeviceBusy(_) | AttendanceError::DeviceAlreadyExists(_) => {
                StatusCode::CONFLICT
            }
            AttendanceError::EntryResolution(_)
            | AttendanceError::InvalidLeaveRange { .. }
            | AttendanceError::InvalidDateRange { .. }
            | AttendanceError::LeaveNotApproved(_)
            | AttendanceError::InvalidDeviceName(_)
            | AttendanceError::PullUnsupported(_) => StatusCode::BAD_REQUEST,
            AttendanceError::DeviceUnauthorized(_) => StatusCode::UNAUTHORIZED,
            AttendanceError::DeviceFetch(_) => StatusCode::BAD_GATEWAY,
            AttendanceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AttendanceError::Store(e) => {
                tracing::error!(error = %e, "Attendance storage failure");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({ "message": message }))
    }
}
