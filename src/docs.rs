use crate::api::attendance::{
    DayOffRequest, ManualEntryRequest, RangeFilter, RecomputeRequest, RecordRef, SelfPunchRequest,
    WorkFromHomeRequest,
};
use crate::api::device::PushLogsRequest;
use crate::model::attendance::{
    AttendanceMetrics, AttendanceRecord, AttendanceStatus, CheckIn, CheckMethod, CheckOut, Flags,
    Hours, LeaveLink, WorkLocation, WorkSchedule,
};
use crate::model::device::{
    Device, DeviceConfigUpdate, DeviceStats, DeviceStatus, DeviceType, Direction, NewDevice,
    RawLogEntry, SyncStatus,
};
use crate::model::leave::{Leave, LeaveStatus, LeaveType};
use crate::service::ingestion::{DeviceSyncReport, EntryError, ImportRow, IngestionResult};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Attendance API",
        version = "1.0.0",
        description = r#"
## Attendance subsystem of the HRM platform

Turns check-ins, check-outs, biometric device logs and approved leaves into one
attendance record per employee per day, each with a derived status.

### Key Features
- **Attendance**
  - Self-service check-in/out, HR corrections, approvals, work from home
  - Records generated from approved leaves
  - Range queries and per-employee metrics
- **Devices**
  - Register biometric devices, pull their logs, accept pushed logs
  - Bulk import of pre-parsed rows

### Security
Management endpoints require a **JWT Bearer** token carrying the tenant.
Devices push logs with their own secret in `X-Device-Secret`.

### Batches
Batch endpoints always answer with counts and per-entry errors; a batch with
a few bad entries is still a success.
"#,
    ),
    paths(
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::list_records,
        crate::api::attendance::metrics,
        crate::api::attendance::manual_entry,
        crate::api::attendance::from_leave,
        crate::api::attendance::recompute,
        crate::api::attendance::approve,
        crate::api::attendance::work_from_home,
        crate::api::attendance::day_off,
        crate::api::attendance::import,

        crate::api::device::register_device,
        crate::api::device::list_devices,
        crate::api::device::get_device,
        crate::api::device::update_device,
        crate::api::device::delete_device,
        crate::api::device::sync_device,
        crate::api::device::sync_due_devices,
        crate::api::device::push_logs
    ),
    components(
        schemas(
            AttendanceRecord,
            AttendanceStatus,
            AttendanceMetrics,
            CheckIn,
            CheckOut,
            CheckMethod,
            WorkLocation,
            WorkSchedule,
            Hours,
            Flags,
            LeaveLink,
            Leave,
            LeaveType,
            LeaveStatus,
            SelfPunchRequest,
            RangeFilter,
            ManualEntryRequest,
            RecomputeRequest,
            RecordRef,
            WorkFromHomeRequest,
            DayOffRequest,
            ImportRow,
            IngestionResult,
            EntryError,
            DeviceSyncReport,
            Device,
            DeviceType,
            DeviceStatus,
            DeviceStats,
            SyncStatus,
            NewDevice,
            DeviceConfigUpdate,
            Direction,
            RawLogEntry,
            PushLogsRequest
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Attendance records, corrections and metrics"),
        (name = "Device", description = "Biometric devices and log ingestion"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
