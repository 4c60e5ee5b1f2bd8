use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use crate::adapter::DeviceLogSource;
use crate::error::{AttendanceError, AttendanceResult};
use crate::model::attendance::{CheckMethod, WorkLocation};
use crate::model::device::{Device, Direction, RawLogEntry, SyncOutcome};
use crate::model::employee::EmployeeProfile;
use crate::policy::AttendancePolicy;
use crate::service::attendance_service::{AttendanceService, PunchInput, require_tenant};
use crate::service::device_registry::DeviceRegistry;
use crate::utils::employee_cache::EmployeeResolver;

/// Why one entry of a batch was not applied
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EntryError {
    /// Position of the entry in the batch
    pub index: usize,
    pub external_employee_id: Option<String>,
    pub employee_id: Option<u64>,
    pub message: String,
}

/// Batch outcome. A batch with bad entries still succeeds; the failures are
/// counted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct IngestionResult {
    pub processed: u64,
    pub errors: u64,
    pub error_details: Vec<EntryError>,
}

impl IngestionResult {
    fn record_error(&mut self, error: EntryError) {
        self.errors += 1;
        self.error_details.push(error);
    }

    fn first_error(&self) -> Option<String> {
        self.error_details.first().map(|e| e.message.clone())
    }
}

/// Per-device line of a bulk sync
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceSyncReport {
    pub device_id: u64,
    pub device_name: String,
    pub result: Option<IngestionResult>,
    /// Set when the device could not be synced at all
    pub error: Option<String>,
}

/// One pre-parsed row of a bulk import
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ImportRow {
    pub employee_id: Option<u64>,
    #[schema(example = "EMP-001")]
    pub external_employee_id: Option<String>,
    /// Tenant-local date
    #[schema(value_type = String, format = "date", example = "2026-01-04")]
    pub date: NaiveDate,
    /// Tenant-local time of day
    #[schema(value_type = String, example = "09:00:00")]
    pub time: NaiveTime,
    pub direction: Option<Direction>,
    pub device_id: Option<u64>,
}

/// Who the entry belongs to, as far as the batch knows
enum EntryEmployee<'a> {
    Id(u64),
    Code(&'a str),
}

/// Normalized entry handed to the per-entry logic
struct Punch<'a> {
    employee: EntryEmployee<'a>,
    timestamp: DateTime<Utc>,
    /// Tenant-local date, when the source already states it
    date: Option<NaiveDate>,
    direction: Option<Direction>,
    from_device: bool,
}

/// Best-effort direction for an entry without one: before the midpoint of
/// the scheduled day is a check-in, anything later a check-out
pub fn infer_direction(
    profile: &EmployeeProfile,
    timestamp: DateTime<Utc>,
    policy: &AttendancePolicy,
) -> Direction {
    let schedule = profile.schedule_or(policy.default_schedule);
    if policy.local_time(timestamp) < schedule.midpoint() {
        Direction::CheckIn
    } else {
        Direction::CheckOut
    }
}

/// Turns raw device logs and import rows into check-ins and check-outs.
/// Entries of one batch run strictly in order, one at a time.
pub struct IngestionPipeline {
    attendance: Arc<AttendanceService>,
    registry: Arc<DeviceRegistry>,
    employees: Arc<EmployeeResolver>,
    source: Arc<dyn DeviceLogSource>,
}

impl IngestionPipeline {
    pub fn new(
        attendance: Arc<AttendanceService>,
        registry: Arc<DeviceRegistry>,
        employees: Arc<EmployeeResolver>,
        source: Arc<dyn DeviceLogSource>,
    ) -> Self {
        Self {
            attendance,
            registry,
            employees,
            source,
        }
    }

    async fn resolve(
        &self,
        tenant_id: &str,
        employee: &EntryEmployee<'_>,
    ) -> AttendanceResult<EmployeeProfile> {
        match employee {
            EntryEmployee::Id(id) => self
                .employees
                .resolve_id(tenant_id, *id)
                .await?
                .ok_or(AttendanceError::EmployeeNotFound(*id)),
            EntryEmployee::Code(code) => self
                .employees
                .resolve_code(tenant_id, code)
                .await?
                .ok_or_else(|| AttendanceError::EntryResolution(code.to_string())),
        }
    }

    async fn apply(&self, tenant_id: &str, punch: &Punch<'_>) -> Result<(), (Option<u64>, AttendanceError)> {
        let profile = self
            .resolve(tenant_id, &punch.employee)
            .await
            .map_err(|e| (None, e))?;
        let employee_id = profile.employee_id;
        let policy = self.attendance.policy(tenant_id);

        let direction = punch
            .direction
            .unwrap_or_else(|| infer_direction(&profile, punch.timestamp, policy));
        let input = PunchInput {
            employee_id,
            date: punch
                .date
                .unwrap_or_else(|| policy.local_date(punch.timestamp)),
            time: punch.timestamp,
            method: if punch.from_device {
                CheckMethod::Biometric
            } else {
                CheckMethod::Manual
            },
            location: WorkLocation::Office,
        };
        debug!(employee_id, %direction, date = %input.date, "Applying punch");

        let result = match (direction, punch.from_device) {
            (Direction::CheckIn, _) => self.attendance.record_check_in(tenant_id, input).await,
            (Direction::CheckOut, true) => {
                self.attendance
                    .record_device_check_out(tenant_id, input)
                    .await
            }
            (Direction::CheckOut, false) => self.attendance.record_check_out(tenant_id, input).await,
        };

        result.map(|_| ()).map_err(|e| (Some(employee_id), e))
    }

    async fn process(&self, tenant_id: &str, punches: Vec<(Option<String>, Punch<'_>)>) -> IngestionResult {
        let mut result = IngestionResult::default();

        for (index, (external_employee_id, punch)) in punches.iter().enumerate() {
            match self.apply(tenant_id, punch).await {
                Ok(()) => result.processed += 1,
                Err((employee_id, e)) => {
                    warn!(index, ?external_employee_id, ?employee_id, error = %e, "Skipping log entry");
                    result.record_error(EntryError {
                        index,
                        external_employee_id: external_employee_id.clone(),
                        employee_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        result
    }

    async fn process_device_logs(
        &self,
        tenant_id: &str,
        entries: &[RawLogEntry],
    ) -> IngestionResult {
        let punches = entries
            .iter()
            .map(|entry| {
                (
                    Some(entry.external_employee_id.clone()),
                    Punch {
                        employee: EntryEmployee::Code(&entry.external_employee_id),
                        timestamp: entry.timestamp,
                        date: None,
                        direction: entry.direction_hint,
                        from_device: true,
                    },
                )
            })
            .collect();

        self.process(tenant_id, punches).await
    }

    async fn finish(
        &self,
        tenant_id: &str,
        device_id: u64,
        result: &IngestionResult,
    ) -> AttendanceResult<Device> {
        let outcome = SyncOutcome {
            success: result.errors == 0,
            processed: result.processed,
            error: result.first_error(),
            finished_at: Utc::now(),
        };
        self.registry
            .record_sync_outcome(tenant_id, device_id, outcome)
            .await
    }

    /// Lock the device, apply its batch in order and fold the outcome into
    /// the device stats. Fails up front with `DeviceBusy` if a sync holds it.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn ingest_device_batch(
        &self,
        tenant_id: &str,
        device_id: u64,
        entries: Vec<RawLogEntry>,
    ) -> AttendanceResult<IngestionResult> {
        let tenant_id = require_tenant(tenant_id)?;
        self.registry
            .mark_sync_start(tenant_id, device_id, Utc::now())
            .await?;

        let result = self.process_device_logs(tenant_id, &entries).await;
        self.finish(tenant_id, device_id, &result).await?;

        info!(processed = result.processed, errors = result.errors, "Device batch ingested");
        Ok(result)
    }

    /// Pull new logs from a device and ingest them
    #[instrument(skip(self))]
    pub async fn sync_device(
        &self,
        tenant_id: &str,
        device_id: u64,
        now: DateTime<Utc>,
    ) -> AttendanceResult<IngestionResult> {
        let device = self.registry.get(tenant_id, device_id).await?;
        if !device.device_type.supports_pull() {
            return Err(AttendanceError::PullUnsupported(device_id));
        }
        let tenant_id = device.tenant_id.as_str();

        self.registry.mark_sync_start(tenant_id, device_id, now).await?;

        let timezone = self.attendance.policy(tenant_id).timezone;
        let entries = match self.source.fetch_logs(&device, timezone).await {
            Ok(entries) => entries,
            Err(e) => {
                let message = format!("{:#}", e);
                error!(error = %message, "Device log fetch failed");
                let outcome = SyncOutcome {
                    success: false,
                    processed: 0,
                    error: Some(message.clone()),
                    finished_at: Utc::now(),
                };
                self.registry
                    .record_sync_outcome(tenant_id, device_id, outcome)
                    .await?;
                return Err(AttendanceError::DeviceFetch(message));
            }
        };

        let result = self.process_device_logs(tenant_id, &entries).await;
        self.finish(tenant_id, device_id, &result).await?;

        info!(
            fetched = entries.len(),
            processed = result.processed,
            errors = result.errors,
            "Device synced"
        );
        Ok(result)
    }

    /// Sync every due device of the tenant. Devices run concurrently and a
    /// failing device never blocks the others.
    #[instrument(skip(self))]
    pub async fn sync_all_due(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> AttendanceResult<Vec<DeviceSyncReport>> {
        let tenant_id = require_tenant(tenant_id)?;
        let devices = self.registry.list_due_for_sync(tenant_id, now).await?;

        let runs = devices.iter().map(|device| async move {
            let outcome = self.sync_device(tenant_id, device.id, now).await;
            let (result, error) = match outcome {
                Ok(result) => (Some(result), None),
                Err(e) => (None, Some(e.to_string())),
            };
            DeviceSyncReport {
                device_id: device.id,
                device_name: device.name.clone(),
                result,
                error,
            }
        });
        let reports = join_all(runs).await;

        info!(devices = reports.len(), "Due devices synced");
        Ok(reports)
    }

    /// Entry point for devices that push their own logs
    #[instrument(skip(self, secret, entries), fields(count = entries.len()))]
    pub async fn push_logs(
        &self,
        device_id: u64,
        secret: &str,
        entries: Vec<RawLogEntry>,
    ) -> AttendanceResult<IngestionResult> {
        let device = self.registry.authenticate_push(device_id, secret).await?;
        self.ingest_device_batch(&device.tenant_id, device.id, entries)
            .await
    }

    /// Whether `device_id` names a registered device of the tenant
    async fn device_known(
        &self,
        tenant_id: &str,
        device_id: u64,
        known: &mut HashMap<u64, bool>,
    ) -> AttendanceResult<bool> {
        if let Some(found) = known.get(&device_id) {
            return Ok(*found);
        }
        let found = match self.registry.get(tenant_id, device_id).await {
            Ok(_) => true,
            Err(AttendanceError::DeviceNotFound(_)) => false,
            Err(e) => return Err(e),
        };
        known.insert(device_id, found);
        Ok(found)
    }

    /// Bulk import of pre-parsed rows. Rows without a device are manual
    /// entries, so their check-outs need a prior check-in. A row naming a
    /// device must name one registered to the tenant.
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    pub async fn import_rows(
        &self,
        tenant_id: &str,
        rows: Vec<ImportRow>,
    ) -> AttendanceResult<IngestionResult> {
        let tenant_id = require_tenant(tenant_id)?;
        let policy = self.attendance.policy(tenant_id).clone();

        let mut result = IngestionResult::default();
        let mut punches = Vec::with_capacity(rows.len());
        let mut positions = Vec::with_capacity(rows.len());
        let mut known_devices = HashMap::new();

        for (index, row) in rows.iter().enumerate() {
            let employee = match (row.employee_id, row.external_employee_id.as_deref()) {
                (Some(id), _) => EntryEmployee::Id(id),
                (None, Some(code)) if !code.trim().is_empty() => EntryEmployee::Code(code.trim()),
                _ => {
                    result.record_error(EntryError {
                        index,
                        external_employee_id: None,
                        employee_id: None,
                        message: "Row names no employee".to_string(),
                    });
                    continue;
                }
            };
            if let Some(device_id) = row.device_id {
                if !self.device_known(tenant_id, device_id, &mut known_devices).await? {
                    result.record_error(EntryError {
                        index,
                        external_employee_id: row.external_employee_id.clone(),
                        employee_id: row.employee_id,
                        message: AttendanceError::DeviceNotFound(device_id).to_string(),
                    });
                    continue;
                }
            }
            positions.push(index);
            punches.push((
                row.external_employee_id.clone(),
                Punch {
                    employee,
                    timestamp: policy.to_utc(row.date, row.time),
                    date: Some(row.date),
                    direction: row.direction,
                    from_device: row.device_id.is_some(),
                },
            ));
        }

        let applied = self.process(tenant_id, punches).await;
        result.processed += applied.processed;
        for mut detail in applied.error_details {
            detail.index = positions[detail.index];
            result.record_error(detail);
        }
        result.error_details.sort_by_key(|e| e.index);

        info!(processed = result.processed, errors = result.errors, "Import finished");
        Ok(result)
    }
}
