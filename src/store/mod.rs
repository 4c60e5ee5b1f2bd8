//! Persistence seams. Services only talk to these traits; `mysql` holds the
//! production implementations.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::AttendanceResult;
use crate::model::attendance::{AttendanceRecord, RecordKey};
use crate::model::device::{Device, DeviceStatus, NewDevice, SyncOutcome};
use crate::model::employee::EmployeeProfile;

pub mod mysql;

/// Mutation applied inside an atomic read-modify-write. Receives the current
/// record (if any) and returns the record to persist. A store may run it
/// again when the write loses a lock conflict, so it must not consume state.
pub type RecordMutator =
    Box<dyn Fn(Option<AttendanceRecord>) -> AttendanceResult<AttendanceRecord> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScope {
    Employee(u64),
    Department(u64),
    Tenant,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find(&self, key: &RecordKey) -> AttendanceResult<Option<AttendanceRecord>>;

    /// Read, mutate and upsert the record under `key` as one unit. Concurrent
    /// calls for the same key must not lose updates.
    async fn modify(
        &self,
        key: &RecordKey,
        mutator: RecordMutator,
    ) -> AttendanceResult<AttendanceRecord>;

    /// Records in `[start, end]`, ordered by date then employee
    async fn range(
        &self,
        tenant_id: &str,
        scope: RecordScope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AttendanceResult<Vec<AttendanceRecord>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Fails with `DeviceAlreadyExists` when the name is taken within the tenant
    async fn insert(
        &self,
        tenant_id: &str,
        device: NewDevice,
        push_secret_hash: Option<String>,
    ) -> AttendanceResult<Device>;

    async fn get(&self, tenant_id: &str, device_id: u64) -> AttendanceResult<Option<Device>>;

    /// Lookup without tenant, for devices that authenticate themselves
    async fn get_by_id(&self, device_id: u64) -> AttendanceResult<Option<Device>>;

    /// Write the configuration columns. Status and sync bookkeeping are left
    /// alone; only the sync lock, `finish_sync` and `set_enabled` change them.
    async fn update(&self, device: &Device) -> AttendanceResult<()>;

    /// Switch between `active` and `inactive` unless the device is syncing.
    /// Returns false when nothing was changed.
    async fn set_enabled(
        &self,
        tenant_id: &str,
        device_id: u64,
        status: DeviceStatus,
    ) -> AttendanceResult<bool>;

    async fn delete(&self, tenant_id: &str, device_id: u64) -> AttendanceResult<bool>;

    async fn list(&self, tenant_id: &str) -> AttendanceResult<Vec<Device>>;

    /// Compare-and-set into `syncing`. Succeeds when the device is not syncing
    /// or its sync started before `stale_before`.
    async fn try_begin_sync(
        &self,
        tenant_id: &str,
        device_id: u64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> AttendanceResult<bool>;

    /// Fold an outcome into the rolling stats and release the sync lock
    async fn finish_sync(
        &self,
        tenant_id: &str,
        device_id: u64,
        outcome: &SyncOutcome,
    ) -> AttendanceResult<Option<Device>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &str,
        employee_id: u64,
    ) -> AttendanceResult<Option<EmployeeProfile>>;

    async fn find_by_code(
        &self,
        tenant_id: &str,
        employee_code: &str,
    ) -> AttendanceResult<Option<EmployeeProfile>>;
}
