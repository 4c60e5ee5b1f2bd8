#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use hrm_attendance::adapter::DeviceLogSource;
use hrm_attendance::calendar::HolidayCalendar;
use hrm_attendance::error::{AttendanceError, AttendanceResult};
use hrm_attendance::model::attendance::{AttendanceRecord, RecordKey, WorkSchedule};
use hrm_attendance::model::device::{
    Device, DeviceStats, DeviceStatus, DeviceType, NewDevice, RawLogEntry, SyncOutcome, SyncStatus,
};
use hrm_attendance::model::employee::EmployeeProfile;
use hrm_attendance::policy::{AttendancePolicy, AttendancePolicyBook};
use hrm_attendance::service::{AttendanceService, DeviceRegistry, IngestionPipeline};
use hrm_attendance::store::{AttendanceStore, DeviceStore, EmployeeDirectory, RecordMutator, RecordScope};
use hrm_attendance::utils::employee_cache::EmployeeResolver;

pub const TENANT: &str = "acme";
pub const OTHER_TENANT: &str = "globex";

#[derive(Default)]
pub struct InMemoryAttendanceStore {
    records: Mutex<HashMap<RecordKey, AttendanceRecord>>,
}

impl InMemoryAttendanceStore {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl AttendanceStore for InMemoryAttendanceStore {
    async fn find(&self, key: &RecordKey) -> AttendanceResult<Option<AttendanceRecord>> {
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    async fn modify(
        &self,
        key: &RecordKey,
        mutator: RecordMutator,
    ) -> AttendanceResult<AttendanceRecord> {
        let mut records = self.records.lock().unwrap();
        let record = mutator(records.get(key).cloned())?;
        records.insert(key.clone(), record.clone());
        Ok(record)
    }

    async fn range(
        &self,
        tenant_id: &str,
        scope: RecordScope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AttendanceResult<Vec<AttendanceRecord>> {
        let records = self.records.lock().unwrap();
        let mut found: Vec<AttendanceRecord> = records
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.date >= start && r.date <= end)
            .filter(|r| match scope {
                RecordScope::Employee(id) => r.employee_id == id,
                RecordScope::Department(id) => r.department_id == Some(id),
                RecordScope::Tenant => true,
            })
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.date, r.employee_id));
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryDeviceStore {
    devices: Mutex<Vec<Device>>,
}

impl InMemoryDeviceStore {
    pub fn snapshot(&self, device_id: u64) -> Option<Device> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == device_id)
            .cloned()
    }

    /// Force state that normally only a sync run sets
    pub fn set(&self, device: Device) {
        let mut devices = self.devices.lock().unwrap();
        if let Some(slot) = devices.iter_mut().find(|d| d.id == device.id) {
            *slot = device;
        }
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn insert(
        &self,
        tenant_id: &str,
        device: NewDevice,
        push_secret_hash: Option<String>,
    ) -> AttendanceResult<Device> {
        let mut devices = self.devices.lock().unwrap();
        if devices
            .iter()
            .any(|d| d.tenant_id == tenant_id && d.name == device.name)
        {
            return Err(AttendanceError::DeviceAlreadyExists(device.name));
        }

        let stored = Device {
            id: devices.len() as u64 + 1,
            tenant_id: tenant_id.to_string(),
            name: device.name,
            device_type: device.device_type,
            connection: device.connection,
            auto_sync: device.auto_sync,
            sync_interval_minutes: device.sync_interval_minutes,
            status: DeviceStatus::Active,
            stats: DeviceStats::default(),
            last_sync: None,
            last_sync_status: None,
            last_sync_error: None,
            sync_started_at: None,
            push_secret_hash,
        };
        devices.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, tenant_id: &str, device_id: u64) -> AttendanceResult<Option<Device>> {
        Ok(self
            .snapshot(device_id)
            .filter(|d| d.tenant_id == tenant_id))
    }

    async fn get_by_id(&self, device_id: u64) -> AttendanceResult<Option<Device>> {
        Ok(self.snapshot(device_id))
    }

    async fn update(&self, device: &Device) -> AttendanceResult<()> {
        let mut devices = self.devices.lock().unwrap();
        if let Some(slot) = devices
            .iter_mut()
            .find(|d| d.id == device.id && d.tenant_id == device.tenant_id)
        {
            slot.name = device.name.clone();
            slot.connection = device.connection.clone();
            slot.auto_sync = device.auto_sync;
            slot.sync_interval_minutes = device.sync_interval_minutes;
            slot.push_secret_hash = device.push_secret_hash.clone();
        }
        Ok(())
    }

    async fn set_enabled(
        &self,
        tenant_id: &str,
        device_id: u64,
        status: DeviceStatus,
    ) -> AttendanceResult<bool> {
        let mut devices = self.devices.lock().unwrap();
        match devices
            .iter_mut()
            .find(|d| d.id == device_id && d.tenant_id == tenant_id)
        {
            Some(device) if device.status != DeviceStatus::Syncing => {
                device.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, tenant_id: &str, device_id: u64) -> AttendanceResult<bool> {
        let mut devices = self.devices.lock().unwrap();
        let before = devices.len();
        devices.retain(|d| !(d.id == device_id && d.tenant_id == tenant_id));
        Ok(devices.len() < before)
    }

    async fn list(&self, tenant_id: &str) -> AttendanceResult<Vec<Device>> {
        let mut devices: Vec<Device> = self
            .devices
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.tenant_id == tenant_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }

    async fn try_begin_sync(
        &self,
        tenant_id: &str,
        device_id: u64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> AttendanceResult<bool> {
        let mut devices = self.devices.lock().unwrap();
        let Some(device) = devices
            .iter_mut()
            .find(|d| d.id == device_id && d.tenant_id == tenant_id)
        else {
            return Ok(false);
        };

        let held = device.status == DeviceStatus::Syncing
            && device.sync_started_at.is_some_and(|t| t >= stale_before);
        if held {
            return Ok(false);
        }
        device.status = DeviceStatus::Syncing;
        device.sync_started_at = Some(now);
        Ok(true)
    }

    async fn finish_sync(
        &self,
        tenant_id: &str,
        device_id: u64,
        outcome: &SyncOutcome,
    ) -> AttendanceResult<Option<Device>> {
        let mut devices = self.devices.lock().unwrap();
        let Some(device) = devices
            .iter_mut()
            .find(|d| d.id == device_id && d.tenant_id == tenant_id)
        else {
            return Ok(None);
        };

        device.stats.total_syncs += 1;
        if outcome.success {
            device.stats.successful_syncs += 1;
            device.status = DeviceStatus::Active;
            device.last_sync_status = Some(SyncStatus::Success);
        } else {
            device.stats.failed_syncs += 1;
            device.status = DeviceStatus::Error;
            device.last_sync_status = Some(SyncStatus::Failed);
        }
        device.stats.last_record_count = outcome.processed;
        device.last_sync = Some(outcome.finished_at);
        device.last_sync_error = outcome.error.clone();
        device.sync_started_at = None;
        Ok(Some(device.clone()))
    }
}

/// Fixed employee list, keyed by tenant
#[derive(Default)]
pub struct StaticDirectory {
    employees: Vec<(String, EmployeeProfile)>,
}

impl StaticDirectory {
    pub fn with(mut self, tenant_id: &str, profile: EmployeeProfile) -> Self {
        self.employees.push((tenant_id.to_string(), profile));
        self
    }
}

#[async_trait]
impl EmployeeDirectory for StaticDirectory {
    async fn find_by_id(
        &self,
        tenant_id: &str,
        employee_id: u64,
    ) -> AttendanceResult<Option<EmployeeProfile>> {
        Ok(self
            .employees
            .iter()
            .find(|(t, p)| t == tenant_id && p.employee_id == employee_id)
            .map(|(_, p)| p.clone()))
    }

    async fn find_by_code(
        &self,
        tenant_id: &str,
        employee_code: &str,
    ) -> AttendanceResult<Option<EmployeeProfile>> {
        Ok(self
            .employees
            .iter()
            .find(|(t, p)| t == tenant_id && p.employee_code == employee_code)
            .map(|(_, p)| p.clone()))
    }
}

/// Canned device logs; a device without an entry fails to fetch
#[derive(Default)]
pub struct StaticLogSource {
    logs: Mutex<HashMap<u64, Result<Vec<RawLogEntry>, String>>>,
}

impl StaticLogSource {
    pub fn serve(&self, device_id: u64, logs: Result<Vec<RawLogEntry>, String>) {
        self.logs.lock().unwrap().insert(device_id, logs);
    }
}

#[async_trait]
impl DeviceLogSource for StaticLogSource {
    async fn fetch_logs(
        &self,
        device: &Device,
        _timezone: Tz,
    ) -> anyhow::Result<Vec<RawLogEntry>> {
        match self.logs.lock().unwrap().get(&device.id) {
            Some(Ok(logs)) => Ok(logs.clone()),
            Some(Err(message)) => Err(anyhow::anyhow!(message.clone())),
            None => Err(anyhow::anyhow!("connection refused")),
        }
    }
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn policy(timezone: Tz) -> AttendancePolicy {
    AttendancePolicy {
        tolerance_minutes: 0,
        timezone,
        default_schedule: WorkSchedule::new(time(9, 0), time(17, 0)),
    }
}

pub fn employee(employee_id: u64, code: &str, department_id: Option<u64>) -> EmployeeProfile {
    EmployeeProfile {
        employee_id,
        employee_code: code.to_string(),
        department_id,
        position_id: Some(3),
        shift_start: None,
        shift_end: None,
    }
}

pub fn raw(code: &str, timestamp: DateTime<Utc>) -> RawLogEntry {
    RawLogEntry {
        device_id: None,
        external_employee_id: code.to_string(),
        timestamp,
        direction_hint: None,
    }
}

pub fn new_device(name: &str, device_type: DeviceType, secret: Option<&str>) -> NewDevice {
    NewDevice {
        name: name.to_string(),
        device_type,
        connection: serde_json::json!({"url": "http://10.0.0.5:8081", "api_token": "t"}),
        auto_sync: true,
        sync_interval_minutes: 15,
        push_secret: secret.map(str::to_string),
    }
}

/// Fully wired core over in-memory stores. Weekend is Friday and Saturday.
pub struct Harness {
    pub records: Arc<InMemoryAttendanceStore>,
    pub devices: Arc<InMemoryDeviceStore>,
    pub calendar: Arc<HolidayCalendar>,
    pub source: Arc<StaticLogSource>,
    pub attendance: Arc<AttendanceService>,
    pub registry: Arc<DeviceRegistry>,
    pub pipeline: Arc<IngestionPipeline>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(policy(Tz::UTC))
    }

    pub fn with_policy(policy: AttendancePolicy) -> Self {
        let directory = StaticDirectory::default()
            .with(TENANT, employee(1000, "EMP-001", Some(10)))
            .with(TENANT, employee(1001, "EMP-002", Some(10)))
            .with(TENANT, employee(1002, "EMP-003", Some(20)))
            .with(OTHER_TENANT, employee(2000, "EMP-001", Some(10)));

        let records = Arc::new(InMemoryAttendanceStore::default());
        let devices = Arc::new(InMemoryDeviceStore::default());
        let calendar = Arc::new(HolidayCalendar::new(vec![Weekday::Fri, Weekday::Sat]));
        let source = Arc::new(StaticLogSource::default());

        let employees = Arc::new(EmployeeResolver::new(
            Arc::new(directory),
            Duration::from_secs(60),
        ));
        let attendance = Arc::new(AttendanceService::new(
            records.clone(),
            employees.clone(),
            calendar.clone(),
            Arc::new(AttendancePolicyBook::new(policy)),
        ));
        let registry = Arc::new(DeviceRegistry::new(
            devices.clone(),
            chrono::Duration::minutes(30),
        ));
        let pipeline = Arc::new(IngestionPipeline::new(
            attendance.clone(),
            registry.clone(),
            employees,
            source.clone(),
        ));

        Self {
            records,
            devices,
            calendar,
            source,
            attendance,
            registry,
            pipeline,
        }
    }
}
