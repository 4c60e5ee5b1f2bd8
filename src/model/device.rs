use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceType {
    /// BioTime / iClock server exposing punch transactions over HTTP
    Biotime,
    /// Device that only pushes its own logs
    Push,
    Virtual,
}

impl DeviceType {
    pub fn supports_pull(&self) -> bool {
        matches!(self, DeviceType::Biotime)
    }
}

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Error,
    Syncing,
}

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceStats {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub last_record_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Device {
    #[schema(example = 7)]
    pub id: u64,
    #[schema(example = "acme")]
    pub tenant_id: String,
    #[schema(example = "Main gate")]
    pub name: String,
    pub device_type: DeviceType,
    /// Transport settings (ip, port, url, api key); opaque to the core
    #[schema(value_type = Object)]
    pub connection: Value,
    pub auto_sync: bool,
    #[schema(example = 15)]
    pub sync_interval_minutes: u32,
    pub status: DeviceStatus,
    pub stats: DeviceStats,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_sync: Option<DateTime<Utc>>,
    pub last_sync_status: Option<SyncStatus>,
    pub last_sync_error: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub sync_started_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub push_secret_hash: Option<String>,
}

impl Device {
    /// True while a sync run holds the device and its lease has not run out
    pub fn is_sync_locked(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        if self.status != DeviceStatus::Syncing {
            return false;
        }
        match self.sync_started_at {
            Some(started) => now - started < lease,
            None => false,
        }
    }

    /// Never-synced devices are always due
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_sync {
            Some(last) => last + Duration::minutes(i64::from(self.sync_interval_minutes)) <= now,
            None => true,
        }
    }
}

/// Registration payload
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewDevice {
    #[schema(example = "Main gate")]
    pub name: String,
    pub device_type: DeviceType,
    #[serde(default)]
    #[schema(value_type = Object, example = json!({"url": "http://10.0.0.5:8081", "api_token": "secret"}))]
    pub connection: Value,
    #[serde(default)]
    pub auto_sync: bool,
    #[serde(default = "default_sync_interval")]
    #[schema(example = 15)]
    pub sync_interval_minutes: u32,
    /// Secret the device presents when pushing logs
    pub push_secret: Option<String>,
}

fn default_sync_interval() -> u32 {
    15
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DeviceConfigUpdate {
    pub name: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub connection: Option<Value>,
    pub auto_sync: Option<bool>,
    pub sync_interval_minutes: Option<u32>,
    /// Only `active` and `inactive` may be set by hand
    pub enabled: Option<bool>,
    pub push_secret: Option<String>,
}

/// Result of one sync attempt, folded into the device's rolling stats
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub success: bool,
    pub processed: u64,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Direction {
    CheckIn,
    CheckOut,
}

/// One punch as delivered by a device adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RawLogEntry {
    pub device_id: Option<u64>,
    #[schema(example = "EMP-001")]
    pub external_employee_id: String,
    #[schema(example = "2026-01-04T03:20:00Z", value_type = String, format = "date-time")]
    pub timestamp: DateTime<Utc>,
    pub direction_hint: Option<Direction>,
}
