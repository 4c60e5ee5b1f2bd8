//! Device log sources. A source turns whatever a device exposes into
//! `RawLogEntry` values; the ingestion pipeline does the rest.

use async_trait::async_trait;
use chrono_tz::Tz;

use crate::model::device::{Device, RawLogEntry};

pub mod biotime;

pub use biotime::BioTimeLogSource;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceLogSource: Send + Sync {
    /// Punches recorded after the device's last sync. `timezone` is the
    /// tenant's zone, for devices that report local wall-clock times.
    async fn fetch_logs(
        &self,
        device: &Device,
        timezone: Tz,
    ) -> anyhow::Result<Vec<RawLogEntry>>;
}
