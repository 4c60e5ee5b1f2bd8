use std::str::FromStr;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::MySqlPool;

use crate::error::{AttendanceError, AttendanceResult};
use crate::model::device::{
    Device, DeviceStats, DeviceStatus, DeviceType, NewDevice, SyncOutcome, SyncStatus,
};
use crate::store::DeviceStore;

const SELECT_COLUMNS: &str = r#"
    id, tenant_id, name, device_type, connection, auto_sync, sync_interval_minutes, status,
    total_syncs, successful_syncs, failed_syncs, last_record_count,
    last_sync, last_sync_status, last_sync_error, sync_started_at, push_secret_hash
"#;

#[derive(Debug, sqlx::FromRow)]
struct DeviceRow {
    id: u64,
    tenant_id: String,
    name: String,
    device_type: String,
    connection: Option<String>,
    auto_sync: bool,
    sync_interval_minutes: u32,
    status: String,
    total_syncs: u64,
    successful_syncs: u64,
    failed_syncs: u64,
    last_record_count: u64,
    last_sync: Option<NaiveDateTime>,
    last_sync_status: Option<String>,
    last_sync_error: Option<String>,
    sync_started_at: Option<NaiveDateTime>,
    push_secret_hash: Option<String>,
}

fn parse_enum<T: FromStr>(column: &str, value: &str) -> anyhow::Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("unexpected {} value: {}", column, value))
}

impl TryFrom<DeviceRow> for Device {
    type Error = anyhow::Error;

    fn try_from(row: DeviceRow) -> anyhow::Result<Self> {
        let connection = match row.connection.as_deref() {
            Some(raw) if !raw.is_empty() => {
                serde_json::from_str(raw).context("device connection is not valid JSON")?
            }
            _ => serde_json::Value::Null,
        };

        Ok(Device {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            device_type: parse_enum::<DeviceType>("device_type", &row.device_type)?,
            connection,
            auto_sync: row.auto_sync,
            sync_interval_minutes: row.sync_interval_minutes,
            status: parse_enum::<DeviceStatus>("status", &row.status)?,
            stats: DeviceStats {
                total_syncs: row.total_syncs,
                successful_syncs: row.successful_syncs,
                failed_syncs: row.failed_syncs,
                last_record_count: row.last_record_count,
            },
            last_sync: row.last_sync.map(|t| t.and_utc()),
            last_sync_status: row
                .last_sync_status
                .as_deref()
                .map(|s| parse_enum::<SyncStatus>("last_sync_status", s))
                .transpose()?,
            last_sync_error: row.last_sync_error,
            sync_started_at: row.sync_started_at.map(|t| t.and_utc()),
            push_secret_hash: row.push_secret_hash,
        })
    }
}

pub struct MySqlDeviceStore {
    pool: MySqlPool,
}

impl MySqlDeviceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_one(&self, sql: &str, id: u64, tenant_id: Option<&str>) -> AttendanceResult<Option<Device>> {
        let mut query = sqlx::query_as::<_, DeviceRow>(sql).bind(id);
        if let Some(tenant_id) = tenant_id {
            query = query.bind(tenant_id);
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch device")?;

        Ok(row.map(Device::try_from).transpose()?)
    }
}

#[async_trait]
impl DeviceStore for MySqlDeviceStore {
    async fn insert(
        &self,
        tenant_id: &str,
        device: NewDevice,
        push_secret_hash: Option<String>,
    ) -> AttendanceResult<Device> {
        let connection = serde_json::to_string(&device.connection)
            .context("failed to encode device connection")?;

        let result = sqlx::query(
            r#"
            INSERT INTO devices
                (tenant_id, name, device_type, connection, auto_sync, sync_interval_minutes, status, push_secret_hash)
            VALUES (?, ?, ?, ?, ?, ?, 'active', ?)
            "#,
        )
        .bind(tenant_id)
        .bind(&device.name)
        .bind(device.device_type.as_ref())
        .bind(connection)
        .bind(device.auto_sync)
        .bind(device.sync_interval_minutes)
        .bind(&push_secret_hash)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(r) => r,
            Err(e) => {
                // unique (tenant_id, name)
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.code().as_deref() == Some("23000") {
                        return Err(AttendanceError::DeviceAlreadyExists(device.name));
                    }
                }
                return Err(anyhow::Error::new(e).context("failed to insert device").into());
            }
        };

        self.get(tenant_id, result.last_insert_id())
            .await?
            .ok_or_else(|| anyhow!("device vanished after insert").into())
    }

    async fn get(&self, tenant_id: &str, device_id: u64) -> AttendanceResult<Option<Device>> {
        let sql = format!(
            "SELECT {} FROM devices WHERE id = ? AND tenant_id = ?",
            SELECT_COLUMNS
        );
        self.fetch_one(&sql, device_id, Some(tenant_id)).await
    }

    async fn get_by_id(&self, device_id: u64) -> AttendanceResult<Option<Device>> {
        let sql = format!("SELECT {} FROM devices WHERE id = ?", SELECT_COLUMNS);
        self.fetch_one(&sql, device_id, None).await
    }

    async fn update(&self, device: &Device) -> AttendanceResult<()> {
        let connection = serde_json::to_string(&device.connection)
            .context("failed to encode device connection")?;

        let result = sqlx::query(
            r#"
            UPDATE devices
            SET name = ?, connection = ?, auto_sync = ?, sync_interval_minutes = ?,
                push_secret_hash = ?
            WHERE id = ? AND tenant_id = ?
            "#,
        )
        .bind(&device.name)
        .bind(connection)
        .bind(device.auto_sync)
        .bind(device.sync_interval_minutes)
        .bind(&device.push_secret_hash)
        .bind(device.id)
        .bind(&device.tenant_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23000") => {
                Err(AttendanceError::DeviceAlreadyExists(device.name.clone()))
            }
            Err(e) => Err(anyhow::Error::new(e).context("failed to update device").into()),
        }
    }

    async fn set_enabled(
        &self,
        tenant_id: &str,
        device_id: u64,
        status: DeviceStatus,
    ) -> AttendanceResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET status = ?
            WHERE id = ? AND tenant_id = ? AND status <> 'syncing'
            "#,
        )
        .bind(status.as_ref())
        .bind(device_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await
        .context("failed to change device status")?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, tenant_id: &str, device_id: u64) -> AttendanceResult<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ? AND tenant_id = ?")
            .bind(device_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await
            .context("failed to delete device")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, tenant_id: &str) -> AttendanceResult<Vec<Device>> {
        let sql = format!(
            "SELECT {} FROM devices WHERE tenant_id = ? ORDER BY name",
            SELECT_COLUMNS
        );

        let rows = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await
            .context("failed to list devices")?;

        let devices = rows
            .into_iter()
            .map(Device::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(devices)
    }

    async fn try_begin_sync(
        &self,
        tenant_id: &str,
        device_id: u64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> AttendanceResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET status = 'syncing', sync_started_at = ?
            WHERE id = ? AND tenant_id = ?
            AND (status <> 'syncing' OR sync_started_at IS NULL OR sync_started_at < ?)
            "#,
        )
        .bind(now.naive_utc())
        .bind(device_id)
        .bind(tenant_id)
        .bind(stale_before.naive_utc())
        .execute(&self.pool)
        .await
        .context("failed to acquire device sync lock")?;

        Ok(result.rows_affected() == 1)
    }

    async fn finish_sync(
        &self,
        tenant_id: &str,
        device_id: u64,
        outcome: &SyncOutcome,
    ) -> AttendanceResult<Option<Device>> {
        let (status, sync_status) = if outcome.success {
            (DeviceStatus::Active, SyncStatus::Success)
        } else {
            (DeviceStatus::Error, SyncStatus::Failed)
        };

        sqlx::query(
            r#"
            UPDATE devices
            SET status = ?,
                total_syncs = total_syncs + 1,
                successful_syncs = successful_syncs + ?,
                failed_syncs = failed_syncs + ?,
                last_record_count = ?,
                last_sync = ?,
                last_sync_status = ?,
                last_sync_error = ?,
                sync_started_at = NULL
            WHERE id = ? AND tenant_id = ?
            "#,
        )
        .bind(status.as_ref())
        .bind(u64::from(outcome.success))
        .bind(u64::from(!outcome.success))
        .bind(outcome.processed)
        .bind(outcome.finished_at.naive_utc())
        .bind(sync_status.as_ref())
        .bind(&outcome.error)
        .bind(device_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await
        .context("failed to record device sync outcome")?;

        self.get(tenant_id, device_id).await
    }
}
