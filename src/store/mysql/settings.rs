use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use futures_util::StreamExt;
use sqlx::MySqlPool;
use tracing::info;

use crate::calendar::HolidayCalendar;
use crate::model::attendance::WorkSchedule;
use crate::policy::AttendancePolicy;

/// Load the holidays table into the in-memory calendar, streaming rows
pub async fn warmup_holiday_calendar(pool: &MySqlPool, calendar: &HolidayCalendar) -> Result<usize> {
    let mut stream = sqlx::query_as::<_, (Option<String>, NaiveDate, Option<String>)>(
        r#"
        SELECT tenant_id, holiday_date, note
        FROM holidays
        ORDER BY holiday_date
        "#,
    )
    .fetch(pool);

    let mut total_count = 0usize;
    while let Some(row) = stream.next().await {
        let (tenant_id, date, note) = row.context("failed to read holiday row")?;
        calendar.add_holiday(tenant_id.as_deref(), date, note.as_deref().unwrap_or(""));
        total_count += 1;
    }

    info!(count = total_count, "Holiday calendar warmup complete");
    Ok(total_count)
}

#[derive(Debug, sqlx::FromRow)]
struct TenantSettingsRow {
    tenant_id: String,
    timezone: Option<String>,
    late_tolerance_minutes: Option<i32>,
    shift_start: Option<NaiveTime>,
    shift_end: Option<NaiveTime>,
}

/// Per-tenant policies; unset columns inherit from `default`
pub async fn load_policy_overrides(
    pool: &MySqlPool,
    default: &AttendancePolicy,
) -> Result<HashMap<String, AttendancePolicy>> {
    let rows = sqlx::query_as::<_, TenantSettingsRow>(
        r#"
        SELECT tenant_id, timezone, late_tolerance_minutes, shift_start, shift_end
        FROM tenant_settings
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to load tenant settings")?;

    let mut overrides = HashMap::with_capacity(rows.len());
    for row in rows {
        let timezone = match row.timezone.as_deref() {
            Some(name) => name.parse::<Tz>().map_err(|e| {
                anyhow!("tenant {} has an unknown timezone: {}", row.tenant_id, e)
            })?,
            None => default.timezone,
        };

        let default_schedule = match (row.shift_start, row.shift_end) {
            (Some(start), Some(end)) => WorkSchedule::new(start, end),
            _ => default.default_schedule,
        };

        overrides.insert(
            row.tenant_id,
            AttendancePolicy {
                tolerance_minutes: row
                    .late_tolerance_minutes
                    .map_or(default.tolerance_minutes, i64::from),
                timezone,
                default_schedule,
            },
        );
    }

    info!(count = overrides.len(), "Tenant attendance policies loaded");
    Ok(overrides)
}
