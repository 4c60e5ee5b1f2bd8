use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::model::attendance::WorkSchedule;

/// Per-tenant rules the status engine evaluates against
#[derive(Debug, Clone, PartialEq)]
pub struct AttendancePolicy {
    /// Grace period before a check-in counts as late (and before the end for early departure)
    pub tolerance_minutes: i64,
    /// Tenant timezone; all time-of-day comparisons happen in it
    pub timezone: Tz,
    /// Window used for employees without their own shift
    pub default_schedule: WorkSchedule,
}

impl AttendancePolicy {
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        instant.with_timezone(&self.timezone).time()
    }

    /// Instant of a tenant-local wall-clock time. A time repeated when the
    /// clocks go back resolves to its first occurrence; one skipped when they
    /// go forward is read an hour later.
    pub fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(time);
        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| {
                self.timezone
                    .from_local_datetime(&(local + Duration::hours(1)))
                    .earliest()
            })
            .map_or_else(|| local.and_utc(), |t| t.with_timezone(&Utc))
    }
}

/// Default policy plus tenant overrides loaded from `tenant_settings`
#[derive(Debug, Clone)]
pub struct AttendancePolicyBook {
    default: AttendancePolicy,
    overrides: HashMap<String, AttendancePolicy>,
}

impl AttendancePolicyBook {
    pub fn new(default: AttendancePolicy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, AttendancePolicy>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn default_policy(&self) -> &AttendancePolicy {
        &self.default
    }

    pub fn for_tenant(&self, tenant_id: &str) -> &AttendancePolicy {
        self.overrides.get(tenant_id).unwrap_or(&self.default)
    }
}
