use std::env;
use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use dotenvy::dotenv;

use crate::calendar::parse_weekend;
use crate::model::attendance::WorkSchedule;
use crate::policy::AttendancePolicy;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,
    pub rate_push_per_min: u32,

    // Attendance policy defaults, overridable per tenant
    pub late_tolerance_minutes: i64,
    pub default_timezone: Tz,
    pub default_shift_start: NaiveTime,
    pub default_shift_end: NaiveTime,
    pub weekend_days: Vec<Weekday>,

    // Devices
    pub sync_lease_minutes: i64,
    pub employee_cache_ttl_secs: u64,
    pub device_http_timeout_secs: u64,
}

fn var_or<T>(key: &str, default: &str) -> T
where
    T: FromStr,
    T::Err: std::fmt::Debug,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|e| panic!("{} is invalid: {:?}", key, e))
}

fn time_or(key: &str, default: &str) -> NaiveTime {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
        .unwrap_or_else(|_| panic!("{} must be HH:MM, got {}", key, raw))
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let weekend = env::var("WEEKEND_DAYS").unwrap_or_else(|_| "Sat,Sun".to_string());

        Self {
            server_addr: env::var("SERVER_ADDR").expect("SERVER_ADDR must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            rate_protected_per_min: var_or("RATE_PROTECTED_PER_MIN", "1000"),
            rate_push_per_min: var_or("RATE_PUSH_PER_MIN", "600"),

            late_tolerance_minutes: var_or("LATE_TOLERANCE_MINUTES", "0"),
            default_timezone: var_or("DEFAULT_TIMEZONE", "UTC"),
            default_shift_start: time_or("DEFAULT_SHIFT_START", "09:00"),
            default_shift_end: time_or("DEFAULT_SHIFT_END", "17:00"),
            weekend_days: parse_weekend(&weekend)
                .unwrap_or_else(|e| panic!("WEEKEND_DAYS is invalid: {}", e)),

            sync_lease_minutes: var_or("SYNC_LEASE_MINUTES", "30"),
            employee_cache_ttl_secs: var_or("EMPLOYEE_CACHE_TTL_SECS", "300"),
            device_http_timeout_secs: var_or("DEVICE_HTTP_TIMEOUT_SECS", "30"),
        }
    }

    /// Policy for tenants without their own settings row
    pub fn default_policy(&self) -> AttendancePolicy {
        AttendancePolicy {
            tolerance_minutes: self.late_tolerance_minutes,
            timezone: self.default_timezone,
            default_schedule: WorkSchedule::new(self.default_shift_start, self.default_shift_end),
        }
    }
}
