use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::DeviceLogSource;
use crate::model::device::{Device, Direction, RawLogEntry};

const TRANSACTIONS_PATH: &str = "/iclock/api/transactions/";
const TOKEN_AUTH_PATH: &str = "/api-token-auth/";
const PUNCH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const PAGE_SIZE: u32 = 500;
/// Upper bound on pages per sync; the rest is picked up next run
const MAX_PAGES: usize = 200;

#[derive(Debug, Deserialize)]
struct TransactionPage {
    next: Option<String>,
    #[serde(default)]
    data: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    emp_code: String,
    punch_time: String,
    punch_state: String,
}

#[derive(Debug, Serialize)]
struct TokenAuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenAuthResponse {
    token: Option<String>,
}

/// Connection settings read from `Device::connection`
#[derive(Debug, Deserialize)]
struct Connection {
    url: String,
    api_token: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Pulls punch transactions from a BioTime server's REST API
pub struct BioTimeLogSource {
    client: Client,
}

impl BioTimeLogSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build device HTTP client")?;

        Ok(Self { client })
    }

    async fn token(&self, base_url: &str, connection: &Connection) -> Result<String> {
        if let Some(token) = connection.api_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }

        let (Some(username), Some(password)) = (&connection.username, &connection.password) else {
            bail!("device connection has neither api_token nor username/password");
        };

        let response = self
            .client
            .post(format!("{}{}", base_url, TOKEN_AUTH_PATH))
            .json(&TokenAuthRequest { username, password })
            .send()
            .await
            .context("token request failed")?
            .error_for_status()
            .context("token request rejected")?
            .json::<TokenAuthResponse>()
            .await
            .context("malformed token response")?;

        response
            .token
            .ok_or_else(|| anyhow!("device server returned no token"))
    }
}

/// Map one page of transactions to raw entries. Rows with an unparseable
/// time are skipped; an unknown punch state leaves the direction open.
fn entries_from_page(
    device_id: u64,
    transactions: Vec<Transaction>,
    timezone: Tz,
) -> Vec<RawLogEntry> {
    transactions
        .into_iter()
        .filter_map(|t| {
            let local = match NaiveDateTime::parse_from_str(&t.punch_time, PUNCH_TIME_FORMAT) {
                Ok(local) => local,
                Err(_) => {
                    warn!(device_id, punch_time = %t.punch_time, "Skipping transaction with bad time");
                    return None;
                }
            };
            // the repeated hour after clocks go back resolves to its first pass
            let timestamp = timezone.from_local_datetime(&local).earliest()?.with_timezone(&Utc);

            let direction_hint = match t.punch_state.as_str() {
                "0" => Some(Direction::CheckIn),
                "1" => Some(Direction::CheckOut),
                _ => None,
            };

            Some(RawLogEntry {
                device_id: Some(device_id),
                external_employee_id: t.emp_code,
                timestamp,
                direction_hint,
            })
        })
        .collect()
}

#[async_trait]
impl DeviceLogSource for BioTimeLogSource {
    async fn fetch_logs(
        &self,
        device: &Device,
        timezone: Tz,
    ) -> Result<Vec<RawLogEntry>> {
        let connection: Connection = serde_json::from_value(device.connection.clone())
            .context("device connection is missing a url")?;
        let base_url = connection.url.trim_end_matches('/').to_string();
        let token = self.token(&base_url, &connection).await?;

        let mut query = vec![("page_size", PAGE_SIZE.to_string())];
        if let Some(last_sync) = device.last_sync {
            let local = last_sync.with_timezone(&timezone).naive_local();
            query.push(("start_time", local.format(PUNCH_TIME_FORMAT).to_string()));
        }

        let mut entries = Vec::new();
        let mut request = self
            .client
            .get(format!("{}{}", base_url, TRANSACTIONS_PATH))
            .query(&query);

        for _ in 0..MAX_PAGES {
            let page = request
                .header(AUTHORIZATION, format!("Token {}", token))
                .header(ACCEPT, "application/json")
                .send()
                .await
                .context("transaction request failed")?
                .error_for_status()
                .context("transaction request rejected")?
                .json::<TransactionPage>()
                .await
                .context("malformed transaction page")?;

            debug!(device_id = device.id, rows = page.data.len(), "Fetched transaction page");
            entries.extend(entries_from_page(device.id, page.data, timezone));

            match page.next {
                Some(next) => request = self.client.get(next),
                None => break,
            }
        }

        info!(device_id = device.id, count = entries.len(), "Device logs fetched");
        Ok(entries)
    }
}
