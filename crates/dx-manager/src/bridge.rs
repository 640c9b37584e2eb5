//! reqwest implementation of [`ManagerClient`] against the manager HTTP
//! bridge.
//!
//! The bridge wraps the vendor manager SDK and exposes its calls as JSON
//! endpoints:
//!
//! | Operation          | Method | Path            |
//! |--------------------|--------|-----------------|
//! | Connect            | POST   | `/connect`      |
//! | Disconnect         | POST   | `/disconnect`   |
//! | Accounts by group  | GET    | `/users`        |
//! | Deals by logins    | POST   | `/deals/query`  |
//!
//! Vendor-side failures surface as a `{ code, message }` error descriptor in
//! the response body (the SDK's last-error accessor), which is how an empty
//! deal list is told apart from a silently failed fetch.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use dx_types::{DealRecord, ManagerError};

use crate::traits::ManagerClient;

/// Bridge endpoint and credentials, normally read from the environment.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL of the bridge, e.g. `http://127.0.0.1:8228`.
    pub base_url: String,
    /// Trading server address passed through to the vendor connect call.
    pub server: String,
    pub login: i64,
    pub password: String,
    pub connect_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
}

impl BridgeConfig {
    /// Read `DX_MANAGER_URL`, `DX_MANAGER_SERVER`, `DX_MANAGER_LOGIN` and
    /// `DX_MANAGER_PASSWORD` (required), plus optional timeout overrides
    /// `DX_CONNECT_TIMEOUT_MS` / `DX_FETCH_TIMEOUT_MS`.
    pub fn from_env() -> anyhow::Result<Self> {
        let need = |key: &str| {
            std::env::var(key).map_err(|_| anyhow::anyhow!("{key} not set"))
        };
        let login: i64 = need("DX_MANAGER_LOGIN")?
            .parse()
            .map_err(|_| anyhow::anyhow!("DX_MANAGER_LOGIN must be an integer login id"))?;
        let ms = |key: &str, default: u64| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };
        Ok(Self {
            base_url: need("DX_MANAGER_URL")?,
            server: need("DX_MANAGER_SERVER")?,
            login,
            password: need("DX_MANAGER_PASSWORD")?,
            connect_timeout_ms: ms("DX_CONNECT_TIMEOUT_MS", 30_000),
            fetch_timeout_ms: ms("DX_FETCH_TIMEOUT_MS", 60_000),
        })
    }
}

/// Vendor last-error descriptor as relayed by the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDescriptor {
    pub code: i32,
    pub message: String,
}

#[derive(Serialize)]
struct ConnectRequest<'a> {
    server: &'a str,
    login: i64,
    password: &'a str,
    timeout_ms: u64,
}

#[derive(Deserialize)]
struct ConnectResponse {
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDescriptor,
}

#[derive(Deserialize)]
struct AccountInfo {
    login: i64,
}

#[derive(Serialize)]
struct DealsRequest<'a> {
    logins: &'a [i64],
    from: NaiveDateTime,
    to: NaiveDateTime,
}

#[derive(Deserialize)]
struct DealsResponse {
    deals: Vec<DealRecord>,
    #[serde(default)]
    error: Option<ErrorDescriptor>,
}

/// HTTP-bridge manager session.
pub struct BridgeManagerClient {
    http: reqwest::Client,
    cfg: BridgeConfig,
    /// Session token issued by `/connect`; present while connected.
    token: Mutex<Option<String>>,
}

impl BridgeManagerClient {
    pub fn new(cfg: BridgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
            token: Mutex::new(None),
        }
    }

    async fn current_token(&self) -> Result<String, ManagerError> {
        self.token
            .lock()
            .await
            .clone()
            .ok_or(ManagerError::Session)
    }

    /// Pull the vendor error descriptor out of a non-success response body,
    /// falling back to the HTTP status line.
    async fn describe_failure(resp: reqwest::Response) -> (u16, String) {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (status, format!("{} (code {})", body.error.message, body.error.code)),
            Err(_) => (status, format!("HTTP {status}")),
        }
    }

    fn map_request_error(e: reqwest::Error, timeout_ms: u64) -> ManagerError {
        if e.is_timeout() {
            ManagerError::Timeout(timeout_ms)
        } else {
            ManagerError::Connect(e.to_string())
        }
    }
}

#[async_trait]
impl ManagerClient for BridgeManagerClient {
    async fn connect(&self) -> Result<(), ManagerError> {
        let url = format!("{}/connect", self.cfg.base_url);
        let req = ConnectRequest {
            server: &self.cfg.server,
            login: self.cfg.login,
            password: &self.cfg.password,
            timeout_ms: self.cfg.connect_timeout_ms,
        };
        let resp = self
            .http
            .post(&url)
            .json(&req)
            .timeout(Duration::from_millis(self.cfg.connect_timeout_ms))
            .send()
            .await
            .map_err(|e| Self::map_request_error(e, self.cfg.connect_timeout_ms))?;

        if !resp.status().is_success() {
            let (status, detail) = Self::describe_failure(resp).await;
            return Err(if status == 401 || status == 403 {
                ManagerError::Auth(detail)
            } else {
                ManagerError::Connect(detail)
            });
        }

        let body: ConnectResponse = resp
            .json()
            .await
            .map_err(|e| ManagerError::Connect(format!("bad connect response: {e}")))?;
        *self.token.lock().await = Some(body.token);
        info!(server = %self.cfg.server, login = self.cfg.login, "manager session established");
        Ok(())
    }

    async fn disconnect(&self) {
        let token = self.token.lock().await.take();
        let Some(token) = token else {
            return;
        };
        let url = format!("{}/disconnect", self.cfg.base_url);
        match self
            .http
            .post(&url)
            .bearer_auth(&token)
            .timeout(Duration::from_millis(self.cfg.connect_timeout_ms))
            .send()
            .await
        {
            Ok(_) => debug!("manager session released"),
            Err(e) => warn!(error = %e, "manager disconnect request failed"),
        }
    }

    async fn resolve_group_logins(&self, pattern: &str) -> Result<Vec<i64>, ManagerError> {
        let token = self.current_token().await?;
        let url = format!("{}/users", self.cfg.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(&[("group", pattern)])
            .timeout(Duration::from_millis(self.cfg.fetch_timeout_ms))
            .send()
            .await
            .map_err(|e| Self::map_request_error(e, self.cfg.fetch_timeout_ms))?;

        if !resp.status().is_success() {
            let (_, detail) = Self::describe_failure(resp).await;
            return Err(ManagerError::Fetch(detail));
        }

        let accounts: Vec<AccountInfo> = resp
            .json()
            .await
            .map_err(|e| ManagerError::Fetch(format!("bad accounts response: {e}")))?;
        debug!(pattern, count = accounts.len(), "resolved account group");
        Ok(accounts.into_iter().map(|a| a.login).collect())
    }

    async fn fetch_deals(
        &self,
        logins: &[i64],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<DealRecord>, ManagerError> {
        let token = self.current_token().await?;
        let url = format!("{}/deals/query", self.cfg.base_url);
        let req = DealsRequest {
            logins,
            from: start,
            to: end,
        };
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&req)
            .timeout(Duration::from_millis(self.cfg.fetch_timeout_ms))
            .send()
            .await
            .map_err(|e| Self::map_request_error(e, self.cfg.fetch_timeout_ms))?;

        if !resp.status().is_success() {
            let (_, detail) = Self::describe_failure(resp).await;
            return Err(ManagerError::Fetch(detail));
        }

        let body: DealsResponse = resp
            .json()
            .await
            .map_err(|e| ManagerError::Fetch(format!("bad deals response: {e}")))?;

        // The vendor call can "succeed" with an empty list while the SDK
        // holds a last error; the bridge forwards that descriptor so the
        // empty-vs-failed ambiguity is settled here.
        if let Some(err) = body.error {
            return Err(ManagerError::Fetch(format!(
                "{} (code {})",
                err.message, err.code
            )));
        }
        Ok(body.deals)
    }
}
