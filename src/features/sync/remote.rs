//! Remote data store.
//!
//! The hosted backend exposes PostgREST-style row CRUD under
//! `{base_url}/rest/v1/{table}`. Only the `sessions` table and the daily
//! rollup RPC are used here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::debug;

use super::operation::{PendingWrite, WriteMethod, SESSIONS_TABLE};
use crate::config::RemoteConfig;
use crate::error::FocusError;
use crate::features::focus::Session;

/// Row-level access to the remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Replay one outbox write.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::Remote` when the store is unreachable or rejects
    /// the write.
    async fn send(&self, write: &PendingWrite) -> Result<(), FocusError>;

    /// Fetch every session row owned by `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::Remote` when the store is unreachable.
    async fn fetch_sessions(&self, owner_id: &str) -> Result<Vec<Session>, FocusError>;
}

/// HTTP implementation of [`RemoteStore`].
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestStore {
    /// Create a store for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FocusError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FocusError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build a store from configuration. Returns `None` without a URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &RemoteConfig) -> Result<Option<Self>, FocusError> {
        config
            .url
            .as_ref()
            .map(|url| {
                Self::new(
                    url.clone(),
                    config.api_key.clone(),
                    Duration::from_secs(config.timeout_secs),
                )
            })
            .transpose()
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }
}

const fn http_method(method: WriteMethod) -> Method {
    match method {
        WriteMethod::Post => Method::POST,
        WriteMethod::Patch => Method::PATCH,
        WriteMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn send(&self, write: &PendingWrite) -> Result<(), FocusError> {
        let url = format!("{}{}", self.base_url, write.url);
        debug!(method = %write.method, %url, "sending write");

        let mut request = self
            .client
            .request(http_method(write.method), &url)
            .header("Content-Type", "application/json");
        for (name, value) in &write.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &write.body {
            request = request.body(body.clone());
        }

        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(FocusError::Remote(format!("{status}: {detail}")));
        }

        Ok(())
    }

    async fn fetch_sessions(&self, owner_id: &str) -> Result<Vec<Session>, FocusError> {
        let url = format!("{}/rest/v1/{SESSIONS_TABLE}", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("owner_id", format!("eq.{owner_id}")), ("select", "*".to_string())]);

        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FocusError::Remote(format!("{status} fetching sessions")));
        }

        Ok(response.json().await?)
    }
}

/// In-process [`RemoteStore`] that records writes.
///
/// Can be switched offline to exercise the outbox.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    online: AtomicBool,
    sent: Mutex<Vec<PendingWrite>>,
    sessions: Mutex<Vec<Session>>,
}

impl MemoryRemote {
    /// Create an online store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Toggle reachability.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Writes accepted so far, in arrival order.
    #[must_use]
    pub fn sent(&self) -> Vec<PendingWrite> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Seed rows returned by `fetch_sessions`.
    pub fn seed_sessions(&self, sessions: Vec<Session>) {
        *self.sessions.lock().unwrap_or_else(PoisonError::into_inner) = sessions;
    }

    fn check_online(&self) -> Result<(), FocusError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FocusError::Remote("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn send(&self, write: &PendingWrite) -> Result<(), FocusError> {
        self.check_online()?;
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(write.clone());
        Ok(())
    }

    async fn fetch_sessions(&self, owner_id: &str) -> Result<Vec<Session>, FocusError> {
        self.check_online()?;
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.owner_id.as_deref() == Some(owner_id))
            .cloned()
            .collect())
    }
}
