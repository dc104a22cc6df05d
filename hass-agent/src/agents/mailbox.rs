//! Mailbox folder counts agent
//!
//! Polls a remote mailbox service for per-folder totals and unread counts.
//! When the service signals it is overloaded the agent backs off until the
//! requested time has passed.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::discovery::{SensorDescriptor, SensorPublisher};
use crate::error::{MailboxError, Result};

/// Ticks between executions unless configured otherwise.
pub const DEFAULT_UPDATE_FREQUENCY: u32 = 5;

/// Backoff used when a busy signal carries no usable delay.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FolderCounts {
    pub name: String,
    pub total: u64,
    pub unread: u64,
}

#[derive(Debug, Deserialize)]
struct FolderListing {
    folders: Vec<FolderCounts>,
}

/// Remote mailbox the agent reads folder counts from.
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    /// One-time setup before the first poll.
    async fn connect(&mut self) -> std::result::Result<(), MailboxError>;

    /// Inbox and its subfolders.
    async fn folders(&self) -> std::result::Result<Vec<FolderCounts>, MailboxError>;
}

/// Mailbox exposed as a JSON endpoint returning `{"folders": [...]}`.
pub struct HttpMailboxProvider {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpMailboxProvider {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl MailboxProvider for HttpMailboxProvider {
    async fn connect(&mut self) -> std::result::Result<(), MailboxError> {
        self.client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("hass-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        debug!("Connected to {}", self.url);
        Ok(())
    }

    async fn folders(&self) -> std::result::Result<Vec<FolderCounts>, MailboxError> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(MailboxError::ServerBusy {
                retry_after: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            return Err(MailboxError::Remote(format!("{} returned {}", self.url, status)));
        }

        let listing: FolderListing = response.json().await?;
        Ok(listing.folders)
    }
}

/// Delay from a `Retry-After` header given in seconds.
fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

pub struct MailboxAgent {
    publisher: SensorPublisher,
    provider: Box<dyn MailboxProvider>,
    backoff: Backoff,
}

impl MailboxAgent {
    pub fn new(publisher: SensorPublisher, provider: Box<dyn MailboxProvider>) -> Self {
        Self {
            publisher,
            provider,
            backoff: Backoff::new(),
        }
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub async fn start(&mut self) -> std::result::Result<(), MailboxError> {
        self.provider.connect().await
    }

    pub async fn execute(&mut self) -> Result<()> {
        self.execute_at(Utc::now()).await
    }

    /// One poll as of `now`. Provider failures never abort the cycle; only
    /// publish errors propagate.
    pub async fn execute_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.backoff.is_active(now) {
            if let Some(next) = self.backoff.next_allowed() {
                debug!("Execute: Skip (next sync at {})", next);
            }
            return Ok(());
        }

        debug!("Execute: Start");
        self.publisher.begin_cycle();

        match self.provider.folders().await {
            Ok(folders) => {
                debug!(
                    "Folders: {}",
                    folders
                        .iter()
                        .map(|folder| folder.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                for folder in &folders {
                    self.publish_folder(folder).await?;
                }
            }
            Err(MailboxError::ServerBusy { retry_after }) => {
                warn!("Server busy; wait {} ms", retry_after.as_millis());
                self.backoff.defer(now, retry_after);
            }
            Err(e) => warn!("Mailbox poll failed: {}", e),
        }

        debug!("Execute: Finish");
        Ok(())
    }

    async fn publish_folder(&mut self, folder: &FolderCounts) -> Result<()> {
        for (suffix, count) in [("total", folder.total), ("unread", folder.unread)] {
            let sensor = SensorDescriptor::sensor(format!("{} {}", folder.name, suffix))
                .icon("mdi:email")
                .measurement()
                .unit("emails")
                .diagnostic();
            self.publisher
                .publish_sensor(&sensor, Some(count.to_string()))
                .await?;
        }
        Ok(())
    }
}
