//! Optional Telegram notifications about uploads, settings changes and
//! power events.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::TelegramOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Upload {
        filename: String,
    },
    SettingChanged {
        key: String,
        old: String,
        new: String,
    },
    SystemAlert {
        kind: String,
        message: String,
    },
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Notification {
    pub fn message(&self) -> String {
        match self {
            Self::Upload { filename } => format!("New image uploaded: {filename}"),
            Self::SettingChanged { key, old, new } => {
                format!("Setting changed: {key}: {old} -> {new}")
            }
            Self::SystemAlert { kind, message } => format!("[{kind}] {message}"),
            Self::Error {
                message,
                context: Some(context),
            } => format!("Error: {message} ({context})"),
            Self::Error {
                message,
                context: None,
            } => format!("Error: {message}"),
        }
    }
}

#[derive(Debug)]
struct Telegram {
    http: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl Telegram {
    async fn send(&self, text: &str) -> Result<()> {
        self.http
            .post(&self.endpoint)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .context("failed to reach telegram")?
            .error_for_status()
            .context("telegram rejected the message")?;
        Ok(())
    }
}

/// Cheap to clone; a disabled notifier drops everything.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    telegram: Option<Arc<Telegram>>,
}

impl Notifier {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_config(opts: Option<&TelegramOptions>) -> Result<Self> {
        let Some(opts) = opts else {
            return Ok(Self::disabled());
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            telegram: Some(Arc::new(Telegram {
                http,
                endpoint: format!("https://api.telegram.org/bot{}/sendMessage", opts.bot_token),
                chat_id: opts.chat_id.clone(),
            })),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.telegram.is_some()
    }

    /// Deliver in the background; failures are only logged.
    pub fn notify(&self, notification: Notification) {
        let Some(telegram) = self.telegram.clone() else {
            return;
        };
        let text = notification.message();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(message = %text, "no runtime available; notification dropped");
            return;
        };
        runtime.spawn(async move {
            match telegram.send(&text).await {
                Ok(()) => debug!(message = %text, "notification sent"),
                Err(err) => warn!(error = ?err, "notification failed"),
            }
        });
    }
}
