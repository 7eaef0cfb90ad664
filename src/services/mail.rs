use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{HookflowError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub to: String,
    pub from: Option<String>,
    pub subject: String,
    pub body: String,
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        message: &MailMessage,
    ) -> Result<()>;
}

/// Default transport: writes each message to the log and reports success.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        message: &MailMessage,
    ) -> Result<()> {
        info!(to = %message.to, subject = %message.subject, "mail transport not configured, message logged only");
        Ok(())
    }
}

/// Keeps every message in memory; recipients listed in `reject` fail.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<MailMessage>>>,
    reject: Arc<Mutex<Vec<String>>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(
        &self,
        recipient: &str,
    ) {
        if let Ok(mut reject) = self.reject.lock() {
            reject.push(recipient.to_string());
        }
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        message: &MailMessage,
    ) -> Result<()> {
        let rejected = self.reject.lock().map_err(|e| HookflowError::Action(e.to_string()))?.contains(&message.to);
        if rejected {
            return Err(HookflowError::Action(format!("mailbox '{}' unavailable", message.to)));
        }
        self.sent.lock().map_err(|e| HookflowError::Action(e.to_string()))?.push(message.clone());
        Ok(())
    }
}
