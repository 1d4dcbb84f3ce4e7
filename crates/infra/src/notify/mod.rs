//! Notification boundary (outbound mail to suppliers).
//!
//! Sends are best-effort and independent of persistence: a transition that
//! persisted but failed to notify still succeeds, with the failure surfaced
//! as an advisory [`NotificationWarning`].

#[cfg(feature = "smtp")]
mod smtp;

#[cfg(feature = "smtp")]
pub use smtp::{SmtpConfig, SmtpNotifier};

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// File attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    /// MIME type, e.g. "text/plain".
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Outbound notification: recipient, subject, body, optional attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

/// Notification delivery error.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid recipient: {0}")]
    Recipient(String),

    #[error("send failed: {0}")]
    Send(String),
}

/// Outbound notification sender.
///
/// Callers bound each send with a timeout and treat any failure as advisory;
/// retry policy, if any, lives behind the implementation.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, message: NotificationMessage) -> Result<(), NotifyError>;
}

#[async_trait]
impl<N> NotificationSender for Arc<N>
where
    N: NotificationSender + ?Sized,
{
    async fn send(&self, message: NotificationMessage) -> Result<(), NotifyError> {
        (**self).send(message).await
    }
}

/// Non-fatal delivery problem attached to an otherwise successful transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationWarning {
    /// The supplier has no stored email; no send was attempted.
    NoRecipient,
    /// The send did not complete within the configured timeout.
    Timeout,
    /// The sender reported a failure.
    Failed(String),
}

impl core::fmt::Display for NotificationWarning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NotificationWarning::NoRecipient => {
                f.write_str("the supplier has no email address on file")
            }
            NotificationWarning::Timeout => f.write_str("the notification timed out"),
            NotificationWarning::Failed(reason) => {
                write!(f, "the notification failed: {reason}")
            }
        }
    }
}

/// Recording sender for tests/dev: stores every message instead of sending,
/// and can be armed to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationMessage>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message accepted so far, in send order.
    pub fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Make every subsequent send fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        if let Ok(mut fail_with) = self.fail_with.lock() {
            *fail_with = Some(reason.into());
        }
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, message: NotificationMessage) -> Result<(), NotifyError> {
        let armed_failure = self
            .fail_with
            .lock()
            .ok()
            .and_then(|fail_with| fail_with.clone());
        if let Some(reason) = armed_failure {
            return Err(NotifyError::Send(reason));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
        Ok(())
    }
}
