//! SMTP notification sender (lettre).

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{NotificationMessage, NotificationSender, NotifyError};

/// SMTP relay configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// From address, e.g. "Procura <no-reply@example.com>".
    pub from: String,
}

/// Outbound sender backed by an SMTP relay (STARTTLS).
pub struct SmtpNotifier {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Result<Self, NotifyError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| NotifyError::Recipient(format!("invalid from address: {e}")))?;

        let credentials = Credentials::new(config.user, config.password);
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| NotifyError::Send(format!("failed to create SMTP relay: {e}")))?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self { from, transport })
    }
}

#[async_trait]
impl NotificationSender for SmtpNotifier {
    async fn send(&self, message: NotificationMessage) -> Result<(), NotifyError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| NotifyError::Recipient(format!("invalid recipient: {e}")))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone());

        let mail = match message.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    NotifyError::Send(format!("invalid attachment content type: {e}"))
                })?;
                builder
                    .multipart(
                        MultiPart::mixed()
                            .singlepart(
                                SinglePart::builder()
                                    .header(ContentType::TEXT_PLAIN)
                                    .body(message.body),
                            )
                            .singlepart(
                                MailAttachment::new(attachment.filename)
                                    .body(attachment.content, content_type),
                            ),
                    )
                    .map_err(|e| NotifyError::Send(format!("failed to build message: {e}")))?
            }
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.body)
                .map_err(|e| NotifyError::Send(format!("failed to build message: {e}")))?,
        };

        self.transport
            .send(mail)
            .await
            .map_err(|e| NotifyError::Send(format!("send failed: {e}")))?;

        tracing::info!(to = %message.to, subject = %message.subject, "notification sent");
        Ok(())
    }
}
