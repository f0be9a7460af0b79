//! SMTP reminder delivery (STARTTLS relay with login credentials).

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info, warn};

use super::{Notifier, ReminderMessage};
use crate::config::MailConfig;

struct SmtpChannel {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

/// [`Notifier`] that sends plain-text mail through an authenticated SMTP relay.
///
/// Built without usable credentials it stays inert: every send logs a
/// warning and reports failure, leaving the reminder pending.
pub struct SmtpNotifier {
    channel: Option<SmtpChannel>,
}

impl SmtpNotifier {
    /// Build from mail config. Never fails; problems leave the notifier unconfigured.
    pub fn from_config(config: &MailConfig) -> Self {
        let Some((sender, password)) = config.credentials() else {
            warn!("mail credentials not set; reminder emails will not be delivered");
            return Self { channel: None };
        };

        let from = match sender.parse::<Mailbox>() {
            Ok(from) => from,
            Err(e) => {
                warn!(sender, "mail sender is not a valid address: {e}");
                return Self { channel: None };
            }
        };

        let transport = match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        {
            Ok(builder) => builder
                .port(config.smtp_port)
                .credentials(Credentials::new(sender.to_owned(), password.to_owned()))
                .build(),
            Err(e) => {
                warn!(host = %config.smtp_host, "cannot configure SMTP relay: {e}");
                return Self { channel: None };
            }
        };

        debug!(
            host = %config.smtp_host,
            port = config.smtp_port,
            "SMTP notifier configured"
        );
        Self {
            channel: Some(SmtpChannel { from, transport }),
        }
    }

    /// Returns `true` when credentials and relay are set up.
    pub fn is_configured(&self) -> bool {
        self.channel.is_some()
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, message: &ReminderMessage) -> bool {
        let Some(channel) = &self.channel else {
            warn!(
                recipient = %message.recipient,
                task = %message.task_title,
                "mail credentials not set; skipping reminder email"
            );
            return false;
        };

        let email = match build_message(&channel.from, message) {
            Ok(email) => email,
            Err(e) => {
                warn!(
                    recipient = %message.recipient,
                    task = %message.task_title,
                    "cannot build reminder email: {e}"
                );
                return false;
            }
        };

        match channel.transport.send(email).await {
            Ok(_) => {
                info!(recipient = %message.recipient, "reminder email sent");
                true
            }
            Err(e) => {
                warn!(
                    recipient = %message.recipient,
                    task = %message.task_title,
                    "failed to send reminder email: {e}"
                );
                false
            }
        }
    }
}

fn build_message(from: &Mailbox, message: &ReminderMessage) -> Result<Message, String> {
    let to = message
        .recipient
        .parse::<Mailbox>()
        .map_err(|e| format!("invalid recipient '{}': {e}", message.recipient))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(message.subject())
        .header(ContentType::TEXT_PLAIN)
        .body(message.body())
        .map_err(|e| e.to_string())
}
