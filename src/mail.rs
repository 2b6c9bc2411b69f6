//! Outbound email for password setup links.
//!
//! [`SmtpMailer`] speaks SMTP through lettre's async tokio transport. With no
//! SMTP server configured it runs in no-op mode and only logs what it would
//! have sent.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{info, warn};

use crate::config::MailConfig;
use crate::errors::{Result, SchoolError};

/// Why a setup link is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPurpose {
    Invitation,
    PasswordReset,
}

/// Everything the mailer needs to deliver one setup link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupEmail {
    pub recipient: String,
    pub recipient_name: String,
    /// Human readable role, e.g. "Administrator" or "Teacher"
    pub role_label: String,
    pub setup_link: String,
    pub expiry_minutes: i64,
    pub purpose: SetupPurpose,
}

impl SetupEmail {
    pub fn subject(&self) -> &'static str {
        match self.purpose {
            SetupPurpose::Invitation => "Set Your Password - School Management System",
            SetupPurpose::PasswordReset => "Reset Your Password - School Management System",
        }
    }

    pub fn body(&self) -> String {
        let intro = match self.purpose {
            SetupPurpose::Invitation => format!(
                "You have been invited to join the School Management System as {}.",
                self.role_label
            ),
            SetupPurpose::PasswordReset => {
                "A password reset was requested for your School Management System account."
                    .to_string()
            }
        };

        format!(
            "Hello {name},\n\n{intro}\n\nPlease set your password by opening the following link:\n{link}\n\nThis link will expire in {minutes} minutes.\n\nIf you did not expect this email, please ignore it.\n\nBest regards,\nSchool Management System",
            name = self.recipient_name,
            intro = intro,
            link = self.setup_link,
            minutes = self.expiry_minutes,
        )
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_setup_email(&self, email: &SetupEmail) -> Result<()>;
}

pub type SharedMailer = Arc<dyn Mailer>;

/// SMTP mailer (or no-op logger when no server is configured)
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse::<Mailbox>()
            .map_err(|e| SchoolError::config(format!("Invalid MAIL_FROM address: {}", e)))?;

        let transport = if !config.is_enabled() {
            warn!("MAIL_SERVER not configured; setup emails will only be logged");
            None
        } else {
            let builder = if config.starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)
            }
            .map_err(|e| SchoolError::config(format!("Failed to configure SMTP transport: {}", e)))?
            .port(config.port);

            let builder = match (&config.username, &config.password) {
                (Some(username), Some(password)) => {
                    builder.credentials(Credentials::new(username.clone(), password.clone()))
                }
                _ => builder,
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self { transport, from })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_setup_email(&self, email: &SetupEmail) -> Result<()> {
        let Some(transport) = &self.transport else {
            info!(
                recipient = %email.recipient,
                setup_link = %email.setup_link,
                "Mailer in no-op mode; skipping actual send"
            );
            return Ok(());
        };

        let to = email
            .recipient
            .parse::<Mailbox>()
            .map_err(|e| SchoolError::mail(format!("Invalid recipient address: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject())
            .header(header::ContentType::TEXT_PLAIN)
            .body(email.body())
            .map_err(|e| SchoolError::mail(format!("Failed to build email message: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| SchoolError::mail(format!("Failed to send email: {}", e)))?;

        info!(recipient = %email.recipient, "setup email sent");
        Ok(())
    }
}
