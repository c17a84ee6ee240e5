//! Outgoing mail: verification links, password resets and export attachments.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::{MailConfig, MailDriver};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("Invalid attachment content type: {0}")]
    ContentType(String),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

impl MailMessage {
    pub fn verify_email(to: &str, name: &str, url: &str, expire_minutes: i64) -> Self {
        Self {
            to: to.to_string(),
            subject: "Verify Email Address".to_string(),
            body: format!(
                "Hello {name},\n\nPlease click the link below to verify your email address.\n\n{url}\n\n\
                 This link will expire in {expire_minutes} minutes.\n\nIf you did not create an account, no further action is required.\n"
            ),
            attachment: None,
        }
    }

    pub fn reset_password(to: &str, url: &str, expire_minutes: i64) -> Self {
        Self {
            to: to.to_string(),
            subject: "Reset Password Notification".to_string(),
            body: format!(
                "You are receiving this email because we received a password reset request for your account.\n\n{url}\n\n\
                 This password reset link will expire in {expire_minutes} minutes.\n\nIf you did not request a password reset, no further action is required.\n"
            ),
            attachment: None,
        }
    }

    pub fn export_ready(to: &str, model: &str, columns: &[String], attachment: Attachment) -> Self {
        let listed: String = columns.iter().map(|c| format!("- {}\n", c)).collect();
        Self {
            to: to.to_string(),
            subject: format!("{} Export Ready", model),
            body: format!(
                "Your {} export is ready and attached to this email.\n\nThe export includes the following columns:\n{}",
                model.to_lowercase(),
                listed
            ),
            attachment: Some(attachment),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            attachment = message.attachment.as_ref().map(|a| a.filename.as_str()),
            "mail (log driver)\n{}",
            message.body
        );
        Ok(())
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let builder = if config.encryption.as_deref() == Some("tls") {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let mut builder = builder.port(config.port);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let from = Mailbox::new(Some(config.from_name.clone()), config.from_address.parse()?);
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

/// Build the lettre message for a [`MailMessage`]
pub fn build_message(from: &Mailbox, message: MailMessage) -> Result<Message, MailError> {
    let builder = Message::builder()
        .from(from.clone())
        .to(message.to.parse()?)
        .subject(message.subject);

    let email = match message.attachment {
        None => builder.singlepart(SinglePart::plain(message.body))?,
        Some(attachment) => {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|_| MailError::ContentType(attachment.content_type.clone()))?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(message.body))
                    .singlepart(MailAttachment::new(attachment.filename).body(attachment.data, content_type)),
            )?
        }
    };
    Ok(email)
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let to = message.to.clone();
        let email = build_message(&self.from, message)?;
        self.transport.send(email).await?;
        tracing::info!(to = %to, "mail sent");
        Ok(())
    }
}

/// Pick the mailer for the configured driver
pub fn mailer_from_config(config: &MailConfig) -> Result<Box<dyn Mailer>, MailError> {
    Ok(match config.driver {
        MailDriver::Smtp => Box::new(SmtpMailer::new(config)?),
        MailDriver::Log => Box::new(LogMailer),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from() -> Mailbox {
        "Atlas <hello@example.com>".parse().unwrap()
    }

    #[test]
    fn export_mail_lists_columns_and_attaches_file() {
        let message = MailMessage::export_ready(
            "ops@example.com",
            "User",
            &["name".to_string(), "email".to_string()],
            Attachment {
                filename: "user_export.csv".into(),
                content_type: "text/csv".into(),
                data: b"name,email\n".to_vec(),
            },
        );
        assert_eq!(message.subject, "User Export Ready");
        assert!(message.body.contains("- name\n- email\n"));

        let built = String::from_utf8(build_message(&from(), message).unwrap().formatted()).unwrap();
        assert!(built.contains("user_export.csv"));
        assert!(built.contains("multipart/mixed"));
    }

    #[test]
    fn invalid_recipient_is_an_address_error() {
        let message = MailMessage::reset_password("not an email", "http://x", 60);
        assert!(matches!(build_message(&from(), message), Err(MailError::Address(_))));
    }

    #[tokio::test]
    async fn log_mailer_accepts_everything() {
        LogMailer
            .send(MailMessage::verify_email("a@example.com", "A", "http://x", 60))
            .await
            .unwrap();
    }
}
