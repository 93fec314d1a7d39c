//! Outbound mail.
//!
//! `MailTransport` is the seam between the export flow and delivery. The
//! production implementation is `SmtpMailer` (blocking lettre SMTP client);
//! tests substitute a recording transport.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use wrfsel_config::{get_smtp_password, MailSettings, SMTP_PASSWORD_ENV};

/// Port where the relay expects TLS from the first byte (SMTPS).
const IMPLICIT_TLS_PORT: u16 = 465;

/// A message ready to hand to a transport. Attachments are read at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    /// CSV files attached as `text/csv`, named after the file.
    pub attachments: Vec<PathBuf>,
}

/// Error type for mail delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// Relay settings or credentials missing/unusable. Never retried.
    Config(String),
    /// A sender or recipient address did not parse.
    Address(String),
    /// Attachment could not be read
    Io(String),
    /// Relay unreachable, timed out or rejected the message.
    Transport(String),
}

impl MailError {
    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MailError::Transport(_))
    }
}

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::Config(msg) => write!(f, "Mail configuration error: {}", msg),
            MailError::Address(msg) => write!(f, "Invalid address: {}", msg),
            MailError::Io(msg) => write!(f, "I/O error: {}", msg),
            MailError::Transport(msg) => write!(f, "Mail transport error: {}", msg),
        }
    }
}

impl std::error::Error for MailError {}

/// Delivers one outbound message.
pub trait MailTransport: Send + Sync {
    fn send(&self, message: &OutboundMessage) -> Result<(), MailError>;
}

/// SMTP relay transport (blocking, no async runtime).
///
/// The password is resolved on every send so a keychain or environment
/// change is picked up without restarting the server.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    settings: MailSettings,
}

impl SmtpMailer {
    pub fn new(settings: MailSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MailSettings {
        &self.settings
    }

    fn transport(&self, password: String) -> Result<SmtpTransport, MailError> {
        let host = self.settings.smtp_host.trim();
        let builder = if self.settings.smtp_port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(host)
        } else {
            SmtpTransport::starttls_relay(host)
        }
        .map_err(|e| MailError::Config(format!("SMTP relay {}: {}", host, e)))?;

        Ok(builder
            .port(self.settings.smtp_port)
            .credentials(Credentials::new(
                self.settings.effective_username().to_string(),
                password,
            ))
            .timeout(Some(Duration::from_secs(self.settings.timeout_secs)))
            .build())
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, message: &OutboundMessage) -> Result<(), MailError> {
        let missing = self.settings.missing_fields();
        if !missing.is_empty() {
            return Err(MailError::Config(format!("missing settings: {}", missing.join(", "))));
        }

        let password = get_smtp_password(self.settings.effective_username())
            .key
            .ok_or_else(|| {
                MailError::Config(format!(
                    "no SMTP password in the keychain or {}",
                    SMTP_PASSWORD_ENV
                ))
            })?;

        let email = build_message(message)?;
        let transport = self.transport(password)?;

        log::debug!(
            "Sending mail via {}:{} to {} recipient(s)",
            self.settings.smtp_host,
            self.settings.smtp_port,
            message.to.len()
        );
        transport
            .send(&email)
            .map(|_| ())
            .map_err(|e| MailError::Transport(e.to_string()))
    }
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| MailError::Address(format!("'{}': {}", address, e)))
}

/// Build the MIME message: plain-text body followed by one `text/csv` part
/// per attachment.
pub fn build_message(message: &OutboundMessage) -> Result<Message, MailError> {
    let mut builder = Message::builder()
        .from(mailbox(&message.from)?)
        .subject(message.subject.clone());
    for to in &message.to {
        builder = builder.to(mailbox(to)?);
    }

    let csv_type = ContentType::parse("text/csv").map_err(|e| MailError::Config(e.to_string()))?;
    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(message.body.clone()));
    for path in &message.attachments {
        let content = fs::read(path).map_err(|e| MailError::Io(format!("{}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "selection.csv".to_string());
        parts = parts.singlepart(Attachment::new(name).body(content, csv_type.clone()));
    }

    builder
        .multipart(parts)
        .map_err(|e| MailError::Config(format!("Failed to build message: {}", e)))
}
