//! Selection export and mail delivery.

pub mod export;
pub mod mail;

pub use export::{export_and_notify, export_file_name, ExportError, ExportOptions, ExportReceipt};
pub use mail::{build_message, MailError, MailTransport, OutboundMessage, SmtpMailer};
