// Configuration loading

pub mod mail;
pub mod settings;

pub use mail::{
    get_smtp_password, keychain_available, set_smtp_password, KeyLookup, KeySource, MailConfigStatus, MailDiagnostics,
    SMTP_PASSWORD_ENV,
};
pub use settings::{MailSettings, Settings};
