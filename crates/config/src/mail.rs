// SMTP credentials and mail configuration diagnostics
//
// The SMTP password is looked up in:
// 1. System keychain (preferred)
// 2. Environment variable (fallback for CI/headless)
//
// It is NEVER stored in settings.json

use std::env;

use crate::settings::MailSettings;

/// Service name for keychain storage
#[cfg(feature = "keychain")]
const KEYCHAIN_SERVICE: &str = "wrfsel";

/// Environment variable holding the SMTP password
pub const SMTP_PASSWORD_ENV: &str = "WRFSEL_SMTP_PASSWORD";

/// Source of a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Keychain,
    Environment,
    None,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Keychain => "keychain",
            KeySource::Environment => "environment",
            KeySource::None => "none",
        }
    }
}

/// Result of a password lookup
#[derive(Clone)]
pub struct KeyLookup {
    pub key: Option<String>,
    pub source: KeySource,
}

impl std::fmt::Debug for KeyLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLookup")
            .field("key", &self.key.as_ref().map(|_| "***"))
            .field("source", &self.source)
            .finish()
    }
}

/// Keychain account name for an SMTP login
#[cfg(feature = "keychain")]
fn keychain_account(username: &str) -> String {
    format!("smtp/{}", username.to_lowercase())
}

/// Get the SMTP password for `username`
///
/// Checks in order:
/// 1. System keychain (account smtp/<username>)
/// 2. WRFSEL_SMTP_PASSWORD
pub fn get_smtp_password(username: &str) -> KeyLookup {
    #[cfg(feature = "keychain")]
    {
        if !username.is_empty() {
            if let Ok(entry) = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(username)) {
                if let Ok(key) = entry.get_password() {
                    return KeyLookup {
                        key: Some(key),
                        source: KeySource::Keychain,
                    };
                }
            }
        }
    }
    #[cfg(not(feature = "keychain"))]
    let _ = username;

    if let Ok(key) = env::var(SMTP_PASSWORD_ENV) {
        if !key.is_empty() {
            return KeyLookup {
                key: Some(key),
                source: KeySource::Environment,
            };
        }
    }

    KeyLookup {
        key: None,
        source: KeySource::None,
    }
}

/// Store the SMTP password in the system keychain
#[cfg(feature = "keychain")]
pub fn set_smtp_password(username: &str, password: &str) -> Result<(), String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(username))
        .map_err(|e| format!("Failed to create keychain entry: {}", e))?;

    entry
        .set_password(password)
        .map_err(|e| format!("Failed to store password in keychain: {}", e))
}

#[cfg(not(feature = "keychain"))]
pub fn set_smtp_password(_username: &str, _password: &str) -> Result<(), String> {
    Err(format!(
        "Keychain support not enabled. Set {} instead.",
        SMTP_PASSWORD_ENV
    ))
}

/// Check if keychain support is available
pub fn keychain_available() -> bool {
    #[cfg(feature = "keychain")]
    {
        keyring::Entry::new(KEYCHAIN_SERVICE, "test").is_ok()
    }
    #[cfg(not(feature = "keychain"))]
    {
        false
    }
}

// ============================================================================
// Diagnostics (for `wrfsel doctor`)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailConfigStatus {
    /// Host, sender, operator and password all present
    Ready,
    /// Required settings fields are empty
    Incomplete,
    /// Settings complete but no password found
    MissingPassword,
}

impl MailConfigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Incomplete => "incomplete",
            Self::MissingPassword => "missing_password",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// What the mail layer would use right now. Never holds the password itself.
#[derive(Debug)]
pub struct MailDiagnostics {
    pub status: MailConfigStatus,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub sender: String,
    pub operator: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub missing_fields: Vec<&'static str>,
    pub password_present: bool,
    pub password_source: KeySource,
    pub keychain_available: bool,
}

impl MailDiagnostics {
    pub fn from_settings(settings: &MailSettings) -> Self {
        Self::with_lookup(settings, get_smtp_password(settings.effective_username()))
    }

    fn with_lookup(settings: &MailSettings, lookup: KeyLookup) -> Self {
        let missing_fields = settings.missing_fields();
        let password_present = lookup.key.is_some();

        let status = if !missing_fields.is_empty() {
            MailConfigStatus::Incomplete
        } else if !password_present {
            MailConfigStatus::MissingPassword
        } else {
            MailConfigStatus::Ready
        };

        Self {
            status,
            smtp_host: settings.smtp_host.clone(),
            smtp_port: settings.smtp_port,
            username: settings.effective_username().to_string(),
            sender: settings.sender.clone(),
            operator: settings.operator.clone(),
            timeout_secs: settings.timeout_secs,
            max_attempts: settings.effective_attempts(),
            missing_fields,
            password_present,
            password_source: lookup.source,
            keychain_available: keychain_available(),
        }
    }
}

impl std::fmt::Display for MailDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let or_unset = |s: &str| if s.is_empty() { "(unset)".to_string() } else { s.to_string() };

        writeln!(f, "Mail Configuration")?;
        writeln!(f, "──────────────────────────────")?;
        writeln!(f, "Status:            {}", self.status.as_str())?;
        writeln!(f, "SMTP relay:        {}:{}", or_unset(&self.smtp_host), self.smtp_port)?;
        writeln!(f, "Username:          {}", or_unset(&self.username))?;
        writeln!(f, "Sender:            {}", or_unset(&self.sender))?;
        writeln!(f, "Operator:          {}", or_unset(&self.operator))?;
        writeln!(f, "Timeout:           {}s", self.timeout_secs)?;
        writeln!(f, "Attempts:          {}", self.max_attempts)?;
        writeln!(f, "Password present:  {}", if self.password_present { "yes" } else { "no" })?;
        writeln!(f, "Password source:   {}", self.password_source.as_str())?;
        writeln!(f, "Keychain available:{}", if self.keychain_available { "yes" } else { "no" })?;
        if !self.missing_fields.is_empty() {
            writeln!(f, "Missing settings:  {}", self.missing_fields.join(", "))?;
        }
        Ok(())
    }
}
