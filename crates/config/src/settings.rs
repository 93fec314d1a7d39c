// Application settings
// Loaded from ~/.config/wrfsel/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use wrfsel_core::{DEFAULT_SCENARIO, KNOWN_SCENARIOS};

/// Outbound mail settings. The SMTP password is never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MailSettings {
    /// SMTP relay host. Empty = mail not configured.
    pub smtp_host: String,

    pub smtp_port: u16,

    /// Login for the relay; defaults to the sender address when empty.
    pub username: String,

    /// Service account the message is sent from.
    pub sender: String,

    /// Operator address that receives a copy of every export.
    pub operator: String,

    pub subject: String,

    /// Per-attempt SMTP timeout.
    pub timeout_secs: u64,

    /// Total send attempts for transport failures (1 = no retry).
    pub max_attempts: u32,

    pub retry_delay_ms: u64,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 587,
            username: String::new(),
            sender: String::new(),
            operator: String::new(),
            subject: "WRF variable selection".to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl MailSettings {
    /// Login name for the relay (username, or the sender if unset)
    pub fn effective_username(&self) -> &str {
        if self.username.is_empty() {
            &self.sender
        } else {
            &self.username
        }
    }

    /// Names of required fields that are still empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.smtp_host.trim().is_empty() {
            missing.push("mail.smtpHost");
        }
        if self.sender.trim().is_empty() {
            missing.push("mail.sender");
        }
        if self.operator.trim().is_empty() {
            missing.push("mail.operator");
        }
        missing
    }

    /// Attempts, never below one.
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Catalog
    #[serde(rename = "catalog.path")]
    pub catalog_path: PathBuf,

    // Scenarios
    #[serde(rename = "scenarios.known")]
    pub scenarios: Vec<String>,

    #[serde(rename = "scenarios.default")]
    pub default_scenario: String,

    // Session server
    #[serde(rename = "server.bind")]
    pub bind: String,

    #[serde(rename = "server.port")]
    pub port: u16,

    // Export
    #[serde(rename = "export.dir")]
    pub export_dir: Option<PathBuf>,  // None = system temp dir

    /// Export every scenario; false limits the export to scenarios with a flag set.
    #[serde(rename = "export.includeEmptyScenarios")]
    pub include_empty_scenarios: bool,

    // Mail
    #[serde(rename = "mail", default)]
    pub mail: MailSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("data/wrf-variables.csv"),
            scenarios: default_scenarios(),
            default_scenario: DEFAULT_SCENARIO.to_string(),
            bind: "127.0.0.1".to_string(),
            port: 8050,
            export_dir: None,
            include_empty_scenarios: true,
            mail: MailSettings::default(),
        }
    }
}

fn default_scenarios() -> Vec<String> {
    KNOWN_SCENARIOS.iter().map(|s| s.to_string()).collect()
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wrfsel")
            .join("settings.json")
    }

    /// Load settings from the default path, falling back to defaults.
    /// Writes a commented default file on first run.
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file(&path);
            return settings;
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{}; using default settings", e);
                Self::default()
            }
        }
    }

    /// Load settings from an explicit file. Errors are returned, not defaulted.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {}", path.display(), e))?;
        Self::from_json(&contents).map_err(|e| format!("Error parsing {}: {}", path.display(), e))
    }

    /// Parse settings JSON. Lines starting with `//` are comments.
    pub fn from_json(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned).map_err(|e| e.to_string())
    }

    /// Save current settings to disk
    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Directory export temp dirs are created in.
    pub fn effective_export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Create default settings file with comments
    fn create_default_file(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        if let Err(e) = fs::write(path, DEFAULT_CONFIG) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }

    /// Get the config file path for display
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}

const DEFAULT_CONFIG: &str = r#"{
    // Variable catalog (Variable, Name, Dimensions, Units columns)
    "catalog.path": "data/wrf-variables.csv",

    // Scenario selector
    "scenarios.known": [
        "ERA-Interim",
        "GFDL-CM3 Historical",
        "GFDL-CM3 RCP85",
        "NCAR-CCSM4 Historical",
        "NCAR-CCSM4 RCP85"
    ],
    "scenarios.default": "GFDL-CM3 Historical",

    // Session server
    "server.bind": "127.0.0.1",
    "server.port": 8050,

    // Export (null = system temp dir)
    // includeEmptyScenarios: false sends only scenarios with a variable selected
    "export.dir": null,
    "export.includeEmptyScenarios": true,

    // Mail
    // The SMTP password is read from the system keychain or WRFSEL_SMTP_PASSWORD,
    // never from this file
    "mail": {
        "smtpHost": "",
        "smtpPort": 587,
        "username": "",
        "sender": "",
        "operator": "",
        "subject": "WRF variable selection",
        "timeoutSecs": 30,
        "maxAttempts": 3,
        "retryDelayMs": 2000
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_file_parses_to_defaults() {
        let parsed = Settings::from_json(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn test_default_scenarios_match_core() {
        let settings = Settings::default();
        assert_eq!(settings.scenarios, KNOWN_SCENARIOS);
        assert_eq!(settings.default_scenario, DEFAULT_SCENARIO);
        assert!(settings.include_empty_scenarios);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let json = r#"{
            // only mail host set
            "mail": { "smtpHost": "smtp.example.org", "sender": "wrf@example.org" }
        }"#;
        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.mail.smtp_host, "smtp.example.org");
        assert_eq!(settings.mail.smtp_port, 587);
        assert_eq!(settings.mail.effective_username(), "wrf@example.org");
        assert_eq!(settings.port, 8050);
        assert_eq!(settings.scenarios.len(), 5);
    }

    #[test]
    fn test_missing_mail_fields() {
        let mut mail = MailSettings::default();
        assert_eq!(mail.missing_fields(), vec!["mail.smtpHost", "mail.sender", "mail.operator"]);

        mail.smtp_host = "smtp.example.org".to_string();
        mail.sender = "wrf@example.org".to_string();
        mail.operator = "ops@example.org".to_string();
        assert!(mail.missing_fields().is_empty());
    }

    #[test]
    fn test_effective_attempts_never_zero() {
        let mail = MailSettings { max_attempts: 0, ..MailSettings::default() };
        assert_eq!(mail.effective_attempts(), 1);
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.port = 9999;
        settings.export_dir = Some(dir.path().to_path_buf());
        settings.save(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.effective_export_dir(), dir.path());
    }

    #[test]
    fn test_load_from_reports_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.contains("Error parsing"), "{err}");
    }
}
