//! Export the selection store as per-scenario CSV files and mail them.
//!
//! Every call writes into its own temp directory under the export dir. The
//! directory is removed before the call returns, whatever the outcome.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use wrfsel_config::Settings;
use wrfsel_core::{ScenarioId, SelectionRow, SelectionStore};

use crate::mail::{MailError, MailTransport, OutboundMessage};

const FILE_PREFIX: &str = "temp-selection-output";

/// Knobs for one export, usually taken from `Settings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Parent of the per-request temp directories.
    pub export_dir: PathBuf,
    /// Export every scenario in the store. When false, only scenarios
    /// with at least one flag set are exported.
    pub include_empty_scenarios: bool,
    pub sender: String,
    pub operator: String,
    pub subject: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl ExportOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            export_dir: settings.effective_export_dir(),
            include_empty_scenarios: settings.include_empty_scenarios,
            sender: settings.mail.sender.clone(),
            operator: settings.mail.operator.clone(),
            subject: settings.mail.subject.clone(),
            max_attempts: settings.mail.effective_attempts(),
            retry_delay: Duration::from_millis(settings.mail.retry_delay_ms),
        }
    }
}

/// What a successful export delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReceipt {
    pub recipients: Vec<String>,
    /// Attached file names.
    pub files: Vec<String>,
    pub scenarios: Vec<ScenarioId>,
    /// Send attempts used (1 = first try succeeded).
    pub attempts: u32,
}

/// Error type for export operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    /// Request rejected before anything was written
    Validation(String),
    /// Temp dir or CSV file could not be written
    Io(String),
    /// Delivery failed after `attempts` tries
    Mail { error: MailError, attempts: u32 },
}

impl ExportError {
    /// Wire error code for the session protocol.
    pub fn code(&self) -> &'static str {
        match self {
            ExportError::Validation(_) => "validation_error",
            ExportError::Io(_) => "io_error",
            ExportError::Mail { error, .. } => match error {
                MailError::Config(_) => "config_error",
                MailError::Address(_) => "validation_error",
                MailError::Io(_) => "io_error",
                MailError::Transport(_) => "transport_error",
            },
        }
    }
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Validation(msg) => write!(f, "{}", msg),
            ExportError::Io(msg) => write!(f, "Export I/O error: {}", msg),
            ExportError::Mail { error, attempts } if *attempts > 1 => {
                write!(f, "{} (after {} attempts)", error, attempts)
            }
            ExportError::Mail { error, .. } => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for ExportError {}

/// Replace everything outside `[A-Za-z0-9@._+-]` with `_`.
pub fn sanitize_file_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '+' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `temp-selection-output_<scenario>_<email>.csv`
pub fn export_file_name(scenario: &ScenarioId, email: &str) -> String {
    numbered_file_name(scenario, email, 1)
}

/// Like `export_file_name`, with `-<n>` after the scenario for n > 1.
fn numbered_file_name(scenario: &ScenarioId, email: &str, n: usize) -> String {
    let stem = sanitize_file_component(&scenario.file_stem());
    let email = sanitize_file_component(email);
    if n > 1 {
        format!("{}_{}-{}_{}.csv", FILE_PREFIX, stem, n, email)
    } else {
        format!("{}_{}_{}.csv", FILE_PREFIX, stem, email)
    }
}

/// One distinct file name per scenario. Names that sanitize to the same
/// file get a numeric suffix, in store order.
fn unique_file_names<'a>(scenarios: impl IntoIterator<Item = &'a ScenarioId>, email: &str) -> Vec<String> {
    let mut taken = HashSet::new();
    scenarios
        .into_iter()
        .map(|scenario| {
            let mut n = 1;
            let mut name = numbered_file_name(scenario, email, n);
            while !taken.insert(name.clone()) {
                n += 1;
                name = numbered_file_name(scenario, email, n);
            }
            name
        })
        .collect()
}

/// Scenarios that go into the export, in store order.
fn exported_scenarios(store: &SelectionStore, include_empty: bool) -> Vec<(&ScenarioId, &[SelectionRow])> {
    store
        .iter()
        .filter(|(_, rows)| include_empty || rows.iter().any(SelectionRow::any))
        .collect()
}

/// Write one CSV per exported scenario, attach them all to a single message
/// for the requester and the operator, and send it.
///
/// Transport failures are retried up to `max_attempts` with a fixed delay;
/// configuration and address errors fail immediately.
pub fn export_and_notify(
    store: &SelectionStore,
    email: &str,
    options: &ExportOptions,
    transport: &dyn MailTransport,
) -> Result<ExportReceipt, ExportError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ExportError::Validation("email address is required".to_string()));
    }

    let scenarios = exported_scenarios(store, options.include_empty_scenarios);
    if scenarios.is_empty() && !options.include_empty_scenarios {
        return Err(ExportError::Validation("no variables selected".to_string()));
    }

    fs::create_dir_all(&options.export_dir)
        .map_err(|e| ExportError::Io(format!("{}: {}", options.export_dir.display(), e)))?;
    let dir = tempfile::Builder::new()
        .prefix("wrfsel-export-")
        .tempdir_in(&options.export_dir)
        .map_err(|e| ExportError::Io(e.to_string()))?;

    log::info!(
        "Exporting {} scenario(s) for {} into {}",
        scenarios.len(),
        email,
        dir.path().display()
    );
    let result = export_into(dir.path(), &scenarios, email, options, transport);

    let dir_path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        log::warn!("Failed to remove export dir {}: {}", dir_path.display(), e);
    }

    result
}

fn export_into(
    dir: &Path,
    scenarios: &[(&ScenarioId, &[SelectionRow])],
    email: &str,
    options: &ExportOptions,
    transport: &dyn MailTransport,
) -> Result<ExportReceipt, ExportError> {
    let files = unique_file_names(scenarios.iter().map(|(s, _)| *s), email);
    let mut attachments = Vec::with_capacity(scenarios.len());

    for ((_, rows), name) in scenarios.iter().zip(&files) {
        let path = dir.join(name);
        wrfsel_io::csv::export_selection(rows, &path)
            .map_err(|e| ExportError::Io(format!("{}: {}", name, e)))?;
        log::debug!("Wrote {}", path.display());
        attachments.push(path);
    }

    let mut recipients = vec![email.to_string()];
    let operator = options.operator.trim();
    if !operator.is_empty() && !operator.eq_ignore_ascii_case(email) {
        recipients.push(operator.to_string());
    }

    let scenario_ids: Vec<ScenarioId> = scenarios.iter().map(|(s, _)| (*s).clone()).collect();
    let message = OutboundMessage {
        from: options.sender.clone(),
        to: recipients.clone(),
        subject: options.subject.clone(),
        body: message_body(email, &scenario_ids, &files),
        attachments,
    };

    let attempts = send_with_retry(transport, &message, options.max_attempts.max(1), options.retry_delay)?;
    log::info!("Export for {} sent ({} file(s), {} attempt(s))", email, files.len(), attempts);

    Ok(ExportReceipt {
        recipients,
        files,
        scenarios: scenario_ids,
        attempts,
    })
}

fn send_with_retry(
    transport: &dyn MailTransport,
    message: &OutboundMessage,
    max_attempts: u32,
    delay: Duration,
) -> Result<u32, ExportError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match transport.send(message) {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                log::warn!("Send attempt {}/{} failed: {}; retrying", attempt, max_attempts, e);
                thread::sleep(delay);
            }
            Err(e) => {
                log::error!("Send failed after {} attempt(s): {}", attempt, e);
                return Err(ExportError::Mail { error: e, attempts: attempt });
            }
        }
    }
}

fn message_body(email: &str, scenarios: &[ScenarioId], files: &[String]) -> String {
    let mut body = format!(
        "WRF variable selections requested by {} on {}.\n\nAttached scenarios:\n",
        email,
        chrono::Utc::now().format("%Y-%m-%d %H:%M UTC")
    );
    for (scenario, file) in scenarios.iter().zip(files) {
        body.push_str(&format!("  - {} ({})\n", scenario, file));
    }
    body
}
