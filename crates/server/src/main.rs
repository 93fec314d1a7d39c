// wrfsel - WRF variable selector server and tools

mod exit_codes;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wrfsel_config::{MailDiagnostics, Settings};
use wrfsel_core::{Catalog, ScenarioId};
use wrfsel_notify::{ExportOptions, SmtpMailer};
use wrfsel_server::{SelectorServer, SessionContext};

use exit_codes::{
    catalog_exit_code, config_exit_code, mail_exit_code, EXIT_ERROR, EXIT_SERVER_BIND, EXIT_SUCCESS,
};

/// Log filter variable, e.g. `WRFSEL_LOG=debug` or `WRFSEL_LOG=wrfsel_notify=debug`.
const LOG_ENV: &str = "WRFSEL_LOG";

#[derive(Parser)]
#[command(name = "wrfsel")]
#[command(about = "WRF variable selector: pick variables per scenario, export and mail the selection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session server
    #[command(after_help = "\
Examples:
  wrfsel serve
  wrfsel serve --port 9000 --catalog data/wrf-variables.csv
  WRFSEL_LOG=debug wrfsel serve --config ./settings.json")]
    Serve {
        /// Settings file (default: the per-user settings.json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address to bind (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (overrides server.port; 0 = any free port)
        #[arg(long)]
        port: Option<u16>,

        /// Variable catalog CSV (overrides catalog.path)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Load the variable catalog and print it
    Catalog {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Variable catalog CSV (overrides catalog.path)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check settings, catalog and mail configuration
    #[command(after_help = "\
Exit codes:
  0   ready
  2   --config file not found
  60  settings file invalid
  61  catalog unreadable
  62  catalog malformed
  63  mail settings incomplete
  64  SMTP password missing")]
    Doctor {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug)]
struct CliError {
    code: u8,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, bind, port, catalog } => cmd_serve(config, bind, port, catalog),
        Commands::Catalog { config, catalog, json } => cmd_catalog(config, catalog, json),
        Commands::Doctor { config, json } => cmd_doctor(config, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_settings(config: Option<PathBuf>) -> Result<Settings, CliError> {
    match config {
        Some(path) => Settings::load_from(&path).map_err(|e| CliError::new(config_exit_code(&path), e)),
        None => Ok(Settings::load()),
    }
}

fn load_catalog(path: &std::path::Path) -> Result<Catalog, CliError> {
    wrfsel_io::catalog::load(path).map_err(|e| {
        CliError::new(catalog_exit_code(&e), format!("{}: {}", path.display(), e))
            .with_hint("set catalog.path in settings.json or pass --catalog")
    })
}

/// Configured scenario list, or the built-in one if the setting is empty.
fn scenarios(settings: &Settings) -> Vec<ScenarioId> {
    if settings.scenarios.is_empty() {
        ScenarioId::known()
    } else {
        settings.scenarios.iter().map(|s| ScenarioId::new(s.as_str())).collect()
    }
}

fn cmd_serve(
    config: Option<PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
    catalog: Option<PathBuf>,
) -> Result<(), CliError> {
    let settings = load_settings(config)?;
    let catalog_path = catalog.unwrap_or_else(|| settings.catalog_path.clone());
    let catalog = load_catalog(&catalog_path)?;
    log::info!("Loaded {} variables from {}", catalog.len(), catalog_path.display());

    let diagnostics = MailDiagnostics::from_settings(&settings.mail);
    if !diagnostics.status.is_ready() {
        log::warn!(
            "Mail is not ready ({}); submissions will fail until it is. Run `wrfsel doctor`.",
            diagnostics.status.as_str()
        );
    }

    let context = SessionContext {
        catalog: Arc::new(catalog),
        scenarios: scenarios(&settings),
        default_scenario: ScenarioId::new(settings.default_scenario.as_str()),
        export: ExportOptions::from_settings(&settings),
        transport: Arc::new(SmtpMailer::new(settings.mail.clone())),
    };

    let bind = bind.unwrap_or_else(|| settings.bind.clone());
    let port = port.unwrap_or(settings.port);

    let mut server = SelectorServer::new();
    let addr = server.start((bind.as_str(), port), context).map_err(|e| {
        CliError::new(EXIT_SERVER_BIND, format!("cannot listen on {}:{}: {}", bind, port, e))
    })?;

    println!("Listening on {}", addr);
    server.wait();
    Ok(())
}

fn cmd_catalog(config: Option<PathBuf>, catalog: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let settings = load_settings(config)?;
    let path = catalog.unwrap_or(settings.catalog_path);
    let catalog = load_catalog(&path)?;

    if json {
        let out = serde_json::to_string_pretty(catalog.variables())
            .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    let id_width = catalog.ids().map(str::len).max().unwrap_or(8).max(8);
    println!("{:<id_width$}  {:<10}  {:<10}  DESCRIPTION", "VARIABLE", "DIMS", "UNITS");
    for v in catalog.variables() {
        println!("{:<id_width$}  {:<10}  {:<10}  {}", v.id, v.dimensions, v.units, v.description);
    }
    eprintln!("{} variables", catalog.len());
    Ok(())
}

#[derive(serde::Serialize)]
struct DoctorReport {
    settings_path: String,
    catalog_path: String,
    catalog_variables: Option<usize>,
    catalog_error: Option<String>,
    scenarios: Vec<String>,
    mail_status: &'static str,
    mail_missing_fields: Vec<&'static str>,
    smtp_host: String,
    smtp_port: u16,
    password_present: bool,
    password_source: &'static str,
    keychain_available: bool,
}

fn cmd_doctor(config: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let settings_path = config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(Settings::config_path_display);
    let settings = load_settings(config)?;

    let catalog = wrfsel_io::catalog::load(&settings.catalog_path);
    let mail = MailDiagnostics::from_settings(&settings.mail);

    if json {
        let report = DoctorReport {
            settings_path,
            catalog_path: settings.catalog_path.display().to_string(),
            catalog_variables: catalog.as_ref().ok().map(Catalog::len),
            catalog_error: catalog.as_ref().err().map(|e| e.to_string()),
            scenarios: scenarios(&settings).iter().map(|s| s.as_str().to_string()).collect(),
            mail_status: mail.status.as_str(),
            mail_missing_fields: mail.missing_fields.clone(),
            smtp_host: mail.smtp_host.clone(),
            smtp_port: mail.smtp_port,
            password_present: mail.password_present,
            password_source: mail.password_source.as_str(),
            keychain_available: mail.keychain_available,
        };
        let out = serde_json::to_string_pretty(&report).map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
        println!("{}", out);
    } else {
        println!("Settings:          {}", settings_path);
        match &catalog {
            Ok(c) => println!("Catalog:           {} ({} variables)", settings.catalog_path.display(), c.len()),
            Err(e) => println!("Catalog:           {} (error: {})", settings.catalog_path.display(), e),
        }
        let names: Vec<String> = scenarios(&settings).iter().map(|s| s.as_str().to_string()).collect();
        println!("Scenarios:         {}", names.join(", "));
        println!();
        print!("{}", mail);
    }

    if let Err(e) = catalog {
        return Err(CliError::new(catalog_exit_code(&e), String::new()));
    }
    match mail_exit_code(mail.status) {
        EXIT_SUCCESS => Ok(()),
        code => Err(CliError::new(code, String::new())),
    }
}
