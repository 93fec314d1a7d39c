//! CLI Exit Code Registry
//!
//! Single source of truth for `wrfsel` exit codes. Scripts and service
//! managers rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain      | Description                              |
//! |---------|-------------|------------------------------------------|
//! | 0       | Universal   | Success                                  |
//! | 1       | Universal   | General error (unspecified)              |
//! | 2       | Universal   | CLI usage error (bad args, missing file) |
//! | 20-29   | server      | Session server startup                   |
//! | 60-69   | mail/config | Settings, catalog and mail readiness     |

use std::path::Path;

use wrfsel_config::MailConfigStatus;
use wrfsel_io::catalog::CatalogError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Server (20-29)
// =============================================================================

/// Cannot bind the listen address (in use, permission denied, bad address).
pub const EXIT_SERVER_BIND: u8 = 20;

// =============================================================================
// Mail / config (60-69)
// =============================================================================

/// Settings file unreadable or not valid JSON.
pub const EXIT_CONFIG_INVALID: u8 = 60;

/// Catalog file missing or unreadable.
pub const EXIT_CATALOG_IO: u8 = 61;

/// Catalog file present but malformed (missing column, duplicate, empty).
pub const EXIT_CATALOG_INVALID: u8 = 62;

/// Required mail settings (host, sender, operator) are empty.
pub const EXIT_MAIL_INCOMPLETE: u8 = 63;

/// Mail settings complete but no SMTP password in keychain or environment.
pub const EXIT_MAIL_MISSING_PASSWORD: u8 = 64;

/// Exit code for a `--config` file that failed to load: usage error if the
/// file is not there, invalid settings otherwise.
pub fn config_exit_code(path: &Path) -> u8 {
    if path.is_file() {
        EXIT_CONFIG_INVALID
    } else {
        EXIT_USAGE
    }
}

/// Map a catalog load error to its exit code.
pub fn catalog_exit_code(err: &CatalogError) -> u8 {
    match err {
        CatalogError::Io(_) => EXIT_CATALOG_IO,
        _ => EXIT_CATALOG_INVALID,
    }
}

/// Map mail readiness to the `doctor` exit code.
pub fn mail_exit_code(status: MailConfigStatus) -> u8 {
    match status {
        MailConfigStatus::Ready => EXIT_SUCCESS,
        MailConfigStatus::Incomplete => EXIT_MAIL_INCOMPLETE,
        MailConfigStatus::MissingPassword => EXIT_MAIL_MISSING_PASSWORD,
    }
}
