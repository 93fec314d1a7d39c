// File I/O operations

pub mod catalog;
pub mod csv;

/// Header of every exported selection file.
pub const EXPORT_HEADER: [&str; 4] = ["Variable", "hourly", "daily", "monthly"];
