//! WRF variable selector session server.
//!
//! Each TCP connection is one form session speaking the JSONL protocol from
//! `wrfsel-protocol`.

pub mod server;
pub mod session;

pub use server::{SelectorServer, MAX_CONNECTIONS};
pub use session::{Session, SessionContext};
