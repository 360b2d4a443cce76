//! Logger setup for binaries and tests.
//!
//! The engine itself only emits through the `log` facade; hosts that already
//! install a logger never need this module.

mod init;

pub use init::{LoggingConfig, init_logging};
