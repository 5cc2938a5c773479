//! Command implementations for the CLI.

pub mod cache;
pub mod init;
pub mod watch;
