//! Kennel - dog fleet scheduler with file-backed mailboxes

pub mod commands;
pub mod config;
pub mod dog;
pub mod error;
pub mod fsutil;
pub mod mail;
pub mod pending;
pub mod plugin;
pub mod scheduler;
pub mod subprocess;
pub mod telemetry;
