//! sva-cli
//!
//! Audit-run driver and operator commands around the reconciliation ledger.
//! The `sva` binary is a thin clap layer over [`commands`].

pub mod commands;
pub mod events;
