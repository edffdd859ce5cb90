//! Command-line interface for the auth service.

mod commands;

use clap::{Parser, Subcommand};

/// Tortomaniya auth service
/// Account security API for the bakery storefront
#[derive(Parser)]
#[command(name = "tortomaniya-auth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API (default)
    Serve,

    /// Write a default config.toml if none exists
    #[command(alias = "--init")]
    Init,

    /// Show recent security events
    #[command(alias = "log")]
    Audit {
        /// Only events for this user id
        #[arg(long, value_parser = clap::value_parser!(i32).range(0..))]
        user: Option<i32>,

        /// Number of entries to show
        #[arg(long, default_value_t = crate::constants::limits::DEFAULT_AUDIT_LIMIT)]
        limit: u64,

        /// Only events with this action (e.g. failed_login)
        #[arg(long)]
        action: Option<String>,
    },

    /// Clear the failed-login counter and lock of an account
    Unlock {
        /// Account email
        email: String,
    },
}

pub use commands::*;
