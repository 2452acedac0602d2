//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

/// Tap station controller.
///
/// Records NFC tap events against service-flow stages, syncs batches
/// captured offline, and reports live queue metrics.
#[derive(Debug, Parser)]
#[command(name = "tapflow", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record a single tap.
    Tap {
        /// The wristband token identifier.
        #[arg(long)]
        token: String,

        /// The card UID read from the hardware.
        #[arg(long)]
        uid: String,

        /// The service-flow stage (e.g. QUEUE_JOIN).
        #[arg(long)]
        stage: String,

        /// Session to record into, overriding the configured one.
        #[arg(long)]
        session: Option<String>,

        /// Observation timestamp (RFC 3339); defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Report this tap as coming from a mobile station.
        #[arg(long)]
        mobile: bool,
    },

    /// Apply a batch of taps captured offline.
    ///
    /// Reads a JSON array of taps from FILE, or stdin when omitted, and
    /// prints a sync report as JSON.
    Sync {
        /// File containing the batch; stdin when omitted.
        file: Option<PathBuf>,
    },

    /// Show queue metrics for a session.
    Metrics {
        /// Session to report on, overriding the configured one.
        #[arg(long)]
        session: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show where a token stands in the service flow.
    Status {
        /// The wristband token identifier.
        #[arg(long)]
        token: String,

        /// Session to look in, overriding the configured one.
        #[arg(long)]
        session: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List a session's most recent taps, newest first.
    Events {
        /// Session to list, overriding the configured one.
        #[arg(long)]
        session: Option<String>,

        /// Maximum number of taps to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Export a session's full event log as JSON Lines.
    Export {
        /// Session to export, overriding the configured one.
        #[arg(long)]
        session: Option<String>,
    },
}
