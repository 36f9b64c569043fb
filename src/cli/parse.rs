//! CLI parse: clap types for cardpost. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cardpost CLI - compose postcards enriched with cell, proximity and position context
#[derive(Parser)]
#[command(name = "cardpost")]
#[command(about = "Compose context-enriched postcards and deliver them over TCP")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (config/config.toml is read from here)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Runtime settings file (overrides storage.settings_file)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable all logging
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan context and send the card, or store it if configured to
    Send {
        /// Status text
        #[arg(long)]
        mood: Option<String>,
        /// Sender email address
        #[arg(long)]
        sender: Option<String>,
        /// Sender display name
        #[arg(long)]
        sender_name: Option<String>,
        /// Recipient email address
        #[arg(long, conflicts_with_all = ["public", "private"])]
        recipient: Option<String>,
        /// Publish the card
        #[arg(long, conflicts_with = "private")]
        public: bool,
        /// Keep the card private
        #[arg(long)]
        private: bool,
        /// Photo to include
        #[arg(long, conflicts_with = "no_photo")]
        photo: Option<PathBuf>,
        /// Drop the saved photo
        #[arg(long)]
        no_photo: bool,
        /// Document to attach
        #[arg(long, conflicts_with = "wait_attachment")]
        attach: Option<PathBuf>,
        /// Wait for a document to arrive in the attachment inbox first
        #[arg(long)]
        wait_attachment: bool,
    },
    /// Show or change runtime settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// List positioning modules
    Modules {
        /// Pick the module to use interactively
        #[arg(long)]
        choose: bool,
    },
    /// Run background positioning and print fixes
    Position {
        /// Number of fixes to print
        #[arg(long, default_value = "1")]
        count: usize,
    },
    /// Validate configuration
    Validate,
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show current settings
    Show {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Change one setting
    Set {
        /// Setting name, e.g. store_instead_of_send
        key: String,
        /// New value; "none" clears optional settings
        value: String,
    },
    /// Forget the selected access point
    ClearAccessPoint,
}
