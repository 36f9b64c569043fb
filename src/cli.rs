//! CLI domain: parse, route and presentation only.
//! No orchestration here; the route table dispatches to the engine.

mod parse;
mod presentation;
mod route;

pub use parse::{Cli, Commands, SettingsCommands};
pub use presentation::{
    format_fix, format_modules_table, format_settings_json, format_settings_table,
    format_validation_errors, DialoguerChooser,
};
pub use route::{apply_setting, RunContext};
