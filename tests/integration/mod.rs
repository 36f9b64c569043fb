//! Integration tests for the cardpost composer

mod cli_settings;
mod config_integration;
mod delivery;
mod encoding_properties;
mod test_utils;
