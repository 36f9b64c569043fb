//! Cardpost: Context-Enriched Postcard Composer
//!
//! Composes a card from user-entered fields plus automatically gathered
//! context (serving cell, nearby devices, position), encodes it as a
//! multipart HTTP upload and either delivers it over TCP or stores it locally.

pub mod card;
pub mod cli;
pub mod clock;
pub mod config;
pub mod encode;
pub mod engine;
pub mod error;
pub mod inbox;
pub mod logging;
pub mod notice;
pub mod pipeline;
pub mod probe;
pub mod settings;
pub mod task;
pub mod upload;
