//! Merge rules: defaults first, later sources override earlier ones.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("server.host", "postcards.example.org")?
        .set_default("server.port", 80)?
        .set_default("server.path", "/upload.php")?
        .set_default("scan.proximity_timeout_secs", 25)?
        .set_default("scan.position_interval_secs", 30)?
        .set_default("scan.debug_read_chunk", 1024)?
        .set_default("attachments.extension", "doc")?
        .set_default("attachments.settle_delay_ms", 5000)
}
