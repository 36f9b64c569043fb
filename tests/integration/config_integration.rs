//! Integration tests for configuration loading

use cardpost::config::{ConfigLoader, ValidationError};
use cardpost::upload::AccessPointId;
use std::net::{IpAddr, Ipv4Addr};
use tempfile::TempDir;

#[test]
fn test_file_config_overrides_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("cardpost.toml");
    std::fs::write(
        &config_file,
        r#"
[server]
host = "cards.example.net"
port = 8080

[scan]
proximity_timeout_secs = 10

[[network.access_points]]
id = 2
name = "office"
local_addr = "127.0.0.1"

[fixtures.cell]
country_code = 244
network_code = 5
area_code = 100
cell_id = 42
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.host, "cards.example.net");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.path, "/upload.php");
    assert_eq!(config.scan.proximity_timeout_secs, 10);
    assert_eq!(config.scan.position_interval_secs, 30);

    let ap = config.network.access_point(AccessPointId(2)).unwrap();
    assert_eq!(ap.name, "office");
    assert_eq!(ap.local_addr, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    assert_eq!(config.fixtures.cell.map(|c| c.cell_id), Some(42));
}

#[test]
fn test_workspace_config_is_loaded() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir_all(temp_dir.path().join("config")).unwrap();
    std::fs::write(
        temp_dir.path().join("config/config.toml"),
        "[server]\npath = \"/cards\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load(temp_dir.path()).unwrap();
    assert_eq!(config.server.path, "/cards");
    assert_eq!(config.server.endpoint().path, "/cards");
}

#[test]
fn test_invalid_config_reports_every_problem() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("bad.toml");
    std::fs::write(
        &config_file,
        r#"
[server]
path = "upload.php"

[scan]
position_interval_secs = 0

[[network.access_points]]
id = 1
name = "a"

[[network.access_points]]
id = 1
name = "b"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 3);
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Network(m) if m.contains("Duplicate"))));
}

#[test]
fn test_missing_config_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    assert!(ConfigLoader::load_from_file(&temp_dir.path().join("absent.toml")).is_err());
}
