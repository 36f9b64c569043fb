//! CLI route tests: settings persistence and store-mode sends

use cardpost::cli::{Commands, RunContext, SettingsCommands};
use cardpost::error::CardpostError;
use cardpost::logging::LogHandle;
use cardpost::settings::SettingsStore;
use cardpost::upload::AccessPointId;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("cardpost.toml");
    let uploads = dir.path().join("uploads");
    std::fs::write(
        &path,
        format!(
            "[storage]\nuploads_dir = {:?}\n\n[attachments]\ninbox_dir = {:?}\nsettle_delay_ms = 50\n\n[fixtures.cell]\ncountry_code = 1\nnetwork_code = 2\narea_code = 3\ncell_id = 4\n",
            uploads.display().to_string(),
            dir.path().join("inbox").display().to_string()
        ),
    )
    .unwrap();
    path
}

fn context(dir: &TempDir) -> RunContext {
    RunContext::new(
        dir.path(),
        Some(&write_config(dir)),
        Some(dir.path().join("settings.toml")),
        LogHandle::detached(),
    )
    .unwrap()
}

fn set(key: &str, value: &str) -> Commands {
    Commands::Settings {
        command: SettingsCommands::Set {
            key: key.to_string(),
            value: value.to_string(),
        },
    }
}

#[tokio::test]
async fn settings_changes_persist_across_runs() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    ctx.execute(&set("access_point", "5")).await.unwrap();
    ctx.execute(&set("proximity_scan_enabled", "off"))
        .await
        .unwrap();
    let out = ctx.execute(&set("proximity_scan_enabled", "false")).await.unwrap();
    assert!(out.contains("unchanged"));

    let reloaded = SettingsStore::load(dir.path().join("settings.toml")).unwrap();
    assert_eq!(reloaded.access_point(), Some(AccessPointId(5)));
    assert!(!reloaded.proximity_scan_enabled());

    ctx.execute(&Commands::Settings {
        command: SettingsCommands::ClearAccessPoint,
    })
    .await
    .unwrap();
    let reloaded = SettingsStore::load(dir.path().join("settings.toml")).unwrap();
    assert_eq!(reloaded.access_point(), None);

    let json = ctx
        .execute(&Commands::Settings {
            command: SettingsCommands::Show {
                format: "json".to_string(),
            },
        })
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["proximity_scan_enabled"], serde_json::Value::Bool(false));
}

#[tokio::test]
async fn unknown_setting_is_rejected() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    assert!(matches!(
        ctx.execute(&set("volume", "11")).await,
        Err(CardpostError::UnknownSetting(_))
    ));
}

fn send(sender: Option<&str>) -> Commands {
    send_command(sender, false)
}

fn send_command(sender: Option<&str>, wait_attachment: bool) -> Commands {
    Commands::Send {
        mood: Some("at the lake".to_string()),
        sender: sender.map(str::to_string),
        sender_name: None,
        recipient: None,
        public: true,
        private: false,
        photo: None,
        no_photo: false,
        attach: None,
        wait_attachment,
    }
}

#[tokio::test]
async fn send_without_sender_is_refused() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    assert!(matches!(
        ctx.execute(&send(None)).await,
        Err(CardpostError::Refused(_))
    ));
}

#[tokio::test]
async fn store_mode_send_writes_card_and_remembers_fields() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    ctx.execute(&set("store_instead_of_send", "true")).await.unwrap();

    let out = ctx.execute(&send(Some("me@example.org"))).await.unwrap();
    assert_eq!(out, "Card stored");
    assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 1);

    let reloaded = SettingsStore::load(dir.path().join("settings.toml")).unwrap();
    let saved = reloaded.snapshot();
    assert_eq!(saved.mood, "at the lake");
    assert_eq!(
        saved.sender.get("email_address").map(String::as_str),
        Some("me@example.org")
    );
}

#[tokio::test]
async fn send_waits_for_inbox_document() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    ctx.execute(&set("store_instead_of_send", "true")).await.unwrap();

    // Keep a document in the inbox until the send has picked one up.
    let document = dir.path().join("inbox").join("minutes.doc");
    let writer = tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            if document.parent().is_some_and(|d| d.exists()) && !document.exists() {
                let _ = std::fs::write(&document, b"meeting minutes");
            }
        }
    });

    let command = send_command(Some("me@example.org"), true);
    let out = tokio::time::timeout(std::time::Duration::from_secs(20), ctx.execute(&command))
        .await
        .unwrap()
        .unwrap();
    writer.abort();
    assert_eq!(out, "Card stored");

    let stored = std::fs::read_dir(dir.path().join("uploads"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let bytes = std::fs::read(stored).unwrap();
    assert!(bytes
        .windows(b"meeting minutes".len())
        .any(|w| w == b"meeting minutes"));
}
