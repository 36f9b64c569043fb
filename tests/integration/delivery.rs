//! End-to-end delivery over loopback TCP

use super::test_utils::{channel_sink, collect, config, engine, find, one_shot_server, sender};
use cardpost::card::{Attachment, EMAIL_ADDRESS};
use cardpost::pipeline::DeliveryStatus;
use cardpost::settings::Settings;
use cardpost::upload::AccessPointId;
use tempfile::TempDir;

fn progress(message: &str) -> DeliveryStatus {
    DeliveryStatus::Progress(message.to_string())
}

#[tokio::test]
async fn accepted_card_reports_sent_and_carries_context() {
    let dir = TempDir::new().unwrap();
    let (addr, server) = one_shot_server(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
    let config = config(&dir, addr);
    let engine = engine(
        &config,
        Settings {
            sender: sender(),
            ..Settings::default()
        },
    );
    {
        let card = engine.card();
        let mut card = card.lock();
        card.set_mood("sunny");
        card.set_attachment(Some(Attachment {
            name: "notes.txt".to_string(),
            data: b"remember the milk".to_vec(),
        }));
    }

    let (sink, mut rx) = channel_sink();
    engine.send_card(sink).unwrap();
    let statuses = collect(&mut rx).await;
    assert_eq!(
        statuses,
        vec![
            progress("Scanning context"),
            progress("Scanning proximity"),
            progress("Sending card"),
            DeliveryStatus::Ok("Card sent".to_string()),
        ]
    );

    let request = server.await.unwrap();
    let text = String::from_utf8_lossy(&request);
    assert!(text.starts_with("POST /upload.php HTTP/1.1\r\n"));
    assert!(text.contains(&format!("Host: 127.0.0.1:{}\r\n", addr.port())));
    assert!(text.contains("\"status\":\"sunny\""));
    assert!(text.contains("\"cell id\":18733"));
    assert!(text.contains("\"mac\":\"00:1a:7d:da:71:13\""));
    assert!(text.contains("\"data filename\":\"notes.txt\""));
    assert!(find(&request, b"remember the milk").is_some());

    // Temporary fields are gone, persistent ones stay.
    let card = engine.card();
    let card = card.lock();
    assert!(card.attachment().is_none());
    assert!(card.cell().is_none());
    assert_eq!(card.mood(), "sunny");
    assert_eq!(
        card.sender().and_then(|s| s.get(EMAIL_ADDRESS)).map(String::as_str),
        Some("me@example.org")
    );
}

#[tokio::test]
async fn refused_card_keeps_access_point() {
    let dir = TempDir::new().unwrap();
    let (addr, server) = one_shot_server(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
    let config = config(&dir, addr);
    let engine = engine(
        &config,
        Settings {
            sender: sender(),
            access_point: Some(AccessPointId(3)),
            proximity_scan_enabled: false,
            ..Settings::default()
        },
    );

    let (sink, mut rx) = channel_sink();
    engine.send_card(sink).unwrap();
    let statuses = collect(&mut rx).await;
    assert_eq!(
        statuses.last(),
        Some(&DeliveryStatus::Fail("Server did not accept card".to_string()))
    );
    assert!(!statuses.contains(&progress("Scanning proximity")));
    assert_eq!(engine.settings().access_point(), Some(AccessPointId(3)));
    server.await.unwrap();
}

#[tokio::test]
async fn unexpected_response_is_reported() {
    let dir = TempDir::new().unwrap();
    let (addr, server) = one_shot_server(b"HTTP/1.1 302 Found\r\n\r\n").await;
    let config = config(&dir, addr);
    let engine = engine(
        &config,
        Settings {
            sender: sender(),
            scanning_disabled: true,
            ..Settings::default()
        },
    );

    let (sink, mut rx) = channel_sink();
    engine.send_card(sink).unwrap();
    let statuses = collect(&mut rx).await;
    assert_eq!(
        statuses,
        vec![
            progress("Sending card"),
            DeliveryStatus::Fail("Unexpected response from server".to_string()),
        ]
    );
    let request = server.await.unwrap();
    assert!(find(&request, b"\"gsm\"").is_none());
}

#[tokio::test]
async fn unreachable_server_clears_access_point() {
    let dir = TempDir::new().unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = config(&dir, addr);
    let engine = engine(
        &config,
        Settings {
            sender: sender(),
            access_point: Some(AccessPointId(7)),
            scanning_disabled: true,
            ..Settings::default()
        },
    );

    let (sink, mut rx) = channel_sink();
    engine.send_card(sink).unwrap();
    let statuses = collect(&mut rx).await;
    assert_eq!(
        statuses.last(),
        Some(&DeliveryStatus::Fail("Sending failed".to_string()))
    );
    assert_eq!(engine.settings().access_point(), None);
}

#[tokio::test]
async fn store_mode_writes_the_request_instead() {
    let dir = TempDir::new().unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let config = config(&dir, listener.local_addr().unwrap());
    let engine = engine(
        &config,
        Settings {
            sender: sender(),
            store_instead_of_send: true,
            ..Settings::default()
        },
    );

    let (sink, mut rx) = channel_sink();
    engine.send_card(sink).unwrap();
    let statuses = collect(&mut rx).await;
    assert_eq!(
        statuses.last(),
        Some(&DeliveryStatus::Ok("Card stored".to_string()))
    );

    let stored: Vec<_> = std::fs::read_dir(dir.path().join("uploads"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(stored.len(), 1);
    let bytes = std::fs::read(&stored[0]).unwrap();
    assert!(bytes.starts_with(b"POST /upload.php HTTP/1.1\r\n"));
    assert!(find(&bytes, b"\"bt scan\"").is_some());
}
