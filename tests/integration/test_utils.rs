//! Shared helpers: a one-shot loopback upload server and engine setup.

use cardpost::card::{CellInfo, Contact, EMAIL_ADDRESS};
use cardpost::config::{CardpostConfig, FixtureConfig, FixtureDevice};
use cardpost::engine::{Backends, Engine};
use cardpost::logging::LogHandle;
use cardpost::pipeline::{DeliveryStatus, StatusSink};
use cardpost::settings::{Settings, SettingsStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Accept one connection, read a full request and answer with `response`.
/// The handle yields the raw request bytes.
pub async fn one_shot_server(response: &'static [u8]) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(response).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });
    (addr, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending a full request");
        request.extend_from_slice(&buf[..n]);
        if let Some(end) = find(&request, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&request[..end]).to_string();
            let length: usize = head
                .lines()
                .find_map(|l| l.strip_prefix("Content-Length: "))
                .and_then(|v| v.trim().parse().ok())
                .unwrap();
            if request.len() >= end + 4 + length {
                return request;
            }
        }
    }
}

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn sender() -> Contact {
    Contact::from([
        (EMAIL_ADDRESS.to_string(), "me@example.org".to_string()),
        ("first_name".to_string(), "Mira".to_string()),
    ])
}

/// Config pointing at `addr` with a known cell and two nearby devices.
pub fn config(dir: &TempDir, addr: SocketAddr) -> CardpostConfig {
    let mut config = CardpostConfig::default();
    config.server.host = addr.ip().to_string();
    config.server.port = addr.port();
    config.storage.uploads_dir = dir.path().join("uploads");
    config.fixtures = FixtureConfig {
        cell: Some(CellInfo {
            country_code: 244,
            network_code: 91,
            area_code: 4021,
            cell_id: 18_733,
        }),
        devices: Some(vec![
            FixtureDevice {
                address: "001a7dda7113".to_string(),
                name: "Headset".to_string(),
            },
            FixtureDevice {
                address: "00:1b:2c:3d:4e:5f".to_string(),
                name: "Phone".to_string(),
            },
        ]),
        ..FixtureConfig::default()
    };
    config
}

pub fn engine(config: &CardpostConfig, settings: Settings) -> Engine {
    Engine::new(
        config,
        SettingsStore::in_memory(settings),
        Backends::from_config(config),
        LogHandle::detached(),
    )
    .unwrap()
}

/// Sink collecting statuses into a channel.
pub fn channel_sink() -> (Arc<dyn StatusSink>, mpsc::UnboundedReceiver<DeliveryStatus>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink: Arc<dyn StatusSink> = Arc::new(move |status: DeliveryStatus| {
        let _ = tx.send(status);
    });
    (sink, rx)
}

/// Every status up to and including the terminal one.
pub async fn collect(rx: &mut mpsc::UnboundedReceiver<DeliveryStatus>) -> Vec<DeliveryStatus> {
    let mut out = Vec::new();
    while let Some(status) = rx.recv().await {
        let terminal = status.is_terminal();
        out.push(status);
        if terminal {
            break;
        }
    }
    out
}
