//! Network attachment and connection seams used by the uploader.
//!
//! A [`NetSession`] is the long-lived connection-service object; a [`Bearer`]
//! is the optional access-point-bound attachment threaded through every socket
//! the session opens. The uploader owns both and reuses them across sends.

use crate::config::NetworkConfig;
use crate::error::{TransportError, TransportStage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

/// Network-attachment selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessPointId(pub u32);

impl std::fmt::Display for AccessPointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bidirectional byte stream returned by [`NetSession::connect`]
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + ?Sized> ByteStream for T {}

pub trait Bearer: Send + Sync {
    fn access_point(&self) -> AccessPointId;
    /// Local address sockets opened through this bearer bind to.
    fn local_addr(&self) -> Option<IpAddr>;
    fn close(&self);
}

#[async_trait]
pub trait NetSession: Send + Sync {
    /// Attach to an access point.
    async fn attach(&self, access_point: AccessPointId) -> Result<Arc<dyn Bearer>, TransportError>;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        bearer: Option<&dyn Bearer>,
    ) -> Result<Box<dyn ByteStream>, TransportError>;

    fn close(&self);
}

#[async_trait]
pub trait NetworkService: Send + Sync {
    async fn open_session(&self) -> Result<Arc<dyn NetSession>, TransportError>;
}

/// TCP networking with access points mapped to local bind addresses
#[derive(Debug, Clone, Default)]
pub struct TcpNetwork {
    access_points: Arc<HashMap<AccessPointId, Option<IpAddr>>>,
}

impl TcpNetwork {
    pub fn new(access_points: HashMap<AccessPointId, Option<IpAddr>>) -> Self {
        Self {
            access_points: Arc::new(access_points),
        }
    }

    pub fn from_config(network: &NetworkConfig) -> Self {
        Self::new(
            network
                .access_points
                .iter()
                .map(|ap| (ap.id, ap.local_addr))
                .collect(),
        )
    }
}

#[async_trait]
impl NetworkService for TcpNetwork {
    async fn open_session(&self) -> Result<Arc<dyn NetSession>, TransportError> {
        debug!("Opening network session");
        Ok(Arc::new(TcpSession {
            access_points: self.access_points.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct TcpSession {
    access_points: Arc<HashMap<AccessPointId, Option<IpAddr>>>,
    closed: AtomicBool,
}

#[async_trait]
impl NetSession for TcpSession {
    async fn attach(&self, access_point: AccessPointId) -> Result<Arc<dyn Bearer>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::new(TransportStage::Bearer, "session closed"));
        }
        let local = self.access_points.get(&access_point).ok_or_else(|| {
            TransportError::new(
                TransportStage::Bearer,
                format!("unknown access point {}", access_point),
            )
        })?;
        Ok(Arc::new(LocalBearer {
            access_point,
            local: *local,
        }))
    }

    async fn connect(
        &self,
        host: &str,
        port: u16,
        bearer: Option<&dyn Bearer>,
    ) -> Result<Box<dyn ByteStream>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::new(TransportStage::Connect, "session closed"));
        }
        let connect_err = |e: std::io::Error| TransportError::from_io(TransportStage::Connect, &e);

        let remote = tokio::net::lookup_host((host, port))
            .await
            .map_err(connect_err)?
            .next()
            .ok_or_else(|| {
                TransportError::new(
                    TransportStage::Connect,
                    format!("no address for {}", host),
                )
            })?;

        let stream = match bearer.and_then(|b| b.local_addr()) {
            Some(local) => {
                let socket = if remote.is_ipv4() {
                    TcpSocket::new_v4()
                } else {
                    TcpSocket::new_v6()
                }
                .map_err(connect_err)?;
                socket
                    .bind(SocketAddr::new(local, 0))
                    .map_err(connect_err)?;
                socket.connect(remote).await.map_err(connect_err)?
            }
            None => TcpStream::connect(remote).await.map_err(connect_err)?,
        };
        debug!(remote = %remote, "Connected");
        Ok(Box::new(stream))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct LocalBearer {
    access_point: AccessPointId,
    local: Option<IpAddr>,
}

impl Bearer for LocalBearer {
    fn access_point(&self) -> AccessPointId {
        self.access_point
    }

    fn local_addr(&self) -> Option<IpAddr> {
        self.local
    }

    fn close(&self) {
        debug!(access_point = %self.access_point, "Bearer closed");
    }
}
