//! Card upload over TCP.
//!
//! One request per connection: connect, write the whole encoded request, read
//! exactly [`STATUS_PREFIX_LEN`] response bytes and classify them. The network
//! session and the access-point bearer outlive a single send and are reused
//! until the configured access point changes or the uploader is closed.

pub mod net;
pub mod response;

pub use net::{AccessPointId, Bearer, ByteStream, NetSession, NetworkService, TcpNetwork};
pub use response::{
    classify, ResponseReader, DEBUG_READ_CHUNK, HTTP_ACCEPTED, HTTP_REFUSED, STATUS_PREFIX_LEN,
};

use crate::encode::Endpoint;
use crate::error::{TransportError, TransportStage, UploadError};
use crate::logging::LogHandle;
use crate::settings::SettingsStore;
use crate::task::ActiveOp;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Accepted,
    Refused,
    /// Response prefix matching neither expected status line
    Other(Vec<u8>),
    TransportError(TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Connecting,
    Writing,
    ReadingResponse,
}

#[derive(Default)]
struct Connection {
    session: Option<Arc<dyn NetSession>>,
    bearer: Option<Arc<dyn Bearer>>,
    access_point: Option<AccessPointId>,
}

pub struct Uploader {
    network: Arc<dyn NetworkService>,
    endpoint: Endpoint,
    settings: SettingsStore,
    log: LogHandle,
    debug_read_chunk: usize,
    op: ActiveOp,
    state: Mutex<UploadState>,
    connection: Mutex<Connection>,
}

impl Uploader {
    pub fn new(
        network: Arc<dyn NetworkService>,
        endpoint: Endpoint,
        settings: SettingsStore,
        log: LogHandle,
    ) -> Self {
        Self {
            network,
            endpoint,
            settings,
            log,
            debug_read_chunk: DEBUG_READ_CHUNK,
            op: ActiveOp::new(),
            state: Mutex::new(UploadState::Idle),
            connection: Mutex::new(Connection::default()),
        }
    }

    pub fn with_debug_read_chunk(mut self, chunk: usize) -> Self {
        self.debug_read_chunk = chunk;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> UploadState {
        *self.state.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.op.is_active()
    }

    fn set_state(&self, state: UploadState) {
        *self.state.lock() = state;
    }

    /// Deliver one encoded request.
    ///
    /// Fails with [`UploadError::StillSending`] while another send is active.
    /// Returns `Ok(None)` if the send was cancelled.
    pub async fn send(&self, payload: Vec<u8>) -> Result<Option<UploadOutcome>, UploadError> {
        self.send_until(payload, &CancellationToken::new()).await
    }

    /// Like [`send`](Self::send), but also abandoned as soon as `parent` is
    /// cancelled, including before the connection is opened.
    pub async fn send_until(
        &self,
        payload: Vec<u8>,
        parent: &CancellationToken,
    ) -> Result<Option<UploadOutcome>, UploadError> {
        let guard = self.op.begin().ok_or(UploadError::StillSending)?;
        if parent.is_cancelled() {
            debug!("Send cancelled before connecting");
            return Ok(None);
        }
        let token = guard.token().clone();
        self.set_state(UploadState::Connecting);
        debug!(bytes = payload.len(), host = %self.endpoint.host, "Sending card");

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            _ = parent.cancelled() => None,
            outcome = self.exchange(&payload) => Some(outcome),
        };

        let Some(outcome) = outcome else {
            // cancel() already reset the state and a newer send may own it now;
            // a parent cancellation leaves this send as the owner.
            if !guard.is_cancelled() {
                self.set_state(UploadState::Idle);
            }
            debug!("Send cancelled");
            return Ok(None);
        };
        self.set_state(UploadState::Idle);
        match &outcome {
            UploadOutcome::Accepted => info!("Server accepted card"),
            UploadOutcome::Refused => info!("Server refused card"),
            UploadOutcome::Other(prefix) => warn!(
                response = %String::from_utf8_lossy(prefix),
                "Unexpected response"
            ),
            UploadOutcome::TransportError(e) => warn!(
                stage = %e.stage,
                code = ?e.code,
                error = %e.message,
                "Transport error"
            ),
        }
        drop(guard);
        Ok(Some(outcome))
    }

    async fn exchange(&self, payload: &[u8]) -> UploadOutcome {
        let (session, bearer) = match self.prepare_connection().await {
            Ok(prepared) => prepared,
            Err(e) => return UploadOutcome::TransportError(e),
        };

        let mut stream = match session
            .connect(&self.endpoint.host, self.endpoint.port, bearer.as_deref())
            .await
        {
            Ok(stream) => stream,
            Err(e) => return UploadOutcome::TransportError(e),
        };

        self.set_state(UploadState::Writing);
        let written = async {
            stream.write_all(payload).await?;
            stream.flush().await
        }
        .await;
        if let Err(e) = written {
            return UploadOutcome::TransportError(TransportError::from_io(
                TransportStage::Write,
                &e,
            ));
        }

        self.set_state(UploadState::ReadingResponse);
        let chunk = self.log.is_debug().then_some(self.debug_read_chunk);
        let reader = ResponseReader::new(STATUS_PREFIX_LEN).with_debug_chunk(chunk);
        match reader.read(&mut stream).await {
            Ok(prefix) => classify(&prefix),
            Err(e) => UploadOutcome::TransportError(e),
        }
    }

    /// Open the session once and keep the bearer while the access point is unchanged.
    async fn prepare_connection(
        &self,
    ) -> Result<(Arc<dyn NetSession>, Option<Arc<dyn Bearer>>), TransportError> {
        let existing = self.connection.lock().session.clone();
        let session = match existing {
            Some(session) => session,
            None => {
                let session = self.network.open_session().await?;
                self.connection.lock().session = Some(session.clone());
                session
            }
        };

        let access_point = self.settings.access_point();
        let reusable = {
            let mut conn = self.connection.lock();
            if conn.access_point != access_point {
                if let Some(bearer) = conn.bearer.take() {
                    debug!(access_point = %bearer.access_point(), "Access point changed, closing bearer");
                    bearer.close();
                }
                conn.access_point = access_point;
            }
            conn.bearer.clone()
        };

        let bearer = match (access_point, reusable) {
            (Some(ap), None) => match session.attach(ap).await {
                Ok(bearer) => {
                    self.connection.lock().bearer = Some(bearer.clone());
                    Some(bearer)
                }
                Err(e) => {
                    warn!(access_point = %ap, error = %e, "Could not attach, using default route");
                    None
                }
            },
            (_, reusable) => reusable,
        };
        Ok((session, bearer))
    }

    /// Abort the active send without reporting an outcome.
    pub fn cancel(&self) {
        if self.op.cancel() {
            self.set_state(UploadState::Idle);
            debug!("Upload cancelled");
        }
    }

    /// Cancel any send and release the bearer and session.
    pub fn close(&self) {
        self.cancel();
        let mut conn = self.connection.lock();
        if let Some(bearer) = conn.bearer.take() {
            bearer.close();
        }
        if let Some(session) = conn.session.take() {
            session.close();
        }
        conn.access_point = None;
    }
}

impl Drop for Uploader {
    fn drop(&mut self) {
        self.close();
    }
}
