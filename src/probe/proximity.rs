//! Short-range device discovery probe.
//!
//! Discovery is iterative: the session answers "find first" and then each
//! "find next" with one device, until it reports the end-of-results code. A
//! wall-clock guard bounds the whole scan; when it fires the devices found so
//! far are reported as a successful result.

use super::ScanOutcome;
use crate::card::ProximityDevice;
use crate::error::ProbeError;
use crate::notice::{Notice, Notifier};
use crate::task::ActiveOp;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(25);

/// Status code of a discovery step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryCode(pub i32);

impl DiscoveryCode {
    /// No more devices; ends the session successfully.
    pub const END_OF_RESULTS: DiscoveryCode = DiscoveryCode(-25);
}

/// Device as reported by the radio, address still in raw byte form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDevice {
    pub address: Vec<u8>,
    pub name: String,
}

#[async_trait]
pub trait DiscoverySession: Send {
    async fn find_first(&mut self) -> Result<RawDevice, DiscoveryCode>;
    async fn find_next(&mut self) -> Result<RawDevice, DiscoveryCode>;
    /// Abort the outstanding request, if any.
    fn cancel(&mut self);
}

#[async_trait]
pub trait DiscoveryService: Send + Sync {
    async fn open(&self) -> Result<Box<dyn DiscoverySession>, ProbeError>;
}

/// Colon-separated lowercase hex form of a raw address, e.g. `00:1a:7d:da:71:13`.
pub fn expand_address(raw: &[u8]) -> String {
    raw.iter()
        .map(|b| hex::encode([*b]))
        .collect::<Vec<_>>()
        .join(":")
}

enum Step {
    Reply(Result<RawDevice, DiscoveryCode>),
    TimedOut,
    Cancelled,
}

pub struct ProximityScanner {
    service: Arc<dyn DiscoveryService>,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    op: ActiveOp,
    unavailable_reported: AtomicBool,
}

impl ProximityScanner {
    pub fn new(service: Arc<dyn DiscoveryService>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            service,
            notifier,
            timeout: DEFAULT_SCAN_TIMEOUT,
            op: ActiveOp::new(),
            unavailable_reported: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one discovery session.
    ///
    /// Starting a scan while another is active cancels the older one. Returns
    /// `None` if cancelled.
    pub async fn scan(&self) -> Option<ScanOutcome<Vec<ProximityDevice>>> {
        let guard = self.op.begin_replacing();
        let token = guard.token().clone();

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            opened = self.service.open() => opened,
        };
        let mut session = match opened {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Could not open discovery session");
                if !self.unavailable_reported.swap(true, Ordering::SeqCst) {
                    self.notifier
                        .notify(Notice::error("Could not scan proximity: Is Bluetooth enabled?"));
                }
                return Some(ScanOutcome::Failure);
            }
        };

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let mut found: Vec<ProximityDevice> = Vec::new();
        let mut first = true;

        loop {
            let step = {
                let request = if first {
                    session.find_first()
                } else {
                    session.find_next()
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Step::Cancelled,
                    _ = &mut deadline => Step::TimedOut,
                    reply = request => Step::Reply(reply),
                }
            };
            first = false;

            match step {
                Step::Reply(Ok(raw)) => {
                    let address = expand_address(&raw.address);
                    debug!(address = %address, name = %raw.name, "Discovered device");
                    if !found.iter().any(|d| d.address == address) {
                        found.push(ProximityDevice {
                            address,
                            name: raw.name,
                        });
                    }
                }
                Step::Reply(Err(DiscoveryCode::END_OF_RESULTS)) => {
                    debug!(devices = found.len(), "Discovery finished");
                    return Some(ScanOutcome::Success(found));
                }
                Step::Reply(Err(code)) => {
                    session.cancel();
                    warn!(code = code.0, "Discovery failed");
                    self.notifier.notify(Notice::error("Bluetooth scan failed"));
                    return Some(ScanOutcome::Failure);
                }
                Step::TimedOut => {
                    session.cancel();
                    info!(
                        devices = found.len(),
                        timeout_secs = self.timeout.as_secs(),
                        "Proximity scan timed out, keeping partial result"
                    );
                    return Some(ScanOutcome::Success(found));
                }
                Step::Cancelled => {
                    session.cancel();
                    debug!("Proximity scan cancelled");
                    return None;
                }
            }
        }
    }

    /// Abort the active scan without reporting a result.
    pub fn cancel(&self) {
        self.op.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.op.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<Notice>>);

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.0.lock().push(notice);
        }
    }

    /// Session replaying scripted replies, each after a delay
    struct Scripted {
        replies: VecDeque<(Duration, Result<RawDevice, DiscoveryCode>)>,
        cancelled: Arc<AtomicBool>,
    }

    impl Scripted {
        async fn reply(&mut self) -> Result<RawDevice, DiscoveryCode> {
            match self.replies.pop_front() {
                Some((delay, reply)) => {
                    tokio::time::sleep(delay).await;
                    reply
                }
                None => std::future::pending().await,
            }
        }
    }

    #[async_trait]
    impl DiscoverySession for Scripted {
        async fn find_first(&mut self) -> Result<RawDevice, DiscoveryCode> {
            self.reply().await
        }
        async fn find_next(&mut self) -> Result<RawDevice, DiscoveryCode> {
            self.reply().await
        }
        fn cancel(&mut self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    struct Service {
        script: Mutex<Option<Vec<(Duration, Result<RawDevice, DiscoveryCode>)>>>,
        cancelled: Arc<AtomicBool>,
    }

    impl Service {
        fn new(script: Vec<(Duration, Result<RawDevice, DiscoveryCode>)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(Some(script)),
                cancelled: Arc::new(AtomicBool::new(false)),
            })
        }

        fn unavailable() -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(None),
                cancelled: Arc::new(AtomicBool::new(false)),
            })
        }
    }

    #[async_trait]
    impl DiscoveryService for Service {
        async fn open(&self) -> Result<Box<dyn DiscoverySession>, ProbeError> {
            let script = self
                .script
                .lock()
                .clone()
                .ok_or_else(|| ProbeError::Unavailable("radio off".to_string()))?;
            Ok(Box::new(Scripted {
                replies: script.into(),
                cancelled: self.cancelled.clone(),
            }))
        }
    }

    fn device(last: u8, name: &str) -> Result<RawDevice, DiscoveryCode> {
        Ok(RawDevice {
            address: vec![0x00, 0x1a, 0x7d, 0xda, 0x71, last],
            name: name.to_string(),
        })
    }

    fn scanner(service: Arc<Service>) -> (ProximityScanner, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (ProximityScanner::new(service, notifier.clone()), notifier)
    }

    const SHORT: Duration = Duration::from_millis(10);

    #[test]
    fn expands_raw_address() {
        assert_eq!(
            expand_address(&[0x00, 0x1a, 0x7d, 0xda, 0x71, 0x13]),
            "00:1a:7d:da:71:13"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_results_returns_devices_in_discovery_order() {
        let service = Service::new(vec![
            (SHORT, device(2, "phone")),
            (SHORT, device(1, "laptop")),
            (SHORT, device(2, "phone again")),
            (SHORT, Err(DiscoveryCode::END_OF_RESULTS)),
        ]);
        let (scanner, notifier) = scanner(service);

        let outcome = scanner.scan().await.unwrap();
        let devices = outcome.into_option().unwrap();
        let names: Vec<_> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["phone", "laptop"]);
        assert_eq!(devices[0].address, "00:1a:7d:da:71:02");
        assert!(notifier.0.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_scan_is_success() {
        let service = Service::new(vec![(SHORT, Err(DiscoveryCode::END_OF_RESULTS))]);
        let (scanner, _) = scanner(service);
        assert_eq!(scanner.scan().await, Some(ScanOutcome::Success(Vec::new())));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_partial_list() {
        let service = Service::new(vec![
            (Duration::from_secs(5), device(1, "first")),
            (Duration::from_secs(5), device(2, "second")),
            (Duration::from_secs(60), device(3, "too late")),
        ]);
        let cancelled = service.cancelled.clone();
        let (scanner, notifier) = scanner(service);

        let outcome = scanner.scan().await.unwrap();
        let devices = outcome.into_option().unwrap();
        assert_eq!(devices.len(), 2);
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(notifier.0.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn other_error_code_fails_and_notifies() {
        let service = Service::new(vec![
            (SHORT, device(1, "first")),
            (SHORT, Err(DiscoveryCode(-18))),
        ]);
        let (scanner, notifier) = scanner(service);

        assert_eq!(scanner.scan().await, Some(ScanOutcome::Failure));
        let notices = notifier.0.lock();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, "Bluetooth scan failed");
    }

    #[tokio::test]
    async fn unavailable_radio_is_reported_once() {
        let (scanner, notifier) = scanner(Service::unavailable());
        assert_eq!(scanner.scan().await, Some(ScanOutcome::Failure));
        assert_eq!(scanner.scan().await, Some(ScanOutcome::Failure));
        assert_eq!(notifier.0.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_ends_scan_without_result() {
        let service = Service::new(vec![(Duration::from_secs(10), device(1, "slow"))]);
        let cancelled = service.cancelled.clone();
        let (scanner, _) = scanner(service);
        let scanner = Arc::new(scanner);

        let task = {
            let scanner = scanner.clone();
            tokio::spawn(async move { scanner.scan().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scanner.is_active());
        scanner.cancel();

        assert_eq!(task.await.unwrap(), None);
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(!scanner.is_active());
    }
}
