//! Attachment inbox.
//!
//! Watches a directory for arriving documents. An arrival is read only after
//! the settle delay has passed without a newer arrival; the file is then
//! removed from the inbox and put on the card as its attachment.

use crate::card::{basename, Attachment, SharedCard};
use crate::config::AttachmentConfig;
use crate::error::InboxError;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Called with the attachment name once it is on the card.
pub type ArrivalCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct Observation {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

pub struct AttachmentInbox {
    dir: PathBuf,
    extension: String,
    settle: Duration,
    card: SharedCard,
    observation: Mutex<Option<Observation>>,
}

impl AttachmentInbox {
    pub fn new(config: &AttachmentConfig, card: SharedCard) -> Self {
        Self {
            dir: config.inbox_dir.clone(),
            extension: config.extension.clone(),
            settle: config.settle_delay(),
            card,
            observation: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start watching the inbox, creating it if needed. No-op while already
    /// observing. Must be called within a Tokio runtime.
    pub fn start_observing(&self, on_arrival: ArrivalCallback) -> Result<(), InboxError> {
        let mut observation = self.observation.lock();
        if observation.is_some() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir).map_err(|source| InboxError::Directory {
            path: self.dir.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| self.watch_error(e))?;
        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| self.watch_error(e))?;

        let task = tokio::spawn(observe(
            rx,
            self.extension.clone(),
            self.settle,
            self.card.clone(),
            on_arrival,
        ));
        *observation = Some(Observation {
            _watcher: watcher,
            task,
        });
        info!(dir = %self.dir.display(), "Observing attachment inbox");
        Ok(())
    }

    /// Stop watching. An arrival still waiting out its settle delay is dropped
    /// and stays in the inbox.
    pub fn stop_observing(&self) {
        if let Some(observation) = self.observation.lock().take() {
            observation.task.abort();
            info!("Not observing attachment inbox");
        }
    }

    pub fn is_observing(&self) -> bool {
        self.observation.lock().is_some()
    }

    fn watch_error(&self, err: notify::Error) -> InboxError {
        InboxError::Watch {
            path: self.dir.clone(),
            message: err.to_string(),
        }
    }
}

impl Drop for AttachmentInbox {
    fn drop(&mut self) {
        self.stop_observing();
    }
}

async fn observe(
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    extension: String,
    settle: Duration,
    card: SharedCard,
    on_arrival: ArrivalCallback,
) {
    let mut pending: Option<PathBuf> = None;
    let timer = tokio::time::sleep(settle);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(Ok(event)) => {
                    if let Some(path) = arrived_path(&event, &extension) {
                        debug!(path = %path.display(), "Attachment arrived");
                        // A newer arrival restarts the wait and replaces the older one.
                        pending = Some(path.to_path_buf());
                        timer.as_mut().reset(Instant::now() + settle);
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Inbox watch error"),
                None => break,
            },
            () = &mut timer, if pending.is_some() => {
                if let Some(path) = pending.take() {
                    take_attachment(&path, &card, on_arrival.as_ref());
                }
            }
        }
    }
}

/// The file an event brought into the inbox, if it carries `extension`.
fn arrived_path<'a>(event: &'a Event, extension: &str) -> Option<&'a Path> {
    let path = match event.kind {
        EventKind::Create(_) => event.paths.first(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
            event.paths.last()
        }
        _ => None,
    }?;
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        .then_some(path.as_path())
}

fn take_attachment(path: &Path, card: &SharedCard, on_arrival: &(dyn Fn(&str) + Send + Sync)) {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read attachment");
            return;
        }
    };
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Could not remove attachment from inbox");
    }
    let name = basename(path).unwrap_or_else(|| "attachment".to_string());
    info!(name = %name, bytes = data.len(), "Attachment received");
    card.lock().set_attachment(Some(Attachment {
        name: name.clone(),
        data,
    }));
    on_arrival(&name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardDefaults, ContextSnapshot};
    use crate::clock::SystemClock;
    use notify::event::{CreateKind, RemoveKind};
    use tempfile::TempDir;

    fn inbox(dir: &TempDir) -> (AttachmentInbox, SharedCard) {
        let config = AttachmentConfig {
            inbox_dir: dir.path().join("inbox"),
            settle_delay_ms: 50,
            ..AttachmentConfig::default()
        };
        let card = ContextSnapshot::new(&CardDefaults::default(), Arc::new(SystemClock)).into_shared();
        (AttachmentInbox::new(&config, card.clone()), card)
    }

    fn arrivals() -> (ArrivalCallback, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: ArrivalCallback = Arc::new(move |name: &str| {
            let _ = tx.send(name.to_string());
        });
        (callback, rx)
    }

    #[test]
    fn arrived_path_filters_kind_and_extension() {
        let create = |path: &str| {
            Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from(path))
        };
        assert_eq!(
            arrived_path(&create("/in/notes.doc"), "doc"),
            Some(Path::new("/in/notes.doc"))
        );
        assert!(arrived_path(&create("/in/NOTES.DOC"), "doc").is_some());
        assert!(arrived_path(&create("/in/photo.jpg"), "doc").is_none());
        assert!(arrived_path(&create("/in/doc"), "doc").is_none());

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/in/partial.tmp"))
            .add_path(PathBuf::from("/in/notes.doc"));
        assert_eq!(
            arrived_path(&renamed, "doc"),
            Some(Path::new("/in/notes.doc"))
        );

        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/in/notes.doc"));
        assert!(arrived_path(&removed, "doc").is_none());
    }

    #[tokio::test]
    async fn arriving_document_is_attached_and_removed() {
        let dir = TempDir::new().unwrap();
        let (inbox, card) = inbox(&dir);
        let (callback, mut rx) = arrivals();
        inbox.start_observing(callback).unwrap();
        assert!(inbox.is_observing());

        std::fs::write(inbox.dir().join("photo.jpg"), b"jpeg").unwrap();
        std::fs::write(inbox.dir().join("notes.doc"), b"minutes").unwrap();

        let name = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(name, "notes.doc");
        let attachment = card.lock().attachment().cloned().unwrap();
        assert_eq!(attachment.data, b"minutes");
        assert!(!inbox.dir().join("notes.doc").exists());
        assert!(inbox.dir().join("photo.jpg").exists());

        inbox.stop_observing();
        assert!(!inbox.is_observing());
    }

    #[tokio::test]
    async fn stopped_inbox_leaves_arrivals_alone() {
        let dir = TempDir::new().unwrap();
        let (inbox, card) = inbox(&dir);
        let (callback, mut rx) = arrivals();
        inbox.start_observing(callback.clone()).unwrap();
        // Starting again keeps the running observation.
        inbox.start_observing(callback).unwrap();
        inbox.stop_observing();

        std::fs::write(inbox.dir().join("late.doc"), b"late").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(rx.try_recv().is_err());
        assert!(card.lock().attachment().is_none());
        assert!(inbox.dir().join("late.doc").exists());
    }
}
