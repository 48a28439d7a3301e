// src/watch/watcher.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::path_utils::relative_str;
use crate::watch::filter::WatchPredicate;

/// Capacity of the event stream handed to the caller.
const EVENT_BUFFER: usize = 256;

/// Kind of a filtered filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Modified,
    Removed,
    /// The path was renamed away (its old name).
    RenamedFrom,
    /// The path was renamed into place (its new name).
    RenamedTo,
}

impl FsEventKind {
    /// True if the path no longer exists after this event.
    pub fn is_removal(self) -> bool {
        matches!(self, FsEventKind::Removed | FsEventKind::RenamedFrom)
    }
}

/// A filesystem event that passed the include predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    /// Forward-slash path relative to the watch root.
    pub rel_path: String,
    pub kind: FsEventKind,
    pub is_dir: bool,
}

/// Item of the watcher's output stream.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Fs(FsEvent),
    /// The underlying notifier failed. The stream ends right after this.
    Error(String),
}

/// Recursive watcher built from one non-recursive subscription per
/// directory.
///
/// Only directories accepted by the predicate are subscribed, so excluded
/// subtrees (build output, `.git`, ...) cost nothing. The subscription set
/// is owned by the watch loop task and never shared.
///
/// Dropping the watcher (or calling [`RecursiveWatcher::stop`]) releases all
/// subscriptions and closes the event stream.
#[derive(Debug)]
pub struct RecursiveWatcher {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RecursiveWatcher {
    /// Subscribe to every accepted directory under `root` and start the
    /// watch loop.
    ///
    /// Must be called from within a Tokio runtime. Subscription errors for
    /// the initial tree are returned; later ones are logged.
    pub fn start(
        root: impl Into<PathBuf>,
        predicate: WatchPredicate,
    ) -> Result<(Self, mpsc::Receiver<WatchEvent>)> {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let notifier = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if raw_tx.send(res).is_err() {
                    debug!("watch loop gone; dropping notify event");
                }
            },
            Config::default(),
        )?;

        let mut subs = Subscriptions {
            root: root.clone(),
            notifier,
            dirs: HashSet::new(),
            predicate,
            fs: RealFileSystem,
        };
        subs.subscribe_tree(&root)?;

        info!(
            root = ?root,
            directories = subs.dirs.len(),
            "file watcher started"
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_watch_loop(subs, raw_rx, tx, cancel.clone()));

        Ok((
            Self {
                cancel,
                task: Some(task),
            },
            rx,
        ))
    }

    /// Stop watching and wait for the loop to exit.
    ///
    /// Safe to call whether or not any event was ever emitted, and while a
    /// send to a full stream is pending.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "watch loop task failed");
            }
        }
    }
}

impl Drop for RecursiveWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Live directory subscriptions, indexed by absolute path.
struct Subscriptions {
    root: PathBuf,
    notifier: RecommendedWatcher,
    dirs: HashSet<PathBuf>,
    predicate: WatchPredicate,
    fs: RealFileSystem,
}

impl Subscriptions {
    fn accepts(&self, rel: &str, is_dir: bool) -> bool {
        (self.predicate)(rel, is_dir)
    }

    fn subscribe(&mut self, dir: &Path) -> Result<()> {
        if self.dirs.contains(dir) {
            return Ok(());
        }
        self.notifier.watch(dir, RecursiveMode::NonRecursive)?;
        debug!(dir = ?dir, "watching directory");
        self.dirs.insert(dir.to_path_buf());
        Ok(())
    }

    fn unsubscribe_tree(&mut self, dir: &Path) {
        let gone: Vec<PathBuf> = self
            .dirs
            .iter()
            .filter(|d| d.starts_with(dir))
            .cloned()
            .collect();
        for d in gone {
            // The kernel usually dropped the watch already.
            if let Err(err) = self.notifier.unwatch(&d) {
                debug!(dir = ?d, error = %err, "unwatch failed");
            }
            self.dirs.remove(&d);
        }
    }

    /// Subscribe `top` and every accepted directory below it.
    ///
    /// Returns the accepted files found on the way.
    fn subscribe_tree(&mut self, top: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut stack = vec![top.to_path_buf()];

        while let Some(dir) = stack.pop() {
            let Some(rel) = relative_str(&self.root, &dir) else {
                continue;
            };
            if !self.accepts(&rel, true) {
                continue;
            }
            self.subscribe(&dir)?;

            let entries = match self.fs.read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    // Raced with a removal.
                    debug!(dir = ?dir, error = %err, "cannot list directory");
                    continue;
                }
            };
            for path in entries {
                if self.fs.is_dir(&path) {
                    stack.push(path);
                } else if let Some(rel) = relative_str(&self.root, &path) {
                    if self.accepts(&rel, false) {
                        files.push(path);
                    }
                }
            }
        }

        Ok(files)
    }

    /// Update subscriptions for one raw event and return what to emit.
    fn handle(&mut self, path: PathBuf, kind: FsEventKind) -> Vec<FsEvent> {
        let Some(rel) = relative_str(&self.root, &path) else {
            debug!(path = ?path, "event outside watch root");
            return Vec::new();
        };
        if rel.is_empty() {
            return Vec::new();
        }

        match kind {
            FsEventKind::Removed | FsEventKind::RenamedFrom => {
                let was_dir = self.dirs.contains(&path);
                if was_dir {
                    self.unsubscribe_tree(&path);
                }
                if !self.accepts(&rel, was_dir) {
                    return Vec::new();
                }
                vec![FsEvent {
                    path,
                    rel_path: rel,
                    kind,
                    is_dir: was_dir,
                }]
            }
            FsEventKind::Created | FsEventKind::RenamedTo => {
                let is_dir = self.fs.is_dir(&path);
                if !self.accepts(&rel, is_dir) {
                    return Vec::new();
                }
                let mut out = Vec::new();
                if is_dir {
                    // Files may land before the subscription does; report
                    // what is already there.
                    match self.subscribe_tree(&path) {
                        Ok(files) => {
                            out.extend(files.into_iter().filter_map(|file| {
                                let rel_path = relative_str(&self.root, &file)?;
                                Some(FsEvent {
                                    path: file,
                                    rel_path,
                                    kind: FsEventKind::Created,
                                    is_dir: false,
                                })
                            }));
                        }
                        Err(err) => warn!(dir = ?path, error = %err, "failed to watch new directory"),
                    }
                }
                out.insert(
                    0,
                    FsEvent {
                        path,
                        rel_path: rel,
                        kind,
                        is_dir,
                    },
                );
                out
            }
            FsEventKind::Modified => {
                if self.fs.is_dir(&path) || !self.accepts(&rel, false) {
                    return Vec::new();
                }
                vec![FsEvent {
                    path,
                    rel_path: rel,
                    kind,
                    is_dir: false,
                }]
            }
        }
    }
}

/// Map a raw `notify` event onto per-path kinds.
pub fn classify(event: &Event) -> Vec<(PathBuf, FsEventKind)> {
    let all = |kind: FsEventKind| -> Vec<(PathBuf, FsEventKind)> {
        event.paths.iter().map(|p| (p.clone(), kind)).collect()
    };

    match &event.kind {
        EventKind::Create(_) => all(FsEventKind::Created),
        EventKind::Remove(_) => all(FsEventKind::Removed),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => all(FsEventKind::RenamedFrom),
            RenameMode::To => all(FsEventKind::RenamedTo),
            RenameMode::Both => event
                .paths
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let kind = if i == 0 {
                        FsEventKind::RenamedFrom
                    } else {
                        FsEventKind::RenamedTo
                    };
                    (p.clone(), kind)
                })
                .collect(),
            // Backends that can't tell the halves apart.
            _ => event
                .paths
                .iter()
                .map(|p| {
                    let kind = if p.exists() {
                        FsEventKind::RenamedTo
                    } else {
                        FsEventKind::RenamedFrom
                    };
                    (p.clone(), kind)
                })
                .collect(),
        },
        EventKind::Modify(_) | EventKind::Any => all(FsEventKind::Modified),
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

async fn run_watch_loop(
    mut subs: Subscriptions,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    tx: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
) {
    'outer: loop {
        let raw = tokio::select! {
            _ = cancel.cancelled() => break,
            raw = raw_rx.recv() => raw,
        };

        let event = match raw {
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                warn!(error = %err, "file watch error; stopping watcher");
                forward(&tx, WatchEvent::Error(err.to_string()), &cancel).await;
                break;
            }
            None => break,
        };

        debug!(?event, "received notify event");

        for (path, kind) in classify(&event) {
            for fs_event in subs.handle(path, kind) {
                if !forward(&tx, WatchEvent::Fs(fs_event), &cancel).await {
                    break 'outer;
                }
            }
        }
    }

    debug!(directories = subs.dirs.len(), "watch loop finished");
}

/// Send unless cancelled first. Returns `false` if the loop should stop.
async fn forward(
    tx: &mpsc::Sender<WatchEvent>,
    event: WatchEvent,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        res = tx.send(event) => res.is_ok(),
    }
}
