//! Shared file-change watching for open documents.
//!
//! This module handles:
//! - One OS-level watcher shared by every open document session
//! - Token-based registration so two sessions on the same path stay independent
//! - Broadcasting changed paths to all subscribers
//!
//! The registry watches the *parent directory* of each registered file
//! (non-recursively) rather than the file itself, so editors that save by
//! writing a temp file and renaming it over the original still produce
//! events for the watched path. Directories are refcounted: N registrations
//! under the same directory hold a single OS watch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;

/// Capacity of the change-event broadcast channel. A lagged subscriber
/// re-reads its file's current contents, so overflow loses nothing.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Opaque handle for one registration in the watch-list.
///
/// Registrations are identified by token, not by path value, so a path
/// registered twice can be unregistered exactly once per registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchToken(u64);

/// Process-wide registry of watched files.
///
/// Created once at startup and injected (`Arc<WatchRegistry>`) into each
/// [`DocumentSession`](crate::session::DocumentSession); never a global.
pub struct WatchRegistry {
    inner: Mutex<Inner>,
    events_tx: broadcast::Sender<PathBuf>,
}

struct Inner {
    watcher: RecommendedWatcher,
    next_token: u64,
    /// Token -> directory root that registration holds a share of.
    registrations: HashMap<u64, PathBuf>,
    /// Directory root -> number of live registrations under it.
    roots: HashMap<PathBuf, usize>,
}

impl WatchRegistry {
    /// Create a registry with a freshly started OS watcher.
    ///
    /// The watcher runs immediately; events for directories registered later
    /// start flowing as soon as [`register`](Self::register) returns.
    pub fn new() -> notify::Result<Self> {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let tx = events_tx.clone();
        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) =
                        event.kind
                    {
                        for path in event.paths {
                            // No subscribers yet is fine; events before the
                            // first session finishes opening carry no news.
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("file watcher error: {}", e);
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;

        Ok(Self {
            inner: Mutex::new(Inner {
                watcher,
                next_token: 0,
                registrations: HashMap::new(),
                roots: HashMap::new(),
            }),
            events_tx,
        })
    }

    /// Register interest in changes to `path` and return the token that owns
    /// the registration.
    ///
    /// `path` should already be canonical; sessions canonicalize once at open
    /// time and both watch and filter on the canonical form.
    pub fn register(&self, path: &Path) -> notify::Result<WatchToken> {
        let root = watch_root(path);

        let mut inner = self.inner.lock().expect("watch registry poisoned");

        // First registration under this directory attaches the OS watch.
        if !inner.roots.contains_key(&root) {
            inner.watcher.watch(&root, RecursiveMode::NonRecursive)?;
        }
        *inner.roots.entry(root.clone()).or_insert(0) += 1;

        let token = inner.next_token;
        inner.next_token += 1;
        inner.registrations.insert(token, root);

        Ok(WatchToken(token))
    }

    /// Release one registration. Unknown or already-released tokens are a
    /// no-op, so callers may unregister defensively.
    pub fn unregister(&self, token: WatchToken) {
        let mut inner = self.inner.lock().expect("watch registry poisoned");

        let Some(root) = inner.registrations.remove(&token.0) else {
            return;
        };

        let remaining = match inner.roots.get_mut(&root) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => return,
        };

        if remaining == 0 {
            inner.roots.remove(&root);
            if let Err(e) = inner.watcher.unwatch(&root) {
                log::debug!("unwatch {} failed: {}", root.display(), e);
            }
        }
    }

    /// Subscribe to the stream of changed paths.
    ///
    /// Every subscriber sees every event (broadcast semantics). Delivery is
    /// at-least-once; per-path ordering follows the order the OS reported
    /// changes, ordering across different paths is unspecified.
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.events_tx.subscribe()
    }

    /// Number of live registrations across all tokens.
    pub fn registration_count(&self) -> usize {
        let inner = self.inner.lock().expect("watch registry poisoned");
        inner.registrations.len()
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("registrations", &self.registration_count())
            .finish()
    }
}

/// Directory whose OS watch covers `path`. Falls back to the path itself for
/// a bare root (no parent).
fn watch_root(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => path.to_path_buf(),
    }
}
