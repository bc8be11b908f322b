//! One open document's live state and its render pipeline.
//!
//! A [`DocumentSession`] owns two observable slots, `source_text` and
//! `rendered_markup`, and a single background task that keeps them current:
//!
//! ```text
//! registry events -> filter by canonical path -> read file -> source_text
//!                                                   |
//!                                                 render -> rendered_markup
//! ```
//!
//! The slots are only ever written by that task (and once at open), so for a
//! given session updates are strictly ordered and `rendered_markup` is always
//! the rendering of the most recently published `source_text`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::markdown::{MarkdownOptions, render};
use crate::watch::{WatchRegistry, WatchToken};

/// Errors surfaced by [`DocumentSession::open`].
///
/// Only the initial open can fail; after a session is open, a failed re-read
/// drops that update silently and the last good preview stays up.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be canonicalized or read.
    #[error("failed to read `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS watch for the file's directory could not be established.
    #[error("failed to watch `{path}`")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// A live preview of one markdown file.
pub struct DocumentSession {
    path: PathBuf,
    registry: Arc<WatchRegistry>,
    token: Option<WatchToken>,
    pipeline: Option<JoinHandle<()>>,
    source_tx: watch::Sender<String>,
    markup_tx: watch::Sender<String>,
}

impl DocumentSession {
    /// Open `path`, render it once, and start following external changes.
    ///
    /// The path is canonicalized up front; change events are filtered by
    /// comparing canonical forms, so symlinked or relative spellings of the
    /// same file all resolve to one session identity.
    pub async fn open(
        path: impl AsRef<Path>,
        registry: Arc<WatchRegistry>,
    ) -> Result<Self, LoadError> {
        let path = path.as_ref();

        let canonical = tokio::fs::canonicalize(path).await.map_err(|source| {
            LoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let source = tokio::fs::read_to_string(&canonical)
            .await
            .map_err(|source| LoadError::Io {
                path: canonical.clone(),
                source,
            })?;

        let options = MarkdownOptions::all();
        let markup = render(&source, &options);
        let (source_tx, _) = watch::channel(source);
        let (markup_tx, _) = watch::channel(markup);

        // Subscribe before registering so no event between the two is lost.
        let events = registry.subscribe();
        let token = registry
            .register(&canonical)
            .map_err(|source| LoadError::Watch {
                path: canonical.clone(),
                source,
            })?;

        let pipeline = tokio::spawn(run_pipeline(
            canonical.clone(),
            events,
            source_tx.clone(),
            markup_tx.clone(),
            options,
        ));

        Ok(Self {
            path: canonical,
            registry,
            token: Some(token),
            pipeline: Some(pipeline),
            source_tx,
            markup_tx,
        })
    }

    /// The canonical path of the previewed file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Observe the latest known file contents.
    pub fn source_text(&self) -> watch::Receiver<String> {
        self.source_tx.subscribe()
    }

    /// Observe the latest rendered HTML.
    pub fn rendered_markup(&self) -> watch::Receiver<String> {
        self.markup_tx.subscribe()
    }

    /// Stop following changes and release this session's watch registration.
    ///
    /// Idempotent: the second and later calls are no-ops, so a session that
    /// was closed explicitly can still be dropped safely. After the first
    /// call neither slot receives further updates.
    pub fn close(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.abort();
        }
        if let Some(token) = self.token.take() {
            self.registry.unregister(token);
        }
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSession")
            .field("path", &self.path)
            .field("open", &self.token.is_some())
            .finish()
    }
}

/// Per-session pipeline: one filtered subscription feeding two slots.
async fn run_pipeline(
    path: PathBuf,
    mut events: broadcast::Receiver<PathBuf>,
    source_tx: watch::Sender<String>,
    markup_tx: watch::Sender<String>,
    options: MarkdownOptions,
) {
    loop {
        match events.recv().await {
            Ok(changed) if changed != path => continue,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // The skipped window may have held the last event for this
                // path, so re-read now instead of waiting for another one.
                log::debug!("{}: change stream lagged by {}", path.display(), skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }

        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) => {
                // File deleted or locked mid-write: keep the last good
                // preview and wait for the next change event.
                log::debug!("{}: re-read failed, keeping stale preview: {}", path.display(), e);
                continue;
            }
        };

        let markup = render(&source, &options);
        // send_replace retains the value even while nobody is subscribed.
        source_tx.send_replace(source);
        markup_tx.send_replace(markup);
    }
}
