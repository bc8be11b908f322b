//! Integration tests for the shared watch registry: event delivery,
//! token accounting, and duplicate-path registrations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use mdlive::watch::WatchRegistry;

/// Path a watched file is reported under: notify events carry paths rooted
/// at the watched (canonical) directory.
fn canonical_file(dir: &Path, name: &str) -> PathBuf {
    dir.canonicalize().expect("canonicalize dir").join(name)
}

/// Receive events until one matches `path` (a single save can fan out into
/// several Create/Modify events).
async fn expect_event_for(rx: &mut broadcast::Receiver<PathBuf>, path: &Path) {
    timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(changed) if changed == path => return,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for change event");
}

#[tokio::test]
async fn registered_file_changes_are_broadcast() {
    let registry = WatchRegistry::new().expect("create registry");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = canonical_file(dir.path(), "a.md");

    std::fs::write(&path, "one").expect("write");
    let mut rx = registry.subscribe();
    let _token = registry.register(&path).expect("register");

    std::fs::write(&path, "two").expect("write");
    expect_event_for(&mut rx, &path).await;
}

#[tokio::test]
async fn every_subscriber_sees_the_event() {
    let registry = WatchRegistry::new().expect("create registry");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = canonical_file(dir.path(), "a.md");

    std::fs::write(&path, "one").expect("write");
    let mut first = registry.subscribe();
    let mut second = registry.subscribe();
    let _token = registry.register(&path).expect("register");

    std::fs::write(&path, "two").expect("write");
    expect_event_for(&mut first, &path).await;
    expect_event_for(&mut second, &path).await;
}

#[tokio::test]
async fn duplicate_path_registrations_are_tracked_per_token() {
    let registry = Arc::new(WatchRegistry::new().expect("create registry"));
    let dir = tempfile::tempdir().expect("tempdir");
    let path = canonical_file(dir.path(), "a.md");
    std::fs::write(&path, "one").expect("write");

    let first = registry.register(&path).expect("register first");
    let second = registry.register(&path).expect("register second");
    assert_eq!(registry.registration_count(), 2);

    // Removing one token must not stop delivery for the other.
    registry.unregister(first);
    let mut rx = registry.subscribe();
    std::fs::write(&path, "two").expect("write");
    expect_event_for(&mut rx, &path).await;

    registry.unregister(second);
    assert_eq!(registry.registration_count(), 0);
}
