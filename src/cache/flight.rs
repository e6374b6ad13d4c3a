//! In-flight production tracking
//!
//! At most one production runs per artifact id. Later callers for the same id
//! join the running one through a shared future and observe the same result,
//! success or error. Productions are spawned, so a caller that stops waiting
//! does not cancel the work for the others.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::entry::{ArtifactEntry, ArtifactId};
use crate::error::{Error, Result};

/// A production every waiter can poll
pub type Production = Shared<BoxFuture<'static, Result<ArtifactEntry>>>;

/// Map of running productions keyed by artifact id
#[derive(Default)]
pub struct SingleFlight {
    in_flight: Arc<DashMap<ArtifactId, Production>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the production for `id`, or start one with `start` if none is
    /// running. Returns the shared production and whether this call started it.
    ///
    /// The marker is removed when the production finishes, before waiters
    /// observe the result.
    pub fn join_or_start<F>(&self, id: &ArtifactId, start: F) -> (Production, bool)
    where
        F: FnOnce() -> BoxFuture<'static, Result<ArtifactEntry>>,
    {
        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(running) => (running.get().clone(), false),
            Entry::Vacant(slot) => {
                let work = start();
                let in_flight = Arc::clone(&self.in_flight);
                let key = id.clone();

                let handle = tokio::spawn(async move {
                    let result = work.await;
                    in_flight.remove(&key);
                    result
                });

                let production = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(Error::Internal(format!("production task failed: {}", e))),
                    }
                }
                .boxed()
                .shared();

                slot.insert(production.clone());
                (production, true)
            }
        }
    }

    /// Check whether a production is running for `id`
    pub fn is_running(&self, id: &ArtifactId) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Number of running productions
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

/// Per-id async locks serializing tier mutations for one artifact
#[derive(Default)]
pub struct IdLocks {
    locks: DashMap<ArtifactId, Arc<Mutex<()>>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `id`
    pub async fn lock(&self, id: &ArtifactId) -> IdGuard<'_> {
        let mutex = Arc::clone(&self.locks.entry(id.clone()).or_default());
        let guard = mutex.lock_owned().await;
        IdGuard {
            locks: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    /// Number of ids with a live lock
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held lock for one id; the map slot is dropped with the last holder
pub struct IdGuard<'a> {
    locks: &'a IdLocks,
    id: ArtifactId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CastOptions, ContentKind, ContentSource};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn make_id(name: &str) -> ArtifactId {
        let source = ContentSource::parse(ContentKind::Video, name).unwrap();
        let options = CastOptions::parse(ContentKind::Video, &serde_json::Value::Null).unwrap();
        ArtifactId::compute(ContentKind::Video, &source, &options)
    }

    fn slow_entry(id: ArtifactId, calls: Arc<AtomicUsize>) -> BoxFuture<'static, Result<ArtifactEntry>> {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(ArtifactEntry::new(
                id,
                ContentKind::Video,
                Bytes::from_static(b"frames"),
                "video/mp4",
            ))
        }
        .boxed()
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_production() {
        let flight = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let id = make_id("movie.mp4");

        let (first, started_first) = flight.join_or_start(&id, || slow_entry(id.clone(), calls.clone()));
        let (second, started_second) =
            flight.join_or_start(&id, || slow_entry(id.clone(), calls.clone()));

        assert!(started_first);
        assert!(!started_second);
        assert!(flight.is_running(&id));

        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.unwrap().payload(), b.unwrap().payload());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flight.is_running(&id));
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_not_sticky() {
        let flight = SingleFlight::new();
        let id = make_id("broken.mp4");

        let fail = || {
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<ArtifactEntry, _>(Error::RenderFailed {
                    content_type: "video".to_string(),
                    cause: "decoder crashed".to_string(),
                })
            }
            .boxed()
        };

        let (first, _) = flight.join_or_start(&id, fail);
        let (second, started) = flight.join_or_start(&id, fail);
        assert!(!started);

        let (a, b) = tokio::join!(first, second);
        assert!(a.is_err());
        assert_eq!(a.unwrap_err().to_string(), b.unwrap_err().to_string());

        let calls = Arc::new(AtomicUsize::new(0));
        let (retry, started) = flight.join_or_start(&id, || slow_entry(id.clone(), calls.clone()));
        assert!(started);
        assert!(retry.await.is_ok());
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_cancel_production() {
        let flight = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let id = make_id("long.mp4");

        let (production, _) = flight.join_or_start(&id, || slow_entry(id.clone(), calls.clone()));
        let timed_out = tokio::time::timeout(Duration::from_millis(5), production).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(flight.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_id_locks_are_released() {
        let locks = IdLocks::new();
        let id = make_id("a.mp4");
        {
            let _guard = locks.lock(&id).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_id_locks_serialize_holders() {
        let locks = Arc::new(IdLocks::new());
        let id = make_id("a.mp4");
        let active = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let active = Arc::clone(&active);
                let id = id.clone();
                tokio::spawn(async move {
                    let _guard = locks.lock(&id).await;
                    assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert!(locks.is_empty());
    }
}
