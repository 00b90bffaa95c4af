use crate::models::Profile;
use crate::services::store::{ProfileStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Time-bounded corpus snapshot cache in front of a profile store
///
/// Every caller still receives its own copy of the snapshot; the cache only
/// bounds how often the underlying store is read. A snapshot is never served
/// after its TTL has passed.
pub struct CachedProfileStore<S> {
    inner: S,
    snapshot: moka::future::Cache<(), Arc<Vec<Profile>>>,
}

impl<S: ProfileStore> CachedProfileStore<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        let snapshot = moka::future::CacheBuilder::new(1)
            .time_to_live(ttl)
            .build();

        Self { inner, snapshot }
    }

    /// Drop the cached snapshot so the next read goes to the store
    pub async fn invalidate(&self) {
        self.snapshot.invalidate(&()).await;
    }
}

#[async_trait]
impl<S: ProfileStore> ProfileStore for CachedProfileStore<S> {
    async fn list_all_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        // Concurrent misses wait on a single store read
        let profiles = self
            .snapshot
            .try_get_with((), async {
                let profiles = self.inner.list_all_profiles().await?;
                tracing::trace!("Profile snapshot cached ({} profiles)", profiles.len());
                Ok::<_, StoreError>(Arc::new(profiles))
            })
            .await
            .map_err(|e| {
                Arc::try_unwrap(e).unwrap_or_else(|shared| StoreError::ApiError(shared.to_string()))
            })?;

        Ok(profiles.as_ref().clone())
    }

    async fn get_profile(&self, id: &str) -> Result<Profile, StoreError> {
        self.inner.get_profile(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        reads: AtomicUsize,
        fail: bool,
    }

    impl CountingStore {
        fn new(fail: bool) -> Self {
            Self { reads: AtomicUsize::new(0), fail }
        }
    }

    #[async_trait]
    impl ProfileStore for CountingStore {
        async fn list_all_profiles(&self) -> Result<Vec<Profile>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                return Err(StoreError::Unauthorized);
            }
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_snapshot_served_from_cache() {
        let store = CachedProfileStore::new(CountingStore::new(false), Duration::from_secs(60));

        store.list_all_profiles().await.unwrap();
        store.list_all_profiles().await.unwrap();
        assert_eq!(store.inner.reads.load(Ordering::SeqCst), 1);

        store.invalidate().await;
        store.list_all_profiles().await.unwrap();
        assert_eq!(store.inner.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_read() {
        let store = CachedProfileStore::new(CountingStore::new(false), Duration::from_secs(60));

        let (a, b, c) = tokio::join!(
            store.list_all_profiles(),
            store.list_all_profiles(),
            store.list_all_profiles()
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(store.inner.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_errors_are_not_cached() {
        let store = CachedProfileStore::new(CountingStore::new(true), Duration::from_secs(60));

        assert!(store.list_all_profiles().await.is_err());
        assert!(store.list_all_profiles().await.is_err());
        assert_eq!(store.inner.reads.load(Ordering::SeqCst), 2);
    }
}
