use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Per-directory reader/writer locks.
///
/// At most one ingestion mutates an index directory at a time, and queries never load a
/// directory while its files are being rewritten.
#[derive(Debug, Clone, Default)]
pub struct IndexLocks {
    inner: Arc<Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>>,
}

impl IndexLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `dir`. The lock is released when the guard drops.
    pub async fn acquire(&self, dir: &Path) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(dir).write_owned().await
    }

    /// Wait until no writer holds `dir`; readers share the directory.
    pub async fn acquire_read(&self, dir: &Path) -> OwnedRwLockReadGuard<()> {
        self.lock_for(dir).read_owned().await
    }

    fn lock_for(&self, dir: &Path) -> Arc<RwLock<()>> {
        let key = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
        let mut map = match self.inner.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(map.entry(key).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn same_directory_is_exclusive() {
        let locks = IndexLocks::new();
        let guard = locks.acquire(Path::new("vector_index/shared")).await;

        let blocked = timeout(
            Duration::from_millis(50),
            locks.acquire(Path::new("vector_index/shared")),
        )
        .await;
        assert!(blocked.is_err());

        drop(guard);
        let reacquired = timeout(
            Duration::from_millis(500),
            locks.acquire(Path::new("vector_index/shared")),
        )
        .await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn different_directories_do_not_contend() {
        let locks = IndexLocks::new();
        let _a = locks.acquire(Path::new("vector_index/a")).await;
        let b = timeout(
            Duration::from_millis(500),
            locks.acquire(Path::new("vector_index/b")),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn readers_wait_for_the_writer_and_share_with_each_other() {
        let locks = IndexLocks::new();
        let dir = Path::new("vector_index/readers");
        let writer = locks.acquire(dir).await;

        let blocked = timeout(Duration::from_millis(50), locks.acquire_read(dir)).await;
        assert!(blocked.is_err());

        drop(writer);
        let first = timeout(Duration::from_millis(500), locks.acquire_read(dir))
            .await
            .expect("first reader");
        let second = timeout(Duration::from_millis(500), locks.acquire_read(dir)).await;
        assert!(second.is_ok());

        let writer = timeout(Duration::from_millis(50), locks.acquire(dir)).await;
        assert!(writer.is_err());
        drop(first);
    }
}
