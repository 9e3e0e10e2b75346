//! Single-flight load-and-cache of named models (C2).
//!
//! Prevents N concurrent callers from each loading the same multi-GiB model, and
//! interlocks loads with the [`MemoryGuard`].

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::memory_guard::MemoryGuard;

type CachedModel = Arc<dyn Any + Send + Sync>;

pub struct ModelRegistry {
    memory_guard: Arc<MemoryGuard>,
    entries: Mutex<HashMap<String, Arc<Mutex<Option<CachedModel>>>>>,
}

impl ModelRegistry {
    pub fn new(memory_guard: Arc<MemoryGuard>) -> Self {
        Self {
            memory_guard,
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn entry_lock(&self, name: &str) -> Arc<Mutex<Option<CachedModel>>> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Returns the cached model for `name`, loading it via `loader` on first use.
    /// Concurrent callers for the same `name` serialize on the per-name lock; the
    /// loader only runs once.
    pub async fn get_or_load<T, F, Fut>(&self, name: &str, loader: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lock = self.entry_lock(name).await;
        let mut slot = lock.lock().await;
        if let Some(cached) = slot.as_ref() {
            return cached
                .clone()
                .downcast::<T>()
                .map_err(|_| anyhow::anyhow!("model '{name}' cached under a different type"));
        }
        self.memory_guard.wait_for_recovery().await;
        let model = loader().await?;
        let arc: CachedModel = Arc::new(model);
        *slot = Some(arc.clone());
        tracing::info!(model = name, "model loaded");
        arc.downcast::<T>()
            .map_err(|_| anyhow::anyhow!("model '{name}' loaded under a different type"))
    }

    pub async fn unload(&self, name: &str) {
        let mut entries = self.entries.lock().await;
        if entries.remove(name).is_some() {
            tracing::info!(model = name, "model unloaded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn loads_once_across_concurrent_callers() {
        let registry = Arc::new(ModelRegistry::new(Arc::new(MemoryGuard::new(0))));
        let load_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let load_count = load_count.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .get_or_load::<String, _, _>("dummy", || {
                        let load_count = load_count.clone();
                        async move {
                            load_count.fetch_add(1, Ordering::SeqCst);
                            Ok("loaded".to_string())
                        }
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            let value = handle.await.unwrap();
            assert_eq!(*value, "loaded");
        }
        assert_eq!(load_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unload_allows_reload() {
        let registry = ModelRegistry::new(Arc::new(MemoryGuard::new(0)));
        registry
            .get_or_load::<u32, _, _>("x", || async { Ok(1u32) })
            .await
            .unwrap();
        registry.unload("x").await;
        let reloaded = registry
            .get_or_load::<u32, _, _>("x", || async { Ok(2u32) })
            .await
            .unwrap();
        assert_eq!(*reloaded, 2);
    }
}
