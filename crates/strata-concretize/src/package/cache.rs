use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::trace;

use super::facts::PackageFacts;
use super::provider::FactProvider;

/// Memoizing wrapper around a [`FactProvider`].
///
/// Lookups are published once and never change afterwards, so any number
/// of concurrent solves can read through the same cache.
#[derive(Debug)]
pub struct FactsCache<P> {
    inner: P,
    facts: RwLock<HashMap<String, Option<Arc<PackageFacts>>>>,
    providers: RwLock<HashMap<String, Vec<Arc<PackageFacts>>>>,
}

impl<P: FactProvider> FactsCache<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            facts: RwLock::new(HashMap::new()),
            providers: RwLock::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Number of package names looked up so far
    pub fn len(&self) -> usize {
        self.facts.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<P: FactProvider> FactProvider for FactsCache<P> {
    fn facts_for(&self, name: &str) -> Option<Arc<PackageFacts>> {
        if let Ok(facts) = self.facts.read() {
            if let Some(hit) = facts.get(name) {
                return hit.clone();
            }
        }

        trace!("Loading facts for {}", name);
        let loaded = self.inner.facts_for(name);
        match self.facts.write() {
            // Another reader may have published first; keep that entry
            Ok(mut facts) => facts.entry(name.to_string()).or_insert(loaded).clone(),
            Err(_) => loaded,
        }
    }

    fn providers_for(&self, virtual_name: &str) -> Vec<Arc<PackageFacts>> {
        if let Ok(providers) = self.providers.read() {
            if let Some(hit) = providers.get(virtual_name) {
                return hit.clone();
            }
        }

        let loaded = self.inner.providers_for(virtual_name);
        match self.providers.write() {
            Ok(mut providers) => providers
                .entry(virtual_name.to_string())
                .or_insert(loaded)
                .clone(),
            Err(_) => loaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Repository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        repo: Repository,
        lookups: AtomicUsize,
    }

    impl FactProvider for Counting {
        fn facts_for(&self, name: &str) -> Option<Arc<PackageFacts>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.repo.facts_for(name)
        }

        fn providers_for(&self, virtual_name: &str) -> Vec<Arc<PackageFacts>> {
            self.repo.providers_for(virtual_name)
        }
    }

    #[test]
    fn test_lookups_are_memoized() {
        let cache = FactsCache::new(Counting {
            repo: Repository::new().with(PackageFacts::new("zlib")),
            lookups: AtomicUsize::new(0),
        });

        let first = cache.facts_for("zlib").unwrap();
        let second = cache.facts_for("zlib").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.facts_for("missing").is_none());
        assert!(cache.facts_for("missing").is_none());
        assert_eq!(cache.inner().lookups.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_shared_between_threads() {
        let cache = Arc::new(FactsCache::new(
            Repository::new().with(PackageFacts::new("zlib")),
        ));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.facts_for("zlib").is_some())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
