//! Process-wide dynamic-slug cache behind an RW-lock, reloaded on a time
//! threshold and consulted for save-new-slug decisions.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::info;

use groundwire_common::DynamicSlug;
use groundwire_store::Db;

/// Reload no more often than this.
const RELOAD_FLOOR: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Inner {
    /// Keyed by lowercased `full_slug`.
    by_full_slug: HashMap<String, DynamicSlug>,
    loaded_at: Option<Instant>,
}

pub struct SlugCache {
    inner: RwLock<Inner>,
}

impl Default for SlugCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SlugCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Reload from the database unless the cache is fresh. No-op within
    /// the 30-second floor.
    pub async fn reload_if_stale(&self, db: &Db) -> Result<()> {
        {
            let inner = self.inner.read().expect("slug cache poisoned");
            if let Some(loaded_at) = inner.loaded_at {
                if loaded_at.elapsed() < RELOAD_FLOOR {
                    return Ok(());
                }
            }
        }

        let slugs = db.all_slugs().await?;
        let mut map = HashMap::with_capacity(slugs.len());
        for slug in slugs {
            map.insert(slug.full_slug.to_lowercase(), slug);
        }

        let mut inner = self.inner.write().expect("slug cache poisoned");
        info!(slugs = map.len(), "dynamic slug cache reloaded");
        inner.by_full_slug = map;
        inner.loaded_at = Some(Instant::now());
        Ok(())
    }

    /// Case-insensitive lookup returning the stored casing.
    pub fn get(&self, full_slug: &str) -> Option<DynamicSlug> {
        self.inner
            .read()
            .expect("slug cache poisoned")
            .by_full_slug
            .get(&full_slug.to_lowercase())
            .cloned()
    }

    pub fn contains(&self, full_slug: &str) -> bool {
        self.get(full_slug).is_some()
    }

    /// Record a slug just persisted so later batches in this process see it
    /// without waiting for a reload.
    pub fn insert(&self, slug: DynamicSlug) {
        let mut inner = self.inner.write().expect("slug cache poisoned");
        inner
            .by_full_slug
            .insert(slug.full_slug.to_lowercase(), slug);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_returns_stored_casing() {
        let cache = SlugCache::new();
        cache.insert(DynamicSlug {
            parent_tag: "Election".to_string(),
            slug_identifier: "az_senate_2024".to_string(),
            full_slug: "Election:az_senate_2024".to_string(),
        });

        let hit = cache.get("ELECTION:AZ_SENATE_2024").unwrap();
        assert_eq!(hit.full_slug, "Election:az_senate_2024");
        assert!(cache.contains("election:az_senate_2024"));
        assert!(!cache.contains("Election:unrelated"));
    }
}
