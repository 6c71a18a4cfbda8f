//! Process-lifetime caches over the reference tables.
//!
//! Aliases and allergen groups are near-static but consulted on every
//! request, so each lives in its own [`ReferenceCache`]. The cache stores the
//! in-flight load itself while it is pending: every caller that arrives
//! before the load settles awaits that same shared future, so N concurrent
//! first-use callers cost exactly one fetch. A failed load leaves the cache
//! empty and hands callers an empty map; the next `get()` retries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use souschef_core::domain::reference::{AllergenEntry, FoodSafetyRule, IngredientAlias};
use souschef_db::repositories::{ReferenceRepository, RepositoryError};

use crate::normalizer::ingredient_key;

/// Lower-cased alias (and canonical id) to canonical id.
pub type AliasMap = HashMap<String, String>;
/// Allergen category to the canonical ingredients it covers.
pub type AllergenMap = HashMap<String, Vec<AllergenEntry>>;

type Loader<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, RepositoryError>> + Send + Sync>;
type InFlight<T> = Shared<BoxFuture<'static, Option<Arc<T>>>>;

enum Slot<T> {
    Empty,
    Loading { token: u64, load: InFlight<T> },
    Ready(Arc<T>),
}

struct CacheState<T> {
    next_token: u64,
    slot: Slot<T>,
}

pub struct ReferenceCache<T> {
    name: &'static str,
    loader: Loader<T>,
    state: Mutex<CacheState<T>>,
}

impl<T> ReferenceCache<T>
where
    T: Default + Send + Sync + 'static,
{
    pub fn new<F, Fut>(name: &'static str, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RepositoryError>> + Send + 'static,
    {
        Self {
            name,
            loader: Box::new(move || loader().boxed()),
            state: Mutex::new(CacheState { next_token: 0, slot: Slot::Empty }),
        }
    }

    /// Returns the cached value, starting or joining the single in-flight
    /// load when the cache is empty. Never fails: a failed load yields
    /// `T::default()`.
    pub async fn get(&self) -> Arc<T> {
        self.fetch().await.unwrap_or_default()
    }

    /// Like [`get`](Self::get), but a failed load is `None` so callers that
    /// must not mistake missing data for an empty table can tell.
    pub async fn fetch(&self) -> Option<Arc<T>> {
        let (token, load) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match &state.slot {
                Slot::Ready(value) => return Some(Arc::clone(value)),
                Slot::Loading { token, load } => (*token, load.clone()),
                Slot::Empty => {
                    state.next_token += 1;
                    let token = state.next_token;
                    let load = self.start_load();
                    state.slot = Slot::Loading { token, load: load.clone() };
                    (token, load)
                }
            }
        };

        let outcome = load.await;

        {
            let mut state = self.lock();
            // Only the load that is still installed may settle the slot; a
            // clear() or a newer load in the meantime wins.
            if matches!(&state.slot, Slot::Loading { token: current, .. } if *current == token) {
                state.slot = match &outcome {
                    Some(value) => Slot::Ready(Arc::clone(value)),
                    None => Slot::Empty,
                };
            }
        }

        outcome
    }

    pub fn clear(&self) {
        self.lock().slot = Slot::Empty;
        debug!(event_name = "reference.cache.cleared", cache = self.name, "reference cache cleared");
    }

    pub fn is_populated(&self) -> bool {
        matches!(self.lock().slot, Slot::Ready(_))
    }

    fn start_load(&self) -> InFlight<T> {
        let name = self.name;
        (self.loader)()
            .map(move |outcome| match outcome {
                Ok(value) => {
                    debug!(event_name = "reference.cache.loaded", cache = name, "reference cache loaded");
                    Some(Arc::new(value))
                }
                Err(error) => {
                    warn!(
                        event_name = "reference.cache.load_failed",
                        cache = name,
                        error = %error,
                        "reference data load failed; serving empty map"
                    );
                    None
                }
            })
            .boxed()
            .shared()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReferenceStats {
    pub aliases: usize,
    pub allergen_categories: usize,
}

/// The one owner of both reference caches. Built once at bootstrap and
/// handed to the services that need it.
pub struct ReferenceData {
    repository: Arc<dyn ReferenceRepository>,
    aliases: ReferenceCache<AliasMap>,
    allergens: ReferenceCache<AllergenMap>,
}

impl ReferenceData {
    pub fn new(repository: Arc<dyn ReferenceRepository>) -> Self {
        let alias_source = Arc::clone(&repository);
        let aliases = ReferenceCache::new("ingredient_aliases", move || {
            let repository = Arc::clone(&alias_source);
            async move { repository.ingredient_aliases().await.map(build_alias_map) }
        });

        let allergen_source = Arc::clone(&repository);
        let allergens = ReferenceCache::new("allergen_groups", move || {
            let repository = Arc::clone(&allergen_source);
            async move { repository.allergen_groups().await.map(build_allergen_map) }
        });

        Self { repository, aliases, allergens }
    }

    pub async fn aliases(&self) -> Arc<AliasMap> {
        self.aliases.get().await
    }

    /// Aliases for checks that must report missing data: `None` when the
    /// load failed or the table is empty.
    pub async fn try_aliases(&self) -> Option<Arc<AliasMap>> {
        self.aliases.fetch().await.filter(|aliases| !aliases.is_empty())
    }

    pub async fn allergens(&self) -> Arc<AllergenMap> {
        self.allergens.get().await
    }

    /// Safety rules are read per check rather than cached so threshold
    /// edits take effect immediately.
    pub async fn food_safety_rules(&self) -> Result<Vec<FoodSafetyRule>, RepositoryError> {
        self.repository.food_safety_rules().await
    }

    pub async fn warm(&self) -> ReferenceStats {
        let (aliases, allergens) = tokio::join!(self.aliases(), self.allergens());
        ReferenceStats { aliases: aliases.len(), allergen_categories: allergens.len() }
    }

    pub fn is_warm(&self) -> bool {
        self.aliases.is_populated() && self.allergens.is_populated()
    }

    pub fn clear(&self) {
        self.aliases.clear();
        self.allergens.clear();
    }
}

fn build_alias_map(rows: Vec<IngredientAlias>) -> AliasMap {
    let mut map = AliasMap::new();
    for row in rows {
        map.insert(ingredient_key(&row.alias), row.canonical.clone());
        map.entry(ingredient_key(&row.canonical.replace('_', " ")))
            .or_insert_with(|| row.canonical.clone());
        map.entry(ingredient_key(&row.canonical)).or_insert(row.canonical);
    }
    map
}

fn build_allergen_map(rows: Vec<AllergenEntry>) -> AllergenMap {
    let mut map = AllergenMap::new();
    for row in rows {
        map.entry(ingredient_key(&row.category)).or_default().push(row);
    }
    map
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::join_all;
    use souschef_db::repositories::{InMemoryReferenceRepository, RepositoryError};

    use super::{ReferenceCache, ReferenceData};

    fn counting_cache(
        fetches: Arc<AtomicUsize>,
        failures_before_success: usize,
    ) -> ReferenceCache<HashMap<String, String>> {
        ReferenceCache::new("test", move || {
            let fetches = Arc::clone(&fetches);
            async move {
                let attempt = fetches.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if attempt < failures_before_success {
                    return Err(RepositoryError::Unavailable("offline".to_string()));
                }
                Ok(HashMap::from([("carne molida".to_string(), "ground_beef".to_string())]))
            }
        })
    }

    #[tokio::test]
    async fn concurrent_first_use_triggers_one_fetch() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(Arc::clone(&fetches), 0);

        let results = join_all((0..16).map(|_| cache.get())).await;

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|map| map.as_ref() == results[0].as_ref()));
        assert_eq!(results[0].get("carne molida").map(String::as_str), Some("ground_beef"));
        assert!(cache.is_populated());
    }

    #[tokio::test]
    async fn failed_load_serves_empty_map_and_retries_later() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(Arc::clone(&fetches), 1);

        let first = join_all((0..4).map(|_| cache.get())).await;
        assert!(first.iter().all(|map| map.is_empty()));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(!cache.is_populated());

        let second = cache.get().await;
        assert_eq!(second.len(), 1);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_distinguishes_a_failed_load_from_an_empty_one() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(Arc::clone(&fetches), 1);

        assert!(cache.fetch().await.is_none());
        let loaded = cache.fetch().await.expect("retry succeeds");
        assert_eq!(loaded.get("carne molida").map(String::as_str), Some("ground_beef"));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_forces_a_fresh_load() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(Arc::clone(&fetches), 0);

        cache.get().await;
        cache.get().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        cache.clear();
        assert!(!cache.is_populated());
        cache.get().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn alias_and_allergen_caches_load_independently() {
        let repository = Arc::new(InMemoryReferenceRepository::baseline());
        let reference = ReferenceData::new(repository.clone());

        let aliases = reference.aliases().await;
        assert_eq!(aliases.get("carne molida").map(String::as_str), Some("ground_beef"));
        assert_eq!(aliases.get("ground beef").map(String::as_str), Some("ground_beef"));
        assert_eq!(repository.read_counts(), (1, 0, 0));
        assert!(!reference.is_warm());

        let stats = reference.warm().await;
        assert_eq!(repository.read_counts(), (1, 1, 0));
        assert!(stats.allergen_categories >= 4);
        assert!(reference.is_warm());
    }
}
