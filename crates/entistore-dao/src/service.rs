use std::sync::Arc;

use entistore_store::{CacheBypass, CacheStats, CachingDatastore, Datastore, InMemoryDatastore};
use tracing::{debug, info};

use crate::config::DaoConfig;
use crate::dao::GenericDao;
use crate::entity::Entity;
use crate::policy::DaoPolicy;

/// Hands out [`GenericDao`] instances over one datastore.
///
/// The service owns the store and a single [`CachingDatastore`] in front of
/// it. DAOs created with caching enabled share that cache, so a record cached
/// by one DAO is visible to every other cached DAO of the same service.
/// Uncached DAOs read the store directly but still write through the cache,
/// so cached copies never outlive a write made by any DAO of the service.
pub struct DaoService {
    store: Arc<dyn Datastore>,
    cache: Arc<CachingDatastore>,
    config: DaoConfig,
}

impl DaoService {
    pub fn new(store: Arc<dyn Datastore>, config: DaoConfig) -> Self {
        let cache = Arc::new(CachingDatastore::new(
            Arc::clone(&store),
            config.cache_capacity,
        ));
        info!(
            chunk_size = config.chunk_size,
            cache_capacity = config.cache_capacity,
            "DAO service initialized"
        );
        Self {
            store,
            cache,
            config,
        }
    }

    /// A service over a fresh [`InMemoryDatastore`] with default settings.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryDatastore::new()), DaoConfig::default())
    }

    /// A DAO for `T` with eventually consistent reads, going through the
    /// shared cache when `cache_needed` is set.
    pub fn dao<T: Entity>(&self, cache_needed: bool) -> GenericDao<T> {
        self.dao_with(DaoPolicy::cached(cache_needed))
    }

    /// A DAO for `T` with an explicit policy.
    pub fn dao_with<T: Entity>(&self, policy: DaoPolicy) -> GenericDao<T> {
        let session: Arc<dyn Datastore> = if policy.cache.is_enabled() {
            Arc::clone(&self.cache) as Arc<dyn Datastore>
        } else {
            Arc::new(CacheBypass::new(Arc::clone(&self.cache)))
        };
        debug!(kind = T::KIND, %policy, "DAO created");
        GenericDao::new(
            Arc::clone(&self.store),
            session,
            policy,
            self.config.chunk_size,
        )
    }

    /// The uncached store. Writes made here bypass the shared cache.
    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    pub fn config(&self) -> &DaoConfig {
        &self.config
    }

    /// Counters of the shared cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl std::fmt::Debug for DaoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaoService")
            .field("config", &self.config)
            .field("cache", &self.cache.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::CachePolicy;
    use crate::testing::{ImageData, Product};
    use entistore_store::Consistency;

    #[test]
    fn dao_policy_follows_cache_flag() {
        let service = DaoService::in_memory();
        let cached: GenericDao<Product> = service.dao(true);
        let plain: GenericDao<Product> = service.dao(false);
        assert_eq!(cached.policy().cache, CachePolicy::Enabled);
        assert_eq!(plain.policy().cache, CachePolicy::Disabled);
        assert_eq!(plain.policy().consistency, Consistency::Eventual);
    }

    #[test]
    fn cached_daos_share_one_cache() {
        let service = DaoService::in_memory();
        let writer: GenericDao<Product> = service.dao(true);
        let reader: GenericDao<Product> = service.dao(true);

        let mut product = Product::new("kimono", "CLOTHES", 12000);
        let key = writer.put(&mut product).unwrap();
        assert_eq!(reader.find_key(&key).unwrap(), product);

        let stats = service.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn uncached_daos_read_past_the_cache() {
        let service = DaoService::in_memory();
        let dao: GenericDao<Product> = service.dao(false);
        let mut product = Product::new("obi", "CLOTHES", 4000);
        let key = dao.put(&mut product).unwrap();
        dao.find_key(&key).unwrap();
        let stats = service.cache_stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn uncached_writes_reach_cached_readers() {
        let service = DaoService::in_memory();
        let eventual: GenericDao<Product> = service.dao(true);
        let strong: GenericDao<Product> = service.dao_with(
            DaoPolicy::cached(true).with_consistency(Consistency::Strong),
        );
        let plain: GenericDao<Product> = service.dao(false);

        let mut product = Product::new("kimono", "CLOTHES", 12000);
        let key = strong.put(&mut product).unwrap();
        assert_eq!(eventual.find_key(&key).unwrap().price, 12000);

        product.price = 9000;
        plain.put(&mut product).unwrap();
        assert_eq!(strong.find_key(&key).unwrap().price, 9000);
        assert_eq!(eventual.find_key(&key).unwrap().price, 9000);

        plain.delete(&product).unwrap();
        assert!(strong.find_key(&key).unwrap_err().is_not_found());
        assert!(eventual.find_key(&key).unwrap_err().is_not_found());
    }

    #[test]
    fn strong_cached_dao_sees_writes_made_behind_the_service() {
        let service = DaoService::in_memory();
        let strong: GenericDao<Product> = service.dao_with(
            DaoPolicy::cached(true).with_consistency(Consistency::Strong),
        );
        let mut product = Product::new("obi", "CLOTHES", 4000);
        let key = strong.put(&mut product).unwrap();

        service.store().delete(&key).unwrap();
        assert!(strong.find_key(&key).unwrap_err().is_not_found());
    }

    #[test]
    fn configured_chunk_size_reaches_daos() {
        let service = DaoService::new(
            Arc::new(InMemoryDatastore::new()),
            DaoConfig::default().with_chunk_size(1000),
        );
        let images: GenericDao<ImageData> = service.dao(false);
        let mut image = ImageData::new("image/png");
        images.store_binary(&mut image, &[0u8; 5000]).unwrap();
        assert_eq!(image.chunk_keys.len(), 5);
        assert_eq!(images.load_binary(&image).unwrap().len(), 5000);
    }

    #[test]
    fn daos_of_different_kinds_share_the_store() {
        let service = DaoService::in_memory();
        let products: GenericDao<Product> = service.dao(false);
        let images: GenericDao<ImageData> = service.dao_with(
            DaoPolicy::cached(false).with_consistency(Consistency::Strong),
        );

        let mut product = Product::new("geta", "SHOES", 5000);
        let owner = products.put(&mut product).unwrap();
        let mut image = ImageData::new("image/jpeg");
        image.set_parent(Some(owner.clone()));
        images.put(&mut image).unwrap();

        assert_eq!(images.get_children(&owner).unwrap().len(), 1);
        assert_eq!(products.list().unwrap().len(), 1);
    }
}
