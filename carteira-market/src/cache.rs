use crate::{store::QuoteStore, MarketError};
use carteira_instrument::AssetId;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Process-scoped TTL cache over latest effective prices.
///
/// Strictly an optimisation: a miss, an expired entry, or a cleared cache must produce the same
/// results through the quote store. Writes to the quote store invalidate the touched asset.
#[derive(Debug)]
pub struct PriceCache {
    ttl: Duration,
    entries: Mutex<HashMap<AssetId, CachedPrice>>,
}

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    price: Decimal,
    inserted: Instant,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The cached price for `asset_id`, if present and fresh. Expired entries are evicted.
    pub fn get(&self, asset_id: AssetId) -> Option<Decimal> {
        let mut entries = self.entries.lock();
        match entries.get(&asset_id) {
            Some(cached) if cached.inserted.elapsed() < self.ttl => Some(cached.price),
            Some(_) => {
                entries.remove(&asset_id);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, asset_id: AssetId, price: Decimal) {
        self.entries.lock().insert(
            asset_id,
            CachedPrice {
                price,
                inserted: Instant::now(),
            },
        );
    }

    /// Drop the entry for `asset_id`, eg/ after a quote upsert.
    pub fn invalidate(&self, asset_id: AssetId) {
        self.entries.lock().remove(&asset_id);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Latest effective prices through the cache: fresh entries are served directly, misses go
/// to the store and are written through.
pub async fn latest_prices_cached<S>(
    store: &S,
    cache: &PriceCache,
    asset_ids: &[AssetId],
) -> Result<HashMap<AssetId, Decimal>, MarketError>
where
    S: QuoteStore,
{
    let mut prices = HashMap::with_capacity(asset_ids.len());
    let mut misses = Vec::new();

    for asset_id in asset_ids {
        match cache.get(*asset_id) {
            Some(price) => {
                prices.insert(*asset_id, price);
            }
            None => misses.push(*asset_id),
        }
    }

    if !misses.is_empty() {
        for (asset_id, price) in store.latest_prices(&misses).await? {
            cache.insert(asset_id, price);
            prices.insert(asset_id, price);
        }
    }

    Ok(prices)
}
