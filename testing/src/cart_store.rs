//! In-memory cart store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use storefront_core::BoxFuture;
use storefront_core::cart::CartStore;
use storefront_core::error::StoreError;
use storefront_core::{SkuId, UserId};

type Carts = HashMap<UserId, BTreeMap<SkuId, String>>;

/// Cart store backed by a hash map, with failure injection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<Mutex<Carts>>,
    unavailable: Arc<AtomicBool>,
    fail_removals: Arc<AtomicBool>,
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("cart store is down".to_string())
}

impl InMemoryCartStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw (possibly malformed) quantity, bypassing validation.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn put_raw(&self, user_id: UserId, sku_id: SkuId, raw: &str) -> Result<(), StoreError> {
        self.carts
            .lock()
            .map_err(|_| unavailable())?
            .entry(user_id)
            .or_default()
            .insert(sku_id, raw.to_string());
        Ok(())
    }

    /// Snapshot of a user's cart.
    #[must_use]
    pub fn snapshot(&self, user_id: UserId) -> BTreeMap<SkuId, String> {
        self.carts
            .lock()
            .ok()
            .and_then(|carts| carts.get(&user_id).cloned())
            .unwrap_or_default()
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Make only `remove`/`remove_many` fail.
    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    fn with_carts<T>(&self, f: impl FnOnce(&mut Carts) -> T) -> Result<T, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut carts = self.carts.lock().map_err(|_| unavailable())?;
        Ok(f(&mut carts))
    }

    fn check_removals(&self) -> Result<(), StoreError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

impl CartStore for InMemoryCartStore {
    fn set(&self, user_id: UserId, sku_id: SkuId, quantity: u32) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.with_carts(|carts| {
                carts
                    .entry(user_id)
                    .or_default()
                    .insert(sku_id, quantity.to_string());
            })
        })
    }

    fn get(&self, user_id: UserId, sku_id: SkuId) -> BoxFuture<'_, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            self.with_carts(|carts| carts.get(&user_id).and_then(|cart| cart.get(&sku_id).cloned()))
        })
    }

    fn get_all(&self, user_id: UserId) -> BoxFuture<'_, Result<BTreeMap<SkuId, String>, StoreError>> {
        Box::pin(async move { self.with_carts(|carts| carts.get(&user_id).cloned().unwrap_or_default()) })
    }

    fn remove(&self, user_id: UserId, sku_id: SkuId) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.check_removals()?;
            self.with_carts(|carts| {
                if let Some(cart) = carts.get_mut(&user_id) {
                    cart.remove(&sku_id);
                }
            })
        })
    }

    fn remove_many(&self, user_id: UserId, sku_ids: Vec<SkuId>) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.check_removals()?;
            self.with_carts(|carts| {
                if let Some(cart) = carts.get_mut(&user_id) {
                    for sku_id in &sku_ids {
                        cart.remove(sku_id);
                    }
                }
            })
        })
    }

    fn count(&self, user_id: UserId) -> BoxFuture<'_, Result<usize, StoreError>> {
        Box::pin(async move { self.with_carts(|carts| carts.get(&user_id).map_or(0, BTreeMap::len)) })
    }
}
