use async_trait::async_trait;
use rihla_core::{
    ensure, BookingError, Capability, CatalogRepository, InventoryItem, ItemKind, Principal,
    ResourceOwner, StorageError,
};
use rihla_shared::{ItemId, ProviderId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Listings held in process memory, keyed by id.
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    items: RwLock<HashMap<ItemId, InventoryItem>>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = InventoryItem>) -> Self {
        let map = items
            .into_iter()
            .map(|item| (item.id(), item))
            .collect();
        Self {
            items: RwLock::new(map),
        }
    }
}

fn poisoned() -> StorageError {
    StorageError::Persistence("catalog lock poisoned".to_string())
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn get_item(
        &self,
        kind: ItemKind,
        id: ItemId,
    ) -> Result<Option<InventoryItem>, StorageError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.get(&id).filter(|item| item.kind() == kind).cloned())
    }

    async fn get_item_by_id(&self, id: ItemId) -> Result<Option<InventoryItem>, StorageError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.get(&id).cloned())
    }

    async fn upsert_item(&self, item: &InventoryItem) -> Result<bool, StorageError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        if let Some(existing) = items.get(&item.id()) {
            if existing.kind() != item.kind() || existing.provider_id() != item.provider_id() {
                return Ok(false);
            }
        }
        items.insert(item.id(), item.clone());
        Ok(true)
    }

    async fn set_active(
        &self,
        kind: ItemKind,
        id: ItemId,
        active: bool,
    ) -> Result<bool, StorageError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        match items.get_mut(&id).filter(|item| item.kind() == kind) {
            Some(item) => {
                item.listing_mut().active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_active(&self, provider_id: Option<ProviderId>) -> Result<u64, StorageError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        let count = items
            .values()
            .filter(|item| item.listing().active)
            .filter(|item| provider_id.map_or(true, |p| item.provider_id() == p))
            .count();
        Ok(count as u64)
    }
}

/// Read access to listings for booking, and authorization-gated writes.
pub struct InventoryCatalog {
    repo: Arc<dyn CatalogRepository>,
}

impl InventoryCatalog {
    pub fn new(repo: Arc<dyn CatalogRepository>) -> Self {
        Self { repo }
    }

    pub async fn get_item(&self, kind: ItemKind, id: ItemId) -> Result<InventoryItem, BookingError> {
        self.repo
            .get_item(kind, id)
            .await?
            .ok_or_else(|| BookingError::not_found("Inventory item", id))
    }

    /// Create or replace a listing. Providers may only write their own items,
    /// and may not take over an item another provider already owns. An
    /// existing item keeps its kind and its owner.
    pub async fn upsert_item(
        &self,
        principal: &Principal,
        item: InventoryItem,
    ) -> Result<InventoryItem, BookingError> {
        validate_item(&item)?;
        self.ensure_manage(principal, item.provider_id())?;

        if let Some(existing) = self.repo.get_item_by_id(item.id()).await? {
            self.ensure_manage(principal, existing.provider_id())?;
            if existing.kind() != item.kind() {
                return Err(BookingError::Validation(format!(
                    "item {} is already listed as a {}",
                    item.id(),
                    existing.kind()
                )));
            }
            if existing.provider_id() != item.provider_id() {
                return Err(BookingError::Validation(format!(
                    "item {} belongs to provider {}",
                    item.id(),
                    existing.provider_id()
                )));
            }
        }

        // The store re-checks kind and owner in the same write
        if !self.repo.upsert_item(&item).await? {
            return Err(BookingError::Authorization(format!(
                "item {} is owned by another provider or kind",
                item.id()
            )));
        }
        tracing::info!(
            item_id = %item.id(),
            kind = %item.kind(),
            provider_id = %item.provider_id(),
            "Inventory item upserted"
        );
        Ok(item)
    }

    pub async fn set_active(
        &self,
        principal: &Principal,
        kind: ItemKind,
        id: ItemId,
        active: bool,
    ) -> Result<(), BookingError> {
        let item = self.get_item(kind, id).await?;
        self.ensure_manage(principal, item.provider_id())?;

        if !self.repo.set_active(kind, id, active).await? {
            return Err(BookingError::not_found("Inventory item", id));
        }
        tracing::info!(item_id = %id, %kind, active, "Inventory item activation changed");
        Ok(())
    }

    pub async fn count_active(&self, provider_id: Option<ProviderId>) -> Result<u64, BookingError> {
        Ok(self.repo.count_active(provider_id).await?)
    }

    fn ensure_manage(&self, principal: &Principal, provider_id: ProviderId) -> Result<(), BookingError> {
        let owner = ResourceOwner::provider(provider_id);
        ensure(principal, Capability::ManageOwnInventory, Some(&owner))
            .or_else(|_| ensure(principal, Capability::ManageAnyInventory, Some(&owner)))
    }
}

fn validate_item(item: &InventoryItem) -> Result<(), BookingError> {
    let listing = item.listing();
    if listing.name.trim().is_empty() {
        return Err(BookingError::Validation("listing name must not be blank".to_string()));
    }
    if listing.unit_price < 0 {
        return Err(BookingError::Validation(format!(
            "unit price must not be negative, got {}",
            listing.unit_price
        )));
    }
    if let Some(tier) = item.room_tiers().iter().find(|t| t.surcharge < 0) {
        return Err(BookingError::Validation(format!(
            "room tier '{}' has a negative surcharge",
            tier.code
        )));
    }
    Ok(())
}
