//! Store implementation

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::error::{StoreError, StoreResult};
use crate::protocol::Product;
use crate::publisher::EventPublisher;
use crate::registry::{Event, InventoryId};
use crate::stats::UsageStats;

/// Quantity used when an add request does not give one
pub const DEFAULT_QUANTITY: i64 = 1;

/// Admin listing row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySummary {
    pub uuid: String,
    pub name: Option<String>,
    pub product_count: usize,
    pub total_quantity: i64,
    pub created_at: DateTime<Utc>,
}

struct InventoryRecord {
    id: i64,
    name: Option<String>,
    created_at: DateTime<Utc>,
    products: BTreeMap<i64, Product>,
}

#[derive(Default)]
struct StoreState {
    inventories: HashMap<String, InventoryRecord>,
    next_inventory_id: i64,
    next_product_id: i64,
}

impl StoreState {
    fn get_or_create(&mut self, uuid: &str) -> &mut InventoryRecord {
        let next_id = &mut self.next_inventory_id;
        self.inventories.entry(uuid.to_string()).or_insert_with(|| {
            *next_id += 1;
            tracing::debug!(inventory = uuid, id = *next_id, "Inventory created");
            InventoryRecord {
                id: *next_id,
                name: None,
                created_at: Utc::now(),
                products: BTreeMap::new(),
            }
        })
    }

    fn allocate_product_id(&mut self) -> i64 {
        self.next_product_id += 1;
        self.next_product_id
    }
}

/// Inventories and their products, keyed by UUID
///
/// Every successful write publishes its event before the write lock is
/// released, so subscribers see changes to one inventory in commit order.
pub struct InventoryStore {
    state: RwLock<StoreState>,
    publisher: Arc<EventPublisher>,
}

impl InventoryStore {
    /// Create an empty store that publishes through `publisher`
    pub fn new(publisher: Arc<EventPublisher>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            publisher,
        }
    }

    /// Products of an inventory, ordered by name
    ///
    /// Creates the inventory if it does not exist yet.
    pub fn list_products(&self, uuid: &str) -> StoreResult<Vec<Product>> {
        let uuid = canonical_uuid(uuid)?;
        let mut state = self.state.write();
        let inventory = state.get_or_create(&uuid);

        let mut products: Vec<Product> = inventory.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    /// Add a product
    ///
    /// A missing or zero `quantity` becomes 1; negative quantities are
    /// rejected.
    pub fn add_product(
        &self,
        uuid: &str,
        name: &str,
        quantity: Option<i64>,
    ) -> StoreResult<Product> {
        let uuid = canonical_uuid(uuid)?;
        let name = required_name(name)?;
        let quantity = match quantity {
            None | Some(0) => DEFAULT_QUANTITY,
            Some(quantity) => valid_quantity(quantity)?,
        };

        let mut state = self.state.write();
        let product_id = state.allocate_product_id();
        let inventory = state.get_or_create(&uuid);

        let product = Product {
            id: product_id,
            name,
            quantity,
            inventory_id: inventory.id,
            created_at: Utc::now(),
        };
        inventory.products.insert(product.id, product.clone());

        self.publish(&uuid, Event::ProductAdded(product.clone()));
        Ok(product)
    }

    /// Set a product's quantity
    pub fn update_quantity(
        &self,
        uuid: &str,
        product_id: i64,
        quantity: i64,
    ) -> StoreResult<Product> {
        let uuid = canonical_uuid(uuid)?;
        let quantity = valid_quantity(quantity)?;

        let mut state = self.state.write();
        let inventory = state.get_or_create(&uuid);
        let product = inventory
            .products
            .get_mut(&product_id)
            .ok_or(StoreError::ProductNotFound(product_id))?;
        product.quantity = quantity;
        let product = product.clone();

        self.publish(&uuid, Event::ProductUpdated(product.clone()));
        Ok(product)
    }

    /// Remove a product from an inventory
    pub fn delete_product(&self, uuid: &str, product_id: i64) -> StoreResult<()> {
        let uuid = canonical_uuid(uuid)?;

        let mut state = self.state.write();
        let inventory = state.get_or_create(&uuid);
        inventory
            .products
            .remove(&product_id)
            .ok_or(StoreError::ProductNotFound(product_id))?;

        self.publish(&uuid, Event::ProductDeleted { product_id });
        Ok(())
    }

    /// Give an inventory a display name; returns the stored (trimmed) name
    pub fn rename_inventory(&self, uuid: &str, name: &str) -> StoreResult<String> {
        let uuid = canonical_uuid(uuid)?;
        let name = required_name(name)?;

        let mut state = self.state.write();
        state.get_or_create(&uuid).name = Some(name.clone());

        self.publish(&uuid, Event::InventoryRenamed { name: name.clone() });
        Ok(name)
    }

    /// Display name of an inventory, if it has one
    pub fn inventory_name(&self, uuid: &str) -> StoreResult<Option<String>> {
        let uuid = canonical_uuid(uuid)?;
        let state = self.state.read();
        Ok(state
            .inventories
            .get(&uuid)
            .and_then(|inventory| inventory.name.clone()))
    }

    /// Delete an inventory with all its products and evict its viewers
    ///
    /// Returns the number of connections evicted.
    pub fn delete_inventory(&self, uuid: &str) -> StoreResult<usize> {
        let uuid = canonical_uuid(uuid)?;

        let mut state = self.state.write();
        let removed = state
            .inventories
            .remove(&uuid)
            .ok_or_else(|| StoreError::InventoryNotFound(uuid.clone()))?;

        tracing::info!(
            inventory = %uuid,
            products = removed.products.len(),
            "Inventory deleted"
        );
        Ok(self.publisher.evict_inventory(&InventoryId::new(uuid)))
    }

    /// Admin listing, oldest inventory first
    pub fn list_inventories(&self) -> Vec<InventorySummary> {
        let state = self.state.read();
        let mut rows: Vec<(i64, InventorySummary)> = state
            .inventories
            .iter()
            .map(|(uuid, inventory)| {
                (
                    inventory.id,
                    InventorySummary {
                        uuid: uuid.clone(),
                        name: inventory.name.clone(),
                        product_count: inventory.products.len(),
                        total_quantity: inventory.products.values().map(|p| p.quantity).sum(),
                        created_at: inventory.created_at,
                    },
                )
            })
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        rows.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Aggregate usage across the store and the live registry
    pub fn usage(&self) -> UsageStats {
        let state = self.state.read();
        let products = state
            .inventories
            .values()
            .map(|inventory| inventory.products.len())
            .sum();
        let total_quantity = state
            .inventories
            .values()
            .flat_map(|inventory| inventory.products.values())
            .map(|product| product.quantity)
            .sum();

        UsageStats {
            inventories: state.inventories.len(),
            products,
            total_quantity,
            live: self.publisher.registry().stats(),
        }
    }

    fn publish(&self, uuid: &str, event: Event) {
        self.publisher.publish(&InventoryId::new(uuid), event);
    }
}

/// Parse and normalize an inventory UUID (lowercase, hyphenated)
///
/// Same key the session uses for subscriptions, so any spelling of a UUID
/// reaches the same viewers.
pub fn canonical_uuid(uuid: &str) -> StoreResult<String> {
    InventoryId::parse_uuid(uuid)
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| StoreError::InvalidInventoryId(uuid.to_string()))
}

fn required_name(name: &str) -> StoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidName);
    }
    Ok(name.to_string())
}

fn valid_quantity(quantity: i64) -> StoreResult<i64> {
    if quantity < 0 {
        return Err(StoreError::InvalidQuantity(quantity));
    }
    Ok(quantity)
}
