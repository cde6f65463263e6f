//! Store error types

use thiserror::Error;

/// Error type for inventory store operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Inventory id is not a UUID
    #[error("Invalid inventory id: {0}")]
    InvalidInventoryId(String),

    /// Name is empty after trimming
    #[error("Name is required")]
    InvalidName,

    /// Quantity is negative
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// Product does not exist in this inventory
    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    /// Inventory does not exist
    #[error("Inventory not found: {0}")]
    InventoryNotFound(String),
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
