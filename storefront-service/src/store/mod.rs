//! Storage seams for the storefront.
//!
//! Every store is an async trait with a PostgreSQL implementation for the
//! running service and an in-memory one for development and tests. Handlers
//! only ever see `Stores`, which is built once at startup.

mod memory;
mod postgres;

use async_trait::async_trait;
use diesel_async::pooled_connection::PoolError;
use shared::*;
use std::sync::Arc;
use uuid::Uuid;

pub use memory::{InMemoryCartStore, InMemoryCatalogStore, InMemoryOrderStore, InMemoryWishlistStore};
pub use postgres::{DbPool, PgCartStore, PgCatalogStore, PgOrderStore, PgWishlistStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] bb8::RunError<PoolError>),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Quantity(#[from] QuantityError),

    #[error("insufficient stock for product {product_id}: {available} available")]
    InsufficientStock { product_id: Uuid, available: i32 },

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn product_not_found(id: Uuid) -> Self {
        StoreError::NotFound { entity: "Product", id }
    }

    pub fn order_not_found(id: Uuid) -> Self {
        StoreError::NotFound { entity: "Order", id }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create(&self, input: ProductInput) -> StoreResult<Product>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Product>>;
    async fn list(&self) -> StoreResult<Vec<Product>>;
    async fn list_by_category(&self, category: &str) -> StoreResult<Vec<Product>>;
    /// Case-insensitive substring match on name, description and category.
    async fn search(&self, query: &str) -> StoreResult<Vec<Product>>;
    async fn update(&self, id: Uuid, input: ProductInput) -> StoreResult<Product>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn count(&self) -> StoreResult<i64>;

    /// Takes `quantity` units off the product only if that many are in stock,
    /// as one conditional write. Returns the remaining stock. `quantity` must
    /// be positive.
    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> StoreResult<i32>;

    async fn restock(&self, id: Uuid, quantity: i32) -> StoreResult<()>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns an unsaved empty cart when the user has none.
    async fn get(&self, user_id: Uuid) -> StoreResult<Cart>;
    async fn add_line(&self, user_id: Uuid, product_id: Uuid, quantity: i32, size: &str) -> StoreResult<()>;
    async fn set_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        size: Option<&str>,
        quantity: i32,
    ) -> StoreResult<()>;
    async fn remove_line(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<()>;
    async fn clear(&self, user_id: Uuid) -> StoreResult<()>;

    /// Removes lines that were checked out, leaving anything the user added
    /// since the snapshot was read. See `cart_ops::consume`.
    async fn consume(&self, user_id: Uuid, lines: &[CartLine]) -> StoreResult<()>;
}

#[async_trait]
pub trait WishlistStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> StoreResult<Wishlist>;
    async fn add(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<()>;
    async fn remove(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<()>;
    async fn clear(&self, user_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: NewOrder) -> StoreResult<Order>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;
    async fn list_all(&self) -> StoreResult<Vec<Order>>;
    async fn list_by_status(&self, status: OrderStatus) -> StoreResult<Vec<Order>>;
    async fn update_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Order>;
    async fn count(&self) -> StoreResult<i64>;
    async fn total_revenue(&self) -> StoreResult<f64>;
}

#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub carts: Arc<dyn CartStore>,
    pub wishlists: Arc<dyn WishlistStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl Stores {
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            catalog: Arc::new(PgCatalogStore::new(pool.clone())),
            carts: Arc::new(PgCartStore::new(pool.clone())),
            wishlists: Arc::new(PgWishlistStore::new(pool.clone())),
            orders: Arc::new(PgOrderStore::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            catalog: Arc::new(InMemoryCatalogStore::new()),
            carts: Arc::new(InMemoryCartStore::new()),
            wishlists: Arc::new(InMemoryWishlistStore::new()),
            orders: Arc::new(InMemoryOrderStore::new()),
        }
    }
}
