//! In-memory stores for development and testing.
//!
//! Each store keeps its records behind an `RwLock`; every mutation happens
//! under the write guard, which gives the same per-record atomicity the
//! PostgreSQL stores get from conditional updates and row locks.

use async_trait::async_trait;
use chrono::Utc;
use shared::*;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::{CartStore, CatalogStore, OrderStore, StoreError, StoreResult, WishlistStore};

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StoreError::Poisoned)
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StoreError::Poisoned)
}

/// Products in insertion order.
#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    products: Arc<RwLock<Vec<Product>>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn create(&self, input: ProductInput) -> StoreResult<Product> {
        let product = input.into_product(Uuid::new_v4(), Utc::now());
        write(&self.products)?.push(product.clone());
        Ok(product)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(read(&self.products)?.iter().find(|p| p.id == id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Product>> {
        Ok(read(&self.products)?.clone())
    }

    async fn list_by_category(&self, category: &str) -> StoreResult<Vec<Product>> {
        Ok(read(&self.products)?
            .iter()
            .filter(|p| p.category == category)
            .cloned()
            .collect())
    }

    async fn search(&self, query: &str) -> StoreResult<Vec<Product>> {
        let needle = query.to_lowercase();
        Ok(read(&self.products)?
            .iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.description.to_lowercase().contains(&needle)
                    || p.category.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn update(&self, id: Uuid, input: ProductInput) -> StoreResult<Product> {
        let mut products = write(&self.products)?;
        let product = products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::product_not_found(id))?;

        let created_at = product.created_at;
        *product = input.into_product(id, Utc::now());
        product.created_at = created_at;
        Ok(product.clone())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        write(&self.products)?.retain(|p| p.id != id);
        Ok(())
    }

    async fn count(&self) -> StoreResult<i64> {
        Ok(read(&self.products)?.len() as i64)
    }

    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> StoreResult<i32> {
        if quantity <= 0 {
            return Err(QuantityError::NotPositive.into());
        }
        let mut products = write(&self.products)?;
        let product = products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::product_not_found(id))?;

        if product.stock < quantity {
            return Err(StoreError::InsufficientStock {
                product_id: id,
                available: product.stock,
            });
        }

        product.stock -= quantity;
        product.updated_at = Utc::now();
        Ok(product.stock)
    }

    async fn restock(&self, id: Uuid, quantity: i32) -> StoreResult<()> {
        if quantity <= 0 {
            return Err(QuantityError::NotPositive.into());
        }
        let mut products = write(&self.products)?;
        let product = products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::product_not_found(id))?;

        product.stock = product
            .stock
            .checked_add(quantity)
            .ok_or(QuantityError::Overflow)?;
        product.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<HashMap<Uuid, Cart>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<F>(&self, user_id: Uuid, create_missing: bool, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Vec<CartLine>) -> StoreResult<bool>,
    {
        let mut carts = write(&self.carts)?;
        if create_missing {
            carts.entry(user_id).or_insert_with(|| Cart::empty(user_id));
        }

        if let Some(cart) = carts.get_mut(&user_id) {
            if apply(&mut cart.products)? {
                cart.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get(&self, user_id: Uuid) -> StoreResult<Cart> {
        Ok(read(&self.carts)?
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Cart::empty(user_id)))
    }

    async fn add_line(&self, user_id: Uuid, product_id: Uuid, quantity: i32, size: &str) -> StoreResult<()> {
        self.mutate(user_id, true, |lines| {
            Ok(cart_ops::add_line(lines, product_id, quantity, size, Utc::now())?)
        })
    }

    async fn set_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        size: Option<&str>,
        quantity: i32,
    ) -> StoreResult<()> {
        self.mutate(user_id, false, |lines| {
            Ok(cart_ops::set_quantity(lines, product_id, size, quantity))
        })
    }

    async fn remove_line(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<()> {
        self.mutate(user_id, false, |lines| Ok(cart_ops::remove_product(lines, product_id)))
    }

    async fn clear(&self, user_id: Uuid) -> StoreResult<()> {
        self.mutate(user_id, false, |lines| {
            lines.clear();
            Ok(true)
        })
    }

    async fn consume(&self, user_id: Uuid, lines: &[CartLine]) -> StoreResult<()> {
        self.mutate(user_id, false, |current| Ok(cart_ops::consume(current, lines)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryWishlistStore {
    wishlists: Arc<RwLock<HashMap<Uuid, Wishlist>>>,
}

impl InMemoryWishlistStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WishlistStore for InMemoryWishlistStore {
    async fn get(&self, user_id: Uuid) -> StoreResult<Wishlist> {
        Ok(read(&self.wishlists)?
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Wishlist::empty(user_id)))
    }

    async fn add(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<()> {
        let mut wishlists = write(&self.wishlists)?;
        let wishlist = wishlists
            .entry(user_id)
            .or_insert_with(|| Wishlist::empty(user_id));

        if wishlist_ops::add(&mut wishlist.products, product_id, Utc::now()) {
            wishlist.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn remove(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<()> {
        if let Some(wishlist) = write(&self.wishlists)?.get_mut(&user_id) {
            if wishlist_ops::remove(&mut wishlist.products, product_id) {
                wishlist.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn clear(&self, user_id: Uuid) -> StoreResult<()> {
        if let Some(wishlist) = write(&self.wishlists)?.get_mut(&user_id) {
            wishlist.products.clear();
            wishlist.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// Orders in creation order.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<Vec<Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn filtered(&self, keep: impl Fn(&Order) -> bool) -> StoreResult<Vec<Order>> {
        Ok(read(&self.orders)?
            .iter()
            .filter(|o| keep(o))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: NewOrder) -> StoreResult<Order> {
        let order = order.with_id(Uuid::new_v4());
        write(&self.orders)?.push(order.clone());
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(read(&self.orders)?.iter().find(|o| o.id == id).cloned())
    }

    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        self.filtered(|o| o.user_id == user_id)
    }

    async fn list_all(&self) -> StoreResult<Vec<Order>> {
        self.filtered(|_| true)
    }

    async fn list_by_status(&self, status: OrderStatus) -> StoreResult<Vec<Order>> {
        self.filtered(|o| o.status == status)
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Order> {
        let mut orders = write(&self.orders)?;
        let order = orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::order_not_found(id))?;

        order.status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn count(&self) -> StoreResult<i64> {
        Ok(read(&self.orders)?.len() as i64)
    }

    async fn total_revenue(&self) -> StoreResult<f64> {
        Ok(read(&self.orders)?.iter().map(|o| o.total_price).sum())
    }
}
