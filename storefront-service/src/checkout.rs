use shared::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::store::{CartStore, CatalogStore, OrderStore, StoreError, Stores};

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Shipping address is required")]
    IncompleteAddress,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Insufficient stock for product: {name}")]
    InsufficientStock {
        product_id: Uuid,
        name: String,
        requested: i32,
        available: i32,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Turns a user's cart into a pending order.
///
/// Every line is validated against the catalog before any stock moves. Stock
/// is then taken with the catalog's conditional decrement; if a concurrent
/// checkout drains a product in between, the decrements already made by this
/// checkout are put back and the whole checkout fails. A failed checkout
/// therefore leaves the cart, the order ledger and the stock counters as they
/// were.
pub struct CheckoutEngine {
    catalog: Arc<dyn CatalogStore>,
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
}

impl CheckoutEngine {
    pub fn new(stores: &Stores) -> Self {
        Self {
            catalog: stores.catalog.clone(),
            carts: stores.carts.clone(),
            orders: stores.orders.clone(),
        }
    }

    pub async fn checkout(&self, user_id: Uuid, shipping_address: Address) -> Result<Order, CheckoutError> {
        if !shipping_address.is_complete() {
            return Err(CheckoutError::IncompleteAddress);
        }

        let cart = self.carts.get(user_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let (lines, total_price) = self.price_lines(&cart).await?;

        let mut taken: Vec<(Uuid, i32)> = Vec::with_capacity(lines.len());
        for line in &lines {
            if let Err(e) = self.catalog.decrement_stock(line.product_id, line.quantity).await {
                warn!(
                    "Stock decrement for {} failed during checkout of {}: {}",
                    line.product_id, user_id, e
                );
                self.put_back(&taken).await;
                return Err(match e {
                    StoreError::InsufficientStock { product_id, available } => CheckoutError::InsufficientStock {
                        product_id,
                        name: line.name.clone(),
                        requested: line.quantity,
                        available,
                    },
                    StoreError::NotFound { .. } => CheckoutError::ProductNotFound(line.product_id),
                    other => CheckoutError::Store(other),
                });
            }
            taken.push((line.product_id, line.quantity));
        }

        let order = match self
            .orders
            .create(NewOrder::pending(user_id, lines, total_price, shipping_address))
            .await
        {
            Ok(order) => order,
            Err(e) => {
                error!("Failed to persist order for {}: {}", user_id, e);
                self.put_back(&taken).await;
                return Err(e.into());
            }
        };

        // Only the lines this order was built from leave the cart. The order
        // is already committed, so a failure here does not fail the checkout.
        if let Err(e) = self.carts.consume(user_id, &cart.products).await {
            warn!("Order {} created but cart of {} was not cleared: {}", order.id, user_id, e);
        }

        info!(
            "Order {} created for {} with {} lines, total {:.2}",
            order.id,
            user_id,
            order.products.len(),
            order.total_price
        );
        Ok(order)
    }

    /// Snapshots every cart line in cart order and checks that the catalog
    /// can cover the quantity asked for each product so far.
    async fn price_lines(&self, cart: &Cart) -> Result<(Vec<OrderLine>, f64), CheckoutError> {
        let mut lines = Vec::with_capacity(cart.products.len());
        let mut requested: HashMap<Uuid, i32> = HashMap::new();
        let mut total_price = 0.0;

        for cart_line in &cart.products {
            let product = self
                .catalog
                .get(cart_line.product_id)
                .await?
                .ok_or(CheckoutError::ProductNotFound(cart_line.product_id))?;

            if cart_line.quantity <= 0 {
                return Err(StoreError::from(QuantityError::NotPositive).into());
            }

            let wanted = requested.entry(product.id).or_insert(0);
            match wanted.checked_add(cart_line.quantity) {
                Some(total) if total <= product.stock => *wanted = total,
                total => {
                    return Err(CheckoutError::InsufficientStock {
                        product_id: product.id,
                        name: product.name,
                        requested: total.unwrap_or(i32::MAX),
                        available: product.stock,
                    });
                }
            }

            let line = OrderLine::snapshot(&product, cart_line);
            total_price += line.subtotal();
            lines.push(line);
        }

        Ok((lines, total_price))
    }

    async fn put_back(&self, taken: &[(Uuid, i32)]) {
        for (product_id, quantity) in taken.iter().rev() {
            if let Err(e) = self.catalog.restock(*product_id, *quantity).await {
                error!(
                    "Failed to restore {} units of {} after aborted checkout: {}",
                    quantity, product_id, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::store::{InMemoryCartStore, InMemoryCatalogStore, StoreResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        stores: Stores,
        engine: CheckoutEngine,
        user: Uuid,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_stores(Stores::in_memory())
        }

        fn with_stores(stores: Stores) -> Self {
            let engine = CheckoutEngine::new(&stores);
            Self {
                stores,
                engine,
                user: Uuid::new_v4(),
            }
        }

        async fn product(&self, name: &str, price: f64, stock: i32) -> Product {
            self.stores
                .catalog
                .create(ProductInput {
                    name: name.to_string(),
                    price,
                    stock,
                    size: vec!["M".to_string()],
                    ..Default::default()
                })
                .await
                .unwrap()
        }

        async fn stock(&self, id: Uuid) -> i32 {
            self.stores.catalog.get(id).await.unwrap().unwrap().stock
        }
    }

    fn address() -> Address {
        Address {
            street: "12 Abay Ave".to_string(),
            city: "Almaty".to_string(),
            postal_code: "050000".to_string(),
            country: "KZ".to_string(),
        }
    }

    #[tokio::test]
    async fn checkout_converts_cart_into_pending_order() {
        let fx = Fixture::new();
        let a = fx.product("Product A", 10.0, 5).await;
        fx.stores.carts.add_line(fx.user, a.id, 2, "M").await.unwrap();

        let order = fx.engine.checkout(fx.user, address()).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_price, 20.0);
        assert_eq!(order.products.len(), 1);
        assert_eq!(order.products[0].size, "M");
        assert_eq!(fx.stock(a.id).await, 3);
        assert!(fx.stores.carts.get(fx.user).await.unwrap().is_empty());
        assert_eq!(fx.stores.orders.list_by_user(fx.user).await.unwrap(), vec![order]);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_everything_untouched() {
        let fx = Fixture::new();
        let b = fx.product("Product B", 4.0, 1).await;
        fx.stores.carts.add_line(fx.user, b.id, 3, "M").await.unwrap();
        let cart_before = fx.stores.carts.get(fx.user).await.unwrap();

        let err = fx.engine.checkout(fx.user, address()).await.unwrap_err();

        match err {
            CheckoutError::InsufficientStock { requested, available, .. } => {
                assert_eq!((requested, available), (3, 1));
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }
        assert_eq!(fx.stores.carts.get(fx.user).await.unwrap(), cart_before);
        assert_eq!(fx.stores.orders.count().await.unwrap(), 0);
        assert_eq!(fx.stock(b.id).await, 1);
    }

    #[tokio::test]
    async fn failure_on_a_later_line_does_not_touch_earlier_stock() {
        let fx = Fixture::new();
        let plenty = fx.product("Plenty", 1.0, 10).await;
        let scarce = fx.product("Scarce", 1.0, 1).await;
        fx.stores.carts.add_line(fx.user, plenty.id, 4, "M").await.unwrap();
        fx.stores.carts.add_line(fx.user, scarce.id, 2, "M").await.unwrap();

        assert!(matches!(
            fx.engine.checkout(fx.user, address()).await,
            Err(CheckoutError::InsufficientStock { .. })
        ));
        assert_eq!(fx.stock(plenty.id).await, 10);
        assert_eq!(fx.stock(scarce.id).await, 1);
    }

    #[tokio::test]
    async fn sizes_of_one_product_share_its_stock() {
        let fx = Fixture::new();
        let tee = fx.product("Tee", 5.0, 3).await;
        fx.stores.carts.add_line(fx.user, tee.id, 2, "M").await.unwrap();
        fx.stores.carts.add_line(fx.user, tee.id, 2, "L").await.unwrap();

        assert!(matches!(
            fx.engine.checkout(fx.user, address()).await,
            Err(CheckoutError::InsufficientStock { requested: 4, available: 3, .. })
        ));
        assert_eq!(fx.stock(tee.id).await, 3);
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.engine.checkout(fx.user, address()).await,
            Err(CheckoutError::EmptyCart)
        ));

        // a cart that exists but was cleared counts as empty too
        let a = fx.product("A", 1.0, 1).await;
        fx.stores.carts.add_line(fx.user, a.id, 1, "M").await.unwrap();
        fx.stores.carts.clear(fx.user).await.unwrap();
        assert!(matches!(
            fx.engine.checkout(fx.user, address()).await,
            Err(CheckoutError::EmptyCart)
        ));
    }

    #[tokio::test]
    async fn missing_product_aborts_checkout() {
        let fx = Fixture::new();
        let kept = fx.product("Kept", 1.0, 5).await;
        let gone = fx.product("Gone", 1.0, 5).await;
        fx.stores.carts.add_line(fx.user, kept.id, 1, "M").await.unwrap();
        fx.stores.carts.add_line(fx.user, gone.id, 1, "M").await.unwrap();
        fx.stores.catalog.delete(gone.id).await.unwrap();

        let err = fx.engine.checkout(fx.user, address()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::ProductNotFound(id) if id == gone.id));
        assert_eq!(fx.stock(kept.id).await, 5);
        assert_eq!(fx.stores.carts.get(fx.user).await.unwrap().products.len(), 2);
    }

    #[tokio::test]
    async fn incomplete_address_is_rejected_before_reading_the_cart() {
        let fx = Fixture::new();
        let mut addr = address();
        addr.city = "  ".to_string();

        assert!(matches!(
            fx.engine.checkout(fx.user, addr).await,
            Err(CheckoutError::IncompleteAddress)
        ));
    }

    #[tokio::test]
    async fn order_keeps_price_snapshot_after_catalog_changes() {
        let fx = Fixture::new();
        let a = fx.product("Jacket", 10.0, 5).await;
        let b = fx.product("Cap", 2.5, 5).await;
        fx.stores.carts.add_line(fx.user, a.id, 2, "M").await.unwrap();
        fx.stores.carts.add_line(fx.user, b.id, 3, "M").await.unwrap();

        let order = fx.engine.checkout(fx.user, address()).await.unwrap();
        let sum: f64 = order.products.iter().map(OrderLine::subtotal).sum();
        assert_eq!(order.total_price, sum);
        assert_eq!(order.total_price, 27.5);

        fx.stores
            .catalog
            .update(
                a.id,
                ProductInput {
                    name: "Jacket (new season)".to_string(),
                    price: 99.0,
                    stock: 3,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        fx.stores.catalog.delete(b.id).await.unwrap();

        let stored = fx.stores.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.products[0].name, "Jacket");
        assert_eq!(stored.products[0].price, 10.0);
        assert_eq!(stored.total_price, 27.5);
    }

    #[tokio::test]
    async fn concurrent_checkouts_never_oversell() {
        let stores = Stores::in_memory();
        let last = stores
            .catalog
            .create(ProductInput {
                name: "Last one".to_string(),
                price: 50.0,
                stock: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        let engine = Arc::new(CheckoutEngine::new(&stores));
        let mut users = Vec::new();
        for _ in 0..8 {
            let user = Uuid::new_v4();
            stores.carts.add_line(user, last.id, 1, "M").await.unwrap();
            users.push(user);
        }

        let handles = users.iter().map(|&user| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.checkout(user, address()).await })
        });
        let results = futures::future::join_all(handles).await;

        let succeeded = results
            .into_iter()
            .map(|joined| joined.unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(succeeded, 1);
        assert_eq!(stores.catalog.get(last.id).await.unwrap().unwrap().stock, 0);
        assert_eq!(stores.orders.count().await.unwrap(), 1);
    }

    /// Catalog whose stock for one product is drained by "someone else" right
    /// after checkout has validated it.
    struct RacingCatalog {
        inner: InMemoryCatalogStore,
        drained: Uuid,
    }

    #[async_trait]
    impl CatalogStore for RacingCatalog {
        async fn create(&self, input: ProductInput) -> StoreResult<Product> {
            self.inner.create(input).await
        }
        async fn get(&self, id: Uuid) -> StoreResult<Option<Product>> {
            self.inner.get(id).await
        }
        async fn list(&self) -> StoreResult<Vec<Product>> {
            self.inner.list().await
        }
        async fn list_by_category(&self, category: &str) -> StoreResult<Vec<Product>> {
            self.inner.list_by_category(category).await
        }
        async fn search(&self, query: &str) -> StoreResult<Vec<Product>> {
            self.inner.search(query).await
        }
        async fn update(&self, id: Uuid, input: ProductInput) -> StoreResult<Product> {
            self.inner.update(id, input).await
        }
        async fn delete(&self, id: Uuid) -> StoreResult<()> {
            self.inner.delete(id).await
        }
        async fn count(&self) -> StoreResult<i64> {
            self.inner.count().await
        }
        async fn decrement_stock(&self, id: Uuid, quantity: i32) -> StoreResult<i32> {
            if id == self.drained {
                let stock = self.inner.get(id).await?.map_or(0, |p| p.stock);
                self.inner.decrement_stock(id, stock).await?;
            }
            self.inner.decrement_stock(id, quantity).await
        }
        async fn restock(&self, id: Uuid, quantity: i32) -> StoreResult<()> {
            self.inner.restock(id, quantity).await
        }
    }

    #[tokio::test]
    async fn lost_race_restores_stock_taken_for_earlier_lines() {
        let inner = InMemoryCatalogStore::new();
        let first = inner
            .create(ProductInput {
                name: "First".to_string(),
                price: 3.0,
                stock: 4,
                ..Default::default()
            })
            .await
            .unwrap();
        let second = inner
            .create(ProductInput {
                name: "Second".to_string(),
                price: 7.0,
                stock: 2,
                ..Default::default()
            })
            .await
            .unwrap();

        let mut stores = Stores::in_memory();
        stores.catalog = Arc::new(RacingCatalog {
            inner: inner.clone(),
            drained: second.id,
        });
        let fx = Fixture::with_stores(stores);
        fx.stores.carts.add_line(fx.user, first.id, 3, "M").await.unwrap();
        fx.stores.carts.add_line(fx.user, second.id, 1, "M").await.unwrap();

        let err = fx.engine.checkout(fx.user, address()).await.unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::InsufficientStock { product_id, available: 0, .. } if product_id == second.id
        ));
        assert_eq!(inner.get(first.id).await.unwrap().unwrap().stock, 4);
        assert_eq!(fx.stores.orders.count().await.unwrap(), 0);
        assert_eq!(fx.stores.carts.get(fx.user).await.unwrap().products.len(), 2);
    }

    /// Cart that receives one more line from the same user right after
    /// checkout has read it.
    struct LateAddCart {
        inner: InMemoryCartStore,
        late: Uuid,
        added: AtomicBool,
    }

    #[async_trait]
    impl CartStore for LateAddCart {
        async fn get(&self, user_id: Uuid) -> StoreResult<Cart> {
            let cart = self.inner.get(user_id).await?;
            if !self.added.swap(true, Ordering::SeqCst) {
                self.inner.add_line(user_id, self.late, 1, "S").await?;
            }
            Ok(cart)
        }
        async fn add_line(&self, user_id: Uuid, product_id: Uuid, quantity: i32, size: &str) -> StoreResult<()> {
            self.inner.add_line(user_id, product_id, quantity, size).await
        }
        async fn set_quantity(
            &self,
            user_id: Uuid,
            product_id: Uuid,
            size: Option<&str>,
            quantity: i32,
        ) -> StoreResult<()> {
            self.inner.set_quantity(user_id, product_id, size, quantity).await
        }
        async fn remove_line(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<()> {
            self.inner.remove_line(user_id, product_id).await
        }
        async fn clear(&self, user_id: Uuid) -> StoreResult<()> {
            self.inner.clear(user_id).await
        }
        async fn consume(&self, user_id: Uuid, lines: &[CartLine]) -> StoreResult<()> {
            self.inner.consume(user_id, lines).await
        }
    }

    #[tokio::test]
    async fn line_added_during_checkout_stays_in_the_cart() {
        let inner = InMemoryCartStore::new();
        let late = Uuid::new_v4();
        let mut stores = Stores::in_memory();
        stores.carts = Arc::new(LateAddCart {
            inner: inner.clone(),
            late,
            added: AtomicBool::new(false),
        });
        let fx = Fixture::with_stores(stores);
        let coat = fx.product("Coat", 80.0, 2).await;
        inner.add_line(fx.user, coat.id, 1, "M").await.unwrap();

        let order = fx.engine.checkout(fx.user, address()).await.unwrap();

        assert_eq!(order.products.len(), 1);
        let left = inner.get(fx.user).await.unwrap().products;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].product_id, late);
    }

    #[tokio::test]
    async fn overflowing_demand_across_sizes_is_insufficient_stock() {
        let fx = Fixture::new();
        let sock = fx.product("Sock", 1.0, i32::MAX).await;
        fx.stores.carts.add_line(fx.user, sock.id, i32::MAX, "M").await.unwrap();
        fx.stores.carts.add_line(fx.user, sock.id, 1, "L").await.unwrap();

        let err = fx.engine.checkout(fx.user, address()).await.unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::InsufficientStock { requested: i32::MAX, available: i32::MAX, .. }
        ));
        assert_eq!(fx.stock(sock.id).await, i32::MAX);
        assert_eq!(fx.stores.orders.count().await.unwrap(), 0);
    }
}
