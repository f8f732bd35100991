use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::*;
use tracing::debug;
use uuid::Uuid;

use super::{CartStore, CatalogStore, OrderStore, StoreError, StoreResult, WishlistStore};
use crate::models::*;
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: DbPool,
}

impl PgCatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn create(&self, input: ProductInput) -> StoreResult<Product> {
        let mut conn = self.pool.get().await?;
        let row = DbProduct::from(input.into_product(Uuid::new_v4(), Utc::now()));

        let created = diesel::insert_into(products::table)
            .values(&row)
            .get_result::<DbProduct>(&mut conn)
            .await?;

        Ok(created.into())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let mut conn = self.pool.get().await?;
        let row = products::table
            .find(id)
            .first::<DbProduct>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(Product::from))
    }

    async fn list(&self) -> StoreResult<Vec<Product>> {
        let mut conn = self.pool.get().await?;
        let rows = products::table
            .order(products::created_at.asc())
            .load::<DbProduct>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn list_by_category(&self, category: &str) -> StoreResult<Vec<Product>> {
        let mut conn = self.pool.get().await?;
        let rows = products::table
            .filter(products::category.eq(category))
            .order(products::created_at.asc())
            .load::<DbProduct>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn search(&self, query: &str) -> StoreResult<Vec<Product>> {
        let mut conn = self.pool.get().await?;
        let pattern = like_pattern(query);
        let rows = products::table
            .filter(
                products::name
                    .ilike(&pattern)
                    .or(products::description.ilike(&pattern))
                    .or(products::category.ilike(&pattern)),
            )
            .order(products::created_at.asc())
            .load::<DbProduct>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn update(&self, id: Uuid, input: ProductInput) -> StoreResult<Product> {
        let mut conn = self.pool.get().await?;
        let changes = ProductChanges::from_input(input, Utc::now());

        diesel::update(products::table.find(id))
            .set(&changes)
            .get_result::<DbProduct>(&mut conn)
            .await
            .optional()?
            .map(Product::from)
            .ok_or_else(|| StoreError::product_not_found(id))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        diesel::delete(products::table.find(id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn count(&self) -> StoreResult<i64> {
        let mut conn = self.pool.get().await?;
        let count = products::table.count().get_result::<i64>(&mut conn).await?;
        Ok(count)
    }

    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> StoreResult<i32> {
        if quantity <= 0 {
            return Err(QuantityError::NotPositive.into());
        }
        let mut conn = self.pool.get().await?;

        let remaining = diesel::update(
            products::table
                .filter(products::id.eq(id))
                .filter(products::stock.ge(quantity)),
        )
        .set((
            products::stock.eq(products::stock - quantity),
            products::updated_at.eq(Utc::now()),
        ))
        .returning(products::stock)
        .get_result::<i32>(&mut conn)
        .await
        .optional()?;

        if let Some(remaining) = remaining {
            return Ok(remaining);
        }

        // The guard rejected the write; find out whether the product is gone
        // or simply short.
        let available = products::table
            .find(id)
            .select(products::stock)
            .first::<i32>(&mut conn)
            .await
            .optional()?;

        match available {
            Some(available) => Err(StoreError::InsufficientStock {
                product_id: id,
                available,
            }),
            None => Err(StoreError::product_not_found(id)),
        }
    }

    async fn restock(&self, id: Uuid, quantity: i32) -> StoreResult<()> {
        if quantity <= 0 {
            return Err(QuantityError::NotPositive.into());
        }
        let mut conn = self.pool.get().await?;
        let updated = diesel::update(
            products::table
                .filter(products::id.eq(id))
                .filter(products::stock.le(i32::MAX - quantity)),
        )
        .set((
            products::stock.eq(products::stock + quantity),
            products::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await?;

        if updated > 0 {
            return Ok(());
        }

        let exists = products::table
            .find(id)
            .select(products::id)
            .first::<Uuid>(&mut conn)
            .await
            .optional()?
            .is_some();
        if exists {
            Err(QuantityError::Overflow.into())
        } else {
            Err(StoreError::product_not_found(id))
        }
    }
}

#[derive(Clone)]
pub struct PgCartStore {
    pool: DbPool,
}

impl PgCartStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Re-reads the cart row under `FOR UPDATE` and applies `apply` to the
    /// fresh line list, so concurrent edits by the same user serialize on the
    /// row. `apply` returns whether it changed anything.
    async fn mutate<F>(&self, user_id: Uuid, create_missing: bool, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Vec<CartLine>) -> StoreResult<bool> + Send + 'static,
    {
        let mut pooled = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                if create_missing {
                    diesel::insert_into(carts::table)
                        .values(&DbCart::empty(user_id))
                        .on_conflict(carts::user_id)
                        .do_nothing()
                        .execute(conn)
                        .await?;
                }

                let row = carts::table
                    .find(user_id)
                    .for_update()
                    .first::<DbCart>(conn)
                    .await
                    .optional()?;

                let Some(row) = row else {
                    return Ok(());
                };

                let mut cart = Cart::try_from(row)?;
                if apply(&mut cart.products)? {
                    diesel::update(carts::table.find(user_id))
                        .set((
                            carts::products.eq(serde_json::to_value(&cart.products)?),
                            carts::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)
                        .await?;
                }

                Ok(())
            })
        })
        .await
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn get(&self, user_id: Uuid) -> StoreResult<Cart> {
        let mut conn = self.pool.get().await?;
        let row = carts::table
            .find(user_id)
            .first::<DbCart>(&mut conn)
            .await
            .optional()?;

        match row {
            Some(row) => Cart::try_from(row),
            None => Ok(Cart::empty(user_id)),
        }
    }

    async fn add_line(&self, user_id: Uuid, product_id: Uuid, quantity: i32, size: &str) -> StoreResult<()> {
        let size = size.to_string();
        self.mutate(user_id, true, move |lines| {
            Ok(cart_ops::add_line(lines, product_id, quantity, &size, Utc::now())?)
        })
        .await?;

        debug!("Added {} x {} to cart of {}", quantity, product_id, user_id);
        Ok(())
    }

    async fn set_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        size: Option<&str>,
        quantity: i32,
    ) -> StoreResult<()> {
        let size = size.map(str::to_string);
        self.mutate(user_id, false, move |lines| {
            Ok(cart_ops::set_quantity(lines, product_id, size.as_deref(), quantity))
        })
        .await
    }

    async fn remove_line(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<()> {
        self.mutate(user_id, false, move |lines| {
            Ok(cart_ops::remove_product(lines, product_id))
        })
        .await
    }

    async fn clear(&self, user_id: Uuid) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(carts::table.find(user_id))
            .set((
                carts::products.eq(serde_json::Value::Array(Vec::new())),
                carts::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn consume(&self, user_id: Uuid, lines: &[CartLine]) -> StoreResult<()> {
        let consumed = lines.to_vec();
        self.mutate(user_id, false, move |current| {
            Ok(cart_ops::consume(current, &consumed))
        })
        .await
    }
}

#[derive(Clone)]
pub struct PgWishlistStore {
    pool: DbPool,
}

impl PgWishlistStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn mutate<F>(&self, user_id: Uuid, create_missing: bool, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Vec<WishlistItem>) -> bool + Send + 'static,
    {
        let mut pooled = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                if create_missing {
                    diesel::insert_into(wishlists::table)
                        .values(&DbWishlist::empty(user_id))
                        .on_conflict(wishlists::user_id)
                        .do_nothing()
                        .execute(conn)
                        .await?;
                }

                let row = wishlists::table
                    .find(user_id)
                    .for_update()
                    .first::<DbWishlist>(conn)
                    .await
                    .optional()?;

                let Some(row) = row else {
                    return Ok(());
                };

                let mut wishlist = Wishlist::try_from(row)?;
                if apply(&mut wishlist.products) {
                    diesel::update(wishlists::table.find(user_id))
                        .set((
                            wishlists::products.eq(serde_json::to_value(&wishlist.products)?),
                            wishlists::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)
                        .await?;
                }

                Ok(())
            })
        })
        .await
    }
}

#[async_trait]
impl WishlistStore for PgWishlistStore {
    async fn get(&self, user_id: Uuid) -> StoreResult<Wishlist> {
        let mut conn = self.pool.get().await?;
        let row = wishlists::table
            .find(user_id)
            .first::<DbWishlist>(&mut conn)
            .await
            .optional()?;

        match row {
            Some(row) => Wishlist::try_from(row),
            None => Ok(Wishlist::empty(user_id)),
        }
    }

    async fn add(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<()> {
        self.mutate(user_id, true, move |items| {
            wishlist_ops::add(items, product_id, Utc::now())
        })
        .await
    }

    async fn remove(&self, user_id: Uuid, product_id: Uuid) -> StoreResult<()> {
        self.mutate(user_id, false, move |items| wishlist_ops::remove(items, product_id))
            .await
    }

    async fn clear(&self, user_id: Uuid) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(wishlists::table.find(user_id))
            .set((
                wishlists::products.eq(serde_json::Value::Array(Vec::new())),
                wishlists::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgOrderStore {
    pool: DbPool,
}

impl PgOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn into_orders(rows: Vec<DbOrder>) -> StoreResult<Vec<Order>> {
    rows.into_iter().map(Order::try_from).collect()
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: NewOrder) -> StoreResult<Order> {
        let mut conn = self.pool.get().await?;
        let row = DbOrder::new(Uuid::new_v4(), &order)?;

        let created = diesel::insert_into(orders::table)
            .values(&row)
            .get_result::<DbOrder>(&mut conn)
            .await?;

        Order::try_from(created)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let mut conn = self.pool.get().await?;
        let row = orders::table
            .find(id)
            .first::<DbOrder>(&mut conn)
            .await
            .optional()?;
        row.map(Order::try_from).transpose()
    }

    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let mut conn = self.pool.get().await?;
        let rows = orders::table
            .filter(orders::user_id.eq(user_id))
            .order(orders::created_at.asc())
            .load::<DbOrder>(&mut conn)
            .await?;
        into_orders(rows)
    }

    async fn list_all(&self) -> StoreResult<Vec<Order>> {
        let mut conn = self.pool.get().await?;
        let rows = orders::table
            .order(orders::created_at.asc())
            .load::<DbOrder>(&mut conn)
            .await?;
        into_orders(rows)
    }

    async fn list_by_status(&self, status: OrderStatus) -> StoreResult<Vec<Order>> {
        let mut conn = self.pool.get().await?;
        let rows = orders::table
            .filter(orders::status.eq(status.as_str()))
            .order(orders::created_at.asc())
            .load::<DbOrder>(&mut conn)
            .await?;
        into_orders(rows)
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Order> {
        let mut conn = self.pool.get().await?;
        let row = diesel::update(orders::table.find(id))
            .set((
                orders::status.eq(status.as_str()),
                orders::updated_at.eq(Utc::now()),
            ))
            .get_result::<DbOrder>(&mut conn)
            .await
            .optional()?;

        match row {
            Some(row) => Order::try_from(row),
            None => Err(StoreError::order_not_found(id)),
        }
    }

    async fn count(&self) -> StoreResult<i64> {
        let mut conn = self.pool.get().await?;
        let count = orders::table.count().get_result::<i64>(&mut conn).await?;
        Ok(count)
    }

    async fn total_revenue(&self) -> StoreResult<f64> {
        let mut conn = self.pool.get().await?;
        let revenue = orders::table
            .select(diesel::dsl::sum(orders::total_price))
            .get_result::<Option<f64>>(&mut conn)
            .await?;
        Ok(revenue.unwrap_or(0.0))
    }
}
