use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::*;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::products)]
pub struct DbProduct {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub size: Vec<String>,
    pub category: String,
    pub image_url: String,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::products)]
pub struct ProductChanges {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub size: Vec<String>,
    pub category: String,
    pub image_url: String,
    pub stock: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::carts)]
pub struct DbCart {
    pub user_id: Uuid,
    pub products: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::wishlists)]
pub struct DbWishlist {
    pub user_id: Uuid,
    pub products: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct DbOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub products: serde_json::Value,
    pub total_price: f64,
    pub status: String,
    pub shipping_address: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for DbProduct {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            price: product.price,
            size: product.size,
            category: product.category,
            image_url: product.image_url,
            stock: product.stock,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

impl From<DbProduct> for Product {
    fn from(row: DbProduct) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            size: row.size,
            category: row.category,
            image_url: row.image_url,
            stock: row.stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl ProductChanges {
    pub fn from_input(input: ProductInput, now: DateTime<Utc>) -> Self {
        Self {
            name: input.name,
            description: input.description,
            price: input.price,
            size: input.size,
            category: input.category,
            image_url: input.image_url,
            stock: input.stock,
            updated_at: now,
        }
    }
}

impl DbCart {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            products: serde_json::Value::Array(Vec::new()),
            updated_at: Utc::now(),
        }
    }
}

impl TryFrom<DbCart> for Cart {
    type Error = StoreError;

    fn try_from(row: DbCart) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.user_id,
            products: serde_json::from_value(row.products)?,
            updated_at: row.updated_at,
        })
    }
}

impl DbWishlist {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            products: serde_json::Value::Array(Vec::new()),
            updated_at: Utc::now(),
        }
    }
}

impl TryFrom<DbWishlist> for Wishlist {
    type Error = StoreError;

    fn try_from(row: DbWishlist) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.user_id,
            products: serde_json::from_value(row.products)?,
            updated_at: row.updated_at,
        })
    }
}

impl DbOrder {
    pub fn new(id: Uuid, order: &NewOrder) -> Result<Self, StoreError> {
        Ok(Self {
            id,
            user_id: order.user_id,
            products: serde_json::to_value(&order.products)?,
            total_price: order.total_price,
            status: order.status.to_string(),
            shipping_address: serde_json::to_value(&order.shipping_address)?,
            created_at: order.created_at,
            updated_at: order.updated_at,
        })
    }
}

impl TryFrom<DbOrder> for Order {
    type Error = StoreError;

    fn try_from(row: DbOrder) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Corrupt(format!("order {}: {}", row.id, e)))?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            products: serde_json::from_value(row.products)?,
            total_price: row.total_price,
            status,
            shipping_address: serde_json::from_value(row.shipping_address)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
