use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub size: Vec<String>,
    pub category: String,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin payload for creating or replacing a product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub size: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "imageURL", default)]
    pub image_url: String,
    #[serde(default)]
    pub stock: i32,
}

impl ProductInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() || !(self.price > 0.0) {
            return Err("Product name and price are required and price must be positive".to_string());
        }
        if self.stock < 0 {
            return Err("Stock cannot be negative".to_string());
        }
        Ok(())
    }

    pub fn into_product(self, id: Uuid, now: DateTime<Utc>) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            size: self.size,
            category: self.category,
            image_url: self.image_url,
            stock: self.stock,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(rename = "productID")]
    pub product_id: Uuid,
    pub quantity: i32,
    pub size: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(rename = "userID")]
    pub user_id: Uuid,
    pub products: Vec<CartLine>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            products: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("Quantity must be positive")]
    NotPositive,

    #[error("Quantity is too large")]
    Overflow,
}

/// Cart mutations shared by every cart backend. Each one works on the line
/// list of a freshly loaded cart and returns whether anything changed.
pub mod cart_ops {
    use super::*;

    /// Merges into the (product, size) line if there is one. A merge that
    /// would overflow leaves the line untouched.
    pub fn add_line(
        lines: &mut Vec<CartLine>,
        product_id: Uuid,
        quantity: i32,
        size: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, QuantityError> {
        if quantity <= 0 {
            return Err(QuantityError::NotPositive);
        }

        match lines
            .iter_mut()
            .find(|line| line.product_id == product_id && line.size == size)
        {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(quantity)
                    .ok_or(QuantityError::Overflow)?;
            }
            None => lines.push(CartLine {
                product_id,
                quantity,
                size: size.to_string(),
                added_at: now,
            }),
        }
        Ok(true)
    }

    /// A zero quantity removes every line of the product. Without a size the
    /// first line of the product in cart order is the one overwritten.
    pub fn set_quantity(
        lines: &mut Vec<CartLine>,
        product_id: Uuid,
        size: Option<&str>,
        quantity: i32,
    ) -> bool {
        if quantity == 0 {
            return remove_product(lines, product_id);
        }

        let target = lines.iter_mut().find(|line| {
            line.product_id == product_id && size.map_or(true, |s| line.size == s)
        });

        match target {
            Some(line) => {
                line.quantity = quantity;
                true
            }
            None => false,
        }
    }

    pub fn remove_product(lines: &mut Vec<CartLine>, product_id: Uuid) -> bool {
        let before = lines.len();
        lines.retain(|line| line.product_id != product_id);
        lines.len() != before
    }

    /// Takes the checked-out lines back out of the cart. Each consumed line
    /// lowers the matching (product, size) line by its quantity and drops it
    /// once nothing is left, so anything added after the snapshot was taken
    /// stays in the cart.
    pub fn consume(lines: &mut Vec<CartLine>, consumed: &[CartLine]) -> bool {
        let mut changed = false;
        for taken in consumed {
            let Some(index) = lines
                .iter()
                .position(|line| line.product_id == taken.product_id && line.size == taken.size)
            else {
                continue;
            };

            let remaining = lines[index].quantity.saturating_sub(taken.quantity);
            if remaining > 0 {
                lines[index].quantity = remaining;
            } else {
                lines.remove(index);
            }
            changed = true;
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    #[serde(rename = "productID")]
    pub product_id: Uuid,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wishlist {
    #[serde(rename = "userID")]
    pub user_id: Uuid,
    pub products: Vec<WishlistItem>,
    pub updated_at: DateTime<Utc>,
}

impl Wishlist {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            products: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

pub mod wishlist_ops {
    use super::*;

    pub fn add(items: &mut Vec<WishlistItem>, product_id: Uuid, now: DateTime<Utc>) -> bool {
        if items.iter().any(|item| item.product_id == product_id) {
            return false;
        }
        items.push(WishlistItem {
            product_id,
            added_at: now,
        });
        true
    }

    pub fn remove(items: &mut Vec<WishlistItem>, product_id: Uuid) -> bool {
        let before = items.len();
        items.retain(|item| item.product_id != product_id);
        items.len() != before
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
}

impl Address {
    pub fn is_complete(&self) -> bool {
        !self.street.trim().is_empty() && !self.city.trim().is_empty()
    }
}

/// Price and name are copied from the product at checkout time so the order
/// does not follow later catalog edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(rename = "productID")]
    pub product_id: Uuid,
    pub name: String,
    pub price: f64,
    pub quantity: i32,
    pub size: String,
}

impl OrderLine {
    pub fn snapshot(product: &Product, line: &CartLine) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            price: product.price,
            quantity: line.quantity,
            size: line.size.clone(),
        }
    }

    pub fn subtotal(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid status: {0}")]
pub struct InvalidStatus(pub String);

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Fulfillment lifecycle. Staying in the same status is always allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            OrderStatus::Pending => {
                matches!(next, OrderStatus::Processing | OrderStatus::Cancelled)
            }
            OrderStatus::Processing => {
                matches!(next, OrderStatus::Shipped | OrderStatus::Cancelled)
            }
            OrderStatus::Shipped => next == OrderStatus::Delivered,
            OrderStatus::Delivered | OrderStatus::Cancelled => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvalidStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    #[serde(rename = "userID")]
    pub user_id: Uuid,
    pub products: Vec<OrderLine>,
    pub total_price: f64,
    pub status: OrderStatus,
    pub shipping_address: Address,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order that has not been assigned an identity yet.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub products: Vec<OrderLine>,
    pub total_price: f64,
    pub status: OrderStatus,
    pub shipping_address: Address,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn pending(user_id: Uuid, products: Vec<OrderLine>, total_price: f64, shipping_address: Address) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            products,
            total_price,
            status: OrderStatus::Pending,
            shipping_address,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(self, id: Uuid) -> Order {
        Order {
            id,
            user_id: self.user_id,
            products: self.products,
            total_price: self.total_price,
            status: self.status,
            shipping_address: self.shipping_address,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_orders: i64,
    pub total_products: i64,
    pub total_revenue: f64,
}
