use shared::*;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::store::{OrderStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum StatusUpdateError {
    #[error(transparent)]
    Invalid(#[from] InvalidStatus),

    #[error("Cannot move order from {from} to {to}")]
    Transition { from: OrderStatus, to: OrderStatus },

    #[error("Order not found")]
    NotFound,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for StatusUpdateError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => StatusUpdateError::NotFound,
            other => StatusUpdateError::Store(other),
        }
    }
}

/// Admin-side status changes. Permissive by default: any of the five
/// statuses may replace any other. In strict mode the fulfillment lifecycle
/// from `OrderStatus::can_transition_to` is enforced.
pub struct StatusDesk {
    orders: Arc<dyn OrderStore>,
    strict: bool,
}

impl StatusDesk {
    pub fn new(orders: Arc<dyn OrderStore>, strict: bool) -> Self {
        Self { orders, strict }
    }

    pub async fn update(&self, order_id: Uuid, raw_status: &str) -> Result<Order, StatusUpdateError> {
        let next: OrderStatus = raw_status.parse()?;

        if self.strict {
            let current = self
                .orders
                .get(order_id)
                .await?
                .ok_or(StatusUpdateError::NotFound)?;
            if !current.status.can_transition_to(next) {
                return Err(StatusUpdateError::Transition {
                    from: current.status,
                    to: next,
                });
            }
        }

        let order = self.orders.update_status(order_id, next).await?;
        info!("Order {} moved to {}", order.id, order.status);
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryOrderStore;

    async fn seeded() -> (Arc<dyn OrderStore>, Order) {
        let orders: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
        let order = orders
            .create(NewOrder::pending(
                Uuid::new_v4(),
                Vec::new(),
                12.0,
                Address {
                    street: "1 Main St".to_string(),
                    city: "Astana".to_string(),
                    postal_code: String::new(),
                    country: String::new(),
                },
            ))
            .await
            .unwrap();
        (orders, order)
    }

    #[tokio::test]
    async fn unknown_status_is_rejected_and_order_unchanged() {
        let (orders, order) = seeded().await;
        let desk = StatusDesk::new(orders.clone(), false);

        let err = desk.update(order.id, "refunded").await.unwrap_err();
        assert!(matches!(err, StatusUpdateError::Invalid(_)));
        assert_eq!(
            orders.get(order.id).await.unwrap().unwrap().status,
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn permissive_mode_allows_any_jump() {
        let (orders, order) = seeded().await;
        let desk = StatusDesk::new(orders, false);

        let delivered = desk.update(order.id, "delivered").await.unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        let back = desk.update(order.id, "pending").await.unwrap();
        assert_eq!(back.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn strict_mode_follows_the_lifecycle() {
        let (orders, order) = seeded().await;
        let desk = StatusDesk::new(orders.clone(), true);

        assert!(matches!(
            desk.update(order.id, "shipped").await,
            Err(StatusUpdateError::Transition { .. })
        ));
        desk.update(order.id, "processing").await.unwrap();
        desk.update(order.id, "shipped").await.unwrap();
        desk.update(order.id, "delivered").await.unwrap();
        assert!(matches!(
            desk.update(order.id, "cancelled").await,
            Err(StatusUpdateError::Transition { .. })
        ));
        assert_eq!(
            orders.get(order.id).await.unwrap().unwrap().status,
            OrderStatus::Delivered
        );
    }

    #[tokio::test]
    async fn missing_order_is_not_found_in_both_modes() {
        let (orders, _) = seeded().await;
        for strict in [false, true] {
            let desk = StatusDesk::new(orders.clone(), strict);
            assert!(matches!(
                desk.update(Uuid::new_v4(), "shipped").await,
                Err(StatusUpdateError::NotFound)
            ));
        }
    }
}
