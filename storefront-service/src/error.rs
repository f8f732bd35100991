use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error};

use crate::checkout::CheckoutError;
use crate::orders::StatusUpdateError;
use crate::store::StoreError;

/// Envelope every endpoint answers with.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: None,
        })
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InsufficientStock(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("{0}")]
    InvalidStatus(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InsufficientStock(_)
            | AppError::EmptyCart
            | AppError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Store failures are logged in full but never shown to clients.
        let message = match &self {
            AppError::Internal(detail) => {
                error!("Request failed: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ApiResponse::<()> {
            success: false,
            message,
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, .. } => AppError::NotFound(format!("{} not found", entity)),
            StoreError::Quantity(quantity) => AppError::Validation(quantity.to_string()),
            StoreError::InsufficientStock { .. } => AppError::InsufficientStock(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::IncompleteAddress => AppError::Validation(e.to_string()),
            CheckoutError::EmptyCart => AppError::EmptyCart,
            CheckoutError::ProductNotFound(_) => AppError::NotFound("Product not found".to_string()),
            CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
                ..
            } => {
                debug!(
                    "Checkout short on {}: requested {}, available {}",
                    product_id, requested, available
                );
                AppError::InsufficientStock(e.to_string())
            }
            CheckoutError::Store(store) => store.into(),
        }
    }
}

impl From<StatusUpdateError> for AppError {
    fn from(e: StatusUpdateError) -> Self {
        match e {
            StatusUpdateError::Invalid(_) => AppError::InvalidStatus("Invalid status".to_string()),
            StatusUpdateError::Transition { .. } => AppError::InvalidStatus(e.to_string()),
            StatusUpdateError::NotFound => AppError::NotFound("Order not found".to_string()),
            StatusUpdateError::Store(store) => store.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(_: JsonRejection) -> Self {
        AppError::Validation("Invalid request body".to_string())
    }
}

impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        AppError::Validation("Invalid path".to_string())
    }
}

impl From<QueryRejection> for AppError {
    fn from(_: QueryRejection) -> Self {
        AppError::Validation("Invalid query".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn checkout_errors_map_to_their_status_codes() {
        let cases = [
            (CheckoutError::IncompleteAddress, StatusCode::BAD_REQUEST),
            (CheckoutError::EmptyCart, StatusCode::BAD_REQUEST),
            (CheckoutError::ProductNotFound(Uuid::new_v4()), StatusCode::NOT_FOUND),
            (
                CheckoutError::InsufficientStock {
                    product_id: Uuid::new_v4(),
                    name: "Tee".to_string(),
                    requested: 2,
                    available: 1,
                },
                StatusCode::BAD_REQUEST,
            ),
            (CheckoutError::Store(StoreError::Poisoned), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status(), expected);
        }
    }

    #[test]
    fn store_errors_use_entity_wording() {
        let missing = AppError::from(StoreError::product_not_found(Uuid::new_v4()));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.to_string(), "Product not found");

        let missing = AppError::from(StoreError::order_not_found(Uuid::new_v4()));
        assert_eq!(missing.to_string(), "Order not found");

        let overflow = AppError::from(StoreError::from(shared::QuantityError::Overflow));
        assert_eq!(overflow.status(), StatusCode::BAD_REQUEST);
        assert_eq!(overflow.to_string(), "Quantity is too large");
    }

    #[test]
    fn insufficient_stock_message_names_the_product() {
        let err = AppError::from(CheckoutError::InsufficientStock {
            product_id: Uuid::new_v4(),
            name: "Wool coat".to_string(),
            requested: 3,
            available: 1,
        });
        assert_eq!(err.to_string(), "Insufficient stock for product: Wool coat");
    }
}
