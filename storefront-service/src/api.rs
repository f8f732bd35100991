use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::Json,
    routing::{delete, get, put},
    Router,
};
use serde::Deserialize;
use shared::*;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::checkout::CheckoutEngine;
use crate::error::{ApiResponse, ApiResult, AppError};
use crate::orders::StatusDesk;
use crate::store::Stores;

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub checkout: Arc<CheckoutEngine>,
    pub status_desk: Arc<StatusDesk>,
}

impl AppState {
    pub fn new(stores: Stores, strict_order_status: bool) -> Self {
        Self {
            checkout: Arc::new(CheckoutEngine::new(&stores)),
            status_desk: Arc::new(StatusDesk::new(stores.orders.clone(), strict_order_status)),
            stores,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    #[serde(rename = "productID", default)]
    pub product_id: String,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default)]
    pub size: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    #[serde(rename = "productID", default)]
    pub product_id: String,
    #[serde(default)]
    pub quantity: i32,
    pub size: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WishlistRequest {
    #[serde(rename = "productID", default)]
    pub product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(rename = "shippingAddress", default)]
    pub shipping_address: Address,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: String,
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/cart", get(get_cart).post(add_to_cart).put(update_cart))
        .route("/cart/:product_id", delete(remove_from_cart))
        .route("/orders", get(list_own_orders).post(create_order))
        .route("/orders/:id", get(get_own_order))
        .route(
            "/wishlist",
            get(get_wishlist).post(add_to_wishlist).delete(clear_wishlist),
        )
        .route("/wishlist/:product_id", delete(remove_from_wishlist))
        .route("/admin/statistics", get(statistics))
        .route("/admin/orders", get(list_all_orders))
        .route("/admin/orders/:id", put(update_order_status));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    if raw.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", what)));
    }
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::Validation(format!("Invalid {}", what)))
}

async fn require_product(state: &AppState, product_id: Uuid) -> Result<Product, AppError> {
    state
        .stores
        .catalog
        .get(product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
}

// Catalog

pub async fn list_products(
    State(state): State<AppState>,
    query: Result<Query<ProductQuery>, QueryRejection>,
) -> ApiResult<Vec<Product>> {
    let Query(query) = query?;
    let catalog = &state.stores.catalog;

    let products = match (query.q.as_deref(), query.category.as_deref()) {
        (Some(q), _) if !q.trim().is_empty() => catalog.search(q.trim()).await?,
        (_, Some(category)) if !category.is_empty() => catalog.list_by_category(category).await?,
        _ => catalog.list().await?,
    };

    Ok(ApiResponse::ok("Products fetched successfully", products))
}

pub async fn get_product(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Product> {
    let id = parse_id(&id, "product ID")?;
    let product = require_product(&state, id).await?;
    Ok(ApiResponse::ok("Product fetched successfully", product))
}

pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> ApiResult<Product> {
    let Json(input) = payload?;
    input.validate().map_err(AppError::Validation)?;

    let product = state.stores.catalog.create(input).await?;
    info!("Admin {} created product {}", admin.user_id, product.id);
    Ok(ApiResponse::ok("Product created successfully", product))
}

pub async fn update_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> ApiResult<Product> {
    let id = parse_id(&id, "product ID")?;
    let Json(input) = payload?;
    input.validate().map_err(AppError::Validation)?;

    let product = state.stores.catalog.update(id, input).await?;
    info!("Admin {} updated product {}", admin.user_id, product.id);
    Ok(ApiResponse::ok("Product updated successfully", product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let id = parse_id(&id, "product ID")?;
    state.stores.catalog.delete(id).await?;
    info!("Admin {} deleted product {}", admin.user_id, id);
    Ok(ApiResponse::message("Product deleted successfully"))
}

// Cart

pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<Cart> {
    let cart = state.stores.carts.get(user.user_id).await?;
    Ok(ApiResponse::ok("Cart fetched successfully", cart))
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<AddToCartRequest>, JsonRejection>,
) -> ApiResult<Cart> {
    let Json(request) = payload?;
    if request.product_id.trim().is_empty() || request.quantity <= 0 {
        return Err(AppError::Validation(
            "Product ID and quantity are required".to_string(),
        ));
    }
    let product_id = parse_id(&request.product_id, "product ID")?;
    require_product(&state, product_id).await?;

    let carts = &state.stores.carts;
    carts
        .add_line(user.user_id, product_id, request.quantity, &request.size)
        .await?;
    let cart = carts.get(user.user_id).await?;
    Ok(ApiResponse::ok("Added to cart successfully", cart))
}

pub async fn update_cart(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<UpdateCartRequest>, JsonRejection>,
) -> ApiResult<Cart> {
    let Json(request) = payload?;
    if request.product_id.trim().is_empty() || request.quantity < 0 {
        return Err(AppError::Validation(
            "Product ID and quantity are required".to_string(),
        ));
    }
    let product_id = parse_id(&request.product_id, "product ID")?;

    let carts = &state.stores.carts;
    carts
        .set_quantity(
            user.user_id,
            product_id,
            request.size.as_deref(),
            request.quantity,
        )
        .await?;
    let cart = carts.get(user.user_id).await?;
    Ok(ApiResponse::ok("Cart updated successfully", cart))
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<String>,
) -> ApiResult<Cart> {
    let product_id = parse_id(&product_id, "product ID")?;

    let carts = &state.stores.carts;
    carts.remove_line(user.user_id, product_id).await?;
    let cart = carts.get(user.user_id).await?;
    Ok(ApiResponse::ok("Removed from cart successfully", cart))
}

// Orders

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> ApiResult<Order> {
    let Json(request) = payload?;
    let order = state
        .checkout
        .checkout(user.user_id, request.shipping_address)
        .await?;
    Ok(ApiResponse::ok("Order created successfully", order))
}

pub async fn list_own_orders(State(state): State<AppState>, user: AuthUser) -> ApiResult<Vec<Order>> {
    let orders = state.stores.orders.list_by_user(user.user_id).await?;
    Ok(ApiResponse::ok("Orders fetched successfully", orders))
}

pub async fn get_own_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Order> {
    let id = parse_id(&id, "order ID")?;
    let order = state
        .stores
        .orders
        .get(id)
        .await?
        .filter(|order| order.user_id == user.user_id)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    Ok(ApiResponse::ok("Order fetched successfully", order))
}

// Wishlist

pub async fn get_wishlist(State(state): State<AppState>, user: AuthUser) -> ApiResult<Wishlist> {
    let wishlist = state.stores.wishlists.get(user.user_id).await?;
    Ok(ApiResponse::ok("Wishlist fetched successfully", wishlist))
}

pub async fn add_to_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<WishlistRequest>, JsonRejection>,
) -> ApiResult<Wishlist> {
    let Json(request) = payload?;
    let product_id = parse_id(&request.product_id, "product ID")?;
    require_product(&state, product_id).await?;

    let wishlists = &state.stores.wishlists;
    wishlists.add(user.user_id, product_id).await?;
    let wishlist = wishlists.get(user.user_id).await?;
    Ok(ApiResponse::ok("Added to wishlist successfully", wishlist))
}

pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<String>,
) -> ApiResult<Wishlist> {
    let product_id = parse_id(&product_id, "product ID")?;

    let wishlists = &state.stores.wishlists;
    wishlists.remove(user.user_id, product_id).await?;
    let wishlist = wishlists.get(user.user_id).await?;
    Ok(ApiResponse::ok("Removed from wishlist successfully", wishlist))
}

pub async fn clear_wishlist(State(state): State<AppState>, user: AuthUser) -> ApiResult<Wishlist> {
    let wishlists = &state.stores.wishlists;
    wishlists.clear(user.user_id).await?;
    let wishlist = wishlists.get(user.user_id).await?;
    Ok(ApiResponse::ok("Wishlist cleared successfully", wishlist))
}

// Admin

pub async fn statistics(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Statistics> {
    let stores = &state.stores;
    let (total_orders, total_products, total_revenue) = tokio::try_join!(
        stores.orders.count(),
        stores.catalog.count(),
        stores.orders.total_revenue(),
    )?;

    Ok(ApiResponse::ok(
        "Statistics fetched successfully",
        Statistics {
            total_orders,
            total_products,
            total_revenue,
        },
    ))
}

pub async fn list_all_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    query: Result<Query<OrderStatusQuery>, QueryRejection>,
) -> ApiResult<Vec<Order>> {
    let Query(query) = query?;
    let orders = match query.status.as_deref() {
        Some(raw) => {
            let status = raw
                .parse::<OrderStatus>()
                .map_err(|_| AppError::InvalidStatus("Invalid status".to_string()))?;
            state.stores.orders.list_by_status(status).await?
        }
        None => state.stores.orders.list_all().await?,
    };
    Ok(ApiResponse::ok("Orders fetched successfully", orders))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> ApiResult<Order> {
    let id = parse_id(&id, "order ID")?;
    let Json(request) = payload?;

    let order = state.status_desk.update(id, &request.status).await?;
    info!("Admin {} set order {} to {}", admin.user_id, order.id, order.status);
    Ok(ApiResponse::ok("Order status updated successfully", order))
}

pub async fn health_check() -> &'static str {
    "OK"
}
