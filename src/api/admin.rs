use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::domain::edition::EditionListing;
use crate::domain::order::{OrderCommand, OrderStatus};

// ============================================================================
// Admin Endpoints
// ============================================================================
//
// Bearer token in `Authorization`. Publishing sets price and limit only; the
// sold count moves solely through payment settlement.
//
// ============================================================================

const DEFAULT_PAGE: u32 = 50;
const MAX_PAGE: u32 = 500;

fn authorize(req: &HttpRequest, state: &AppState) -> Result<(), ApiError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    if constant_time_eq(token.trim().as_bytes(), state.admin_token.as_bytes()) {
        Ok(())
    } else {
        tracing::warn!(path = %req.path(), "Admin request with invalid token");
        Err(ApiError::Unauthorized)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn page_size(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
}

#[derive(Debug, Deserialize)]
pub struct SizeOption {
    pub size: String,
    /// Minor currency units
    pub price: u64,
    pub edition_limit: u32,
}

/// PUT /api/admin/artworks/{artwork_id}/editions
pub async fn publish_editions(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Vec<SizeOption>>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &state)?;
    let artwork_id = path.into_inner();
    let options = body.into_inner();
    if options.is_empty() {
        return Err(ApiError::BadRequest("At least one size option is required".to_string()));
    }

    let mut published = Vec::with_capacity(options.len());
    for option in options {
        let listing = EditionListing {
            artwork_id: artwork_id.clone(),
            size: option.size,
            price_minor_units: option.price,
            edition_limit: option.edition_limit,
        };
        let edition = state.store.publish_edition(&listing).await?;
        tracing::info!(
            artwork_id = %edition.artwork_id,
            size = %edition.size,
            price = edition.price_minor_units,
            edition_limit = edition.edition_limit,
            editions_sold = edition.editions_sold,
            "Edition published"
        );
        published.push(edition);
    }

    Ok(HttpResponse::Ok().json(published))
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

/// GET /api/admin/orders?status=&limit=
pub async fn list_orders(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<OrdersQuery>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &state)?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let orders = state.store.list_orders(status, page_size(query.limit)).await?;
    Ok(HttpResponse::Ok().json(orders))
}

/// GET /api/admin/orders/{order_id}
pub async fn get_order(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &state)?;
    let order_id = path.into_inner();
    let order = state
        .store
        .order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", order_id)))?;
    Ok(HttpResponse::Ok().json(order))
}

/// GET /api/admin/orders/{order_id}/history
pub async fn order_history(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &state)?;
    let order_id = path.into_inner();
    let history = state.store.order_history(order_id).await?;
    if history.is_empty() {
        return Err(ApiError::NotFound(format!("Order {} not found", order_id)));
    }
    Ok(HttpResponse::Ok().json(history))
}

/// POST /api/admin/orders/{order_id}/transitions
pub async fn transition_order(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<OrderCommand>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &state)?;
    let order = state
        .orders
        .handle(path.into_inner(), body.into_inner(), Uuid::new_v4())
        .await?;
    Ok(HttpResponse::Ok().json(order))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
}

/// GET /api/admin/review-queue
pub async fn review_queue(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &state)?;
    let entries = state.store.review_queue(page_size(query.limit)).await?;
    Ok(HttpResponse::Ok().json(entries))
}
