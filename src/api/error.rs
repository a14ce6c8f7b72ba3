use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::checkout::CheckoutError;
use crate::domain::order::OrderCommandError;
use crate::payments::PaymentProviderError;
use crate::store::StoreError;

/// Every handler error ends up here and leaves as `{ "error": "..." }`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    OrderCommand(#[from] OrderCommandError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Missing or invalid admin token")]
    Unauthorized,
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::EmptyCart
        | CheckoutError::TooManyLines { .. }
        | CheckoutError::InvalidQuantity { .. }
        | CheckoutError::InvalidCustomer(_) => StatusCode::BAD_REQUEST,
        CheckoutError::NotFound { .. } => StatusCode::NOT_FOUND,
        CheckoutError::SoldOut { .. } | CheckoutError::PriceMismatch { .. } => StatusCode::CONFLICT,
        CheckoutError::Provider(PaymentProviderError::Unavailable(_) | PaymentProviderError::CircuitOpen) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CheckoutError::Provider(_) => StatusCode::BAD_GATEWAY,
        CheckoutError::Store(e) => store_status(e),
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Edition(_) => StatusCode::BAD_REQUEST,
        StoreError::VersionConflict { .. } | StoreError::Constraint(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Checkout(e) => checkout_status(e),
            ApiError::OrderCommand(OrderCommandError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::OrderCommand(OrderCommandError::Rejected(_) | OrderCommandError::Conflict { .. }) => {
                StatusCode::CONFLICT
            }
            ApiError::OrderCommand(OrderCommandError::Store(e)) => store_status(e),
            ApiError::Store(e) => store_status(e),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "Payment provider is temporarily unavailable, please try again".to_string(),
                StatusCode::BAD_GATEWAY => "Payment provider rejected the request".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(json!({ "error": message }))
    }
}
