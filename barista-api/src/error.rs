use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use barista_core::StoreError;
use barista_order::LifecycleError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_failed", msg.clone()),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Anyhow(err) => {
                if let Some(lifecycle) = err.downcast_ref::<LifecycleError>() {
                    let (status, code) = lifecycle_status(lifecycle);
                    return (status, code, lifecycle.to_string());
                }
                if err.downcast_ref::<StoreError>().is_some() {
                    return (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "store_unavailable",
                        "Store temporarily unavailable".to_string(),
                    );
                }
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal Server Error".to_string(),
                )
            }
        }
    }
}

fn lifecycle_status(err: &LifecycleError) -> (StatusCode, &'static str) {
    match err {
        LifecycleError::SuborderNotFound(_) | LifecycleError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        LifecycleError::InvalidTransition { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition"),
        LifecycleError::OrderClosed { .. } => (StatusCode::CONFLICT, "order_closed"),
        LifecycleError::InsufficientStock { .. } => (StatusCode::CONFLICT, "insufficient_stock"),
        LifecycleError::InvalidOrder { .. } => (StatusCode::BAD_REQUEST, "invalid_order"),
        LifecycleError::TransientStore { .. } => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
        LifecycleError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.classify();

        if status.is_server_error() {
            match &self {
                AppError::Anyhow(err) => tracing::error!("{}: {:#}", status, err),
                other => tracing::error!("{}: {:?}", status, other),
            }
        } else {
            tracing::debug!("{}: {}", status, message);
        }

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}
