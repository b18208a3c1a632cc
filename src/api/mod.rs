use crate::state::AppState;
use axum::extract::Request;
use axum::routing::{any, get, post};
use axum::{middleware, Router};
use http::{header, StatusCode};
use std::collections::HashMap;
use tower_http::services::ServeDir;
use url::form_urlencoded;

pub mod authorize;
pub mod echo;
pub mod pages;
pub mod rate_limit;
pub mod token;

/// Combines all routes into a single router. Every route, including the 404
/// fallback, sits behind the rate limiter.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(pages::home))
        .route("/authorize", get(authorize::authorize))
        .route("/response", post(authorize::consent_response))
        .route("/token", post(token::token))
        .route("/echo", any(echo::echo))
        .nest_service("/public", ServeDir::new("public"))
        .fallback(pages::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit,
        ))
}

/// Why a form body could not be read.
pub(crate) enum FormError {
    MissingContentType,
    WrongContentType(String),
    UnreadableBody,
}

impl FormError {
    pub(crate) fn status(&self) -> StatusCode {
        match self {
            FormError::UnreadableBody => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub(crate) fn title(&self) -> &'static str {
        match self {
            FormError::UnreadableBody => "Internal Server Error",
            _ => "Bad Request",
        }
    }

    pub(crate) fn description(&self) -> String {
        match self {
            FormError::MissingContentType => "Expecting content type".to_string(),
            FormError::WrongContentType(found) => format!("Content type not allowed: {found}"),
            FormError::UnreadableBody => {
                "An error occurred while processing your request".to_string()
            }
        }
    }
}

/// Read an `application/x-www-form-urlencoded` body into a parameter map.
/// Both form endpoints require that content type; how a violation is
/// presented (HTML or JSON) is up to the caller.
pub(crate) async fn read_form(request: Request) -> Result<HashMap<String, String>, FormError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.is_empty() {
        return Err(FormError::MissingContentType);
    }
    if !content_type.starts_with("application/x-www-form-urlencoded") {
        return Err(FormError::WrongContentType(content_type));
    }

    let bytes = axum::body::to_bytes(request.into_body(), 64 * 1024)
        .await
        .map_err(|_| FormError::UnreadableBody)?;

    Ok(form_urlencoded::parse(&bytes).into_owned().collect())
}
