use super::read_form;
use crate::errors::OAuthError;
use crate::kv::KvBackend;
use crate::state::AppState;
use crate::store::{StoreError, AUTH_CODE_FLOW_ID, FLOW_ID_LEN, ROPC_FLOW_ID, TOKEN_LEN};
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use http::{header, StatusCode};
use log::error;
use serde::Serialize;
use std::collections::HashMap;

/// Seconds a refresh lock is held at most; normal rotations release it
/// explicitly well before that.
const REFRESH_LOCK_TTL_SECS: u64 = 5;

/// POST /token: the token endpoint for all four flows plus refresh exchange.
/// Accepts only `application/x-www-form-urlencoded` bodies. Client
/// credentials may arrive in the form or, when both form fields are absent,
/// through HTTP Basic Auth.
/// Refer RFC 6749 Section 4.1.3 (https://tools.ietf.org/html/rfc6749#section-4.1.3)
pub async fn token(State(state): State<AppState>, request: Request) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let mut params = match read_form(request).await {
        Ok(params) => params,
        Err(err) => {
            return OAuthError::new(err.status(), err.title(), err.description()).into_response()
        }
    };

    if param(&params, "client_id").is_empty() && param(&params, "client_secret").is_empty() {
        if let Some(header) = auth_header {
            let (client_id, client_secret) = parse_basic_auth_header(&header);
            params.insert("client_id".to_string(), client_id);
            params.insert("client_secret".to_string(), client_secret);
        }
    }

    match param(&params, "grant_type") {
        "authorization_code" => auth_code_token(&state, &params).await,
        "password" => ropc_token(&state, &params).await,
        "client_credentials" => client_creds_token(&state, &params).await,
        "refresh_token" => refresh_token(&state, &params).await,
        _ => OAuthError::invalid_request("grant_type absent or invalid").into_response(),
    }
}

async fn auth_code_token(state: &AppState, params: &HashMap<String, String>) -> Response {
    if param(params, "client_id").is_empty()
        || param(params, "grant_type").is_empty()
        || param(params, "redirect_uri").is_empty()
        || param(params, "code").is_empty()
    {
        return OAuthError::invalid_request(
            "client_id, grant_type=authorization_code, code and redirect_uri are required",
        )
        .into_response();
    }

    match state
        .auth_code
        .issue(param(params, "code"), "", param(params, "redirect_uri"))
        .await
    {
        Ok(token) => json_token(token),
        Err(err @ (StoreError::InvalidGrant | StoreError::ExpiredGrant)) => {
            OAuthError::invalid_request(err).into_response()
        }
        Err(err) => {
            error!("authorization code token issuance failed: {err}");
            OAuthError::internal().into_response()
        }
    }
}

/// Checks the resource owner and client credentials against the server
/// presets before issuing.
/// Refer: https://tools.ietf.org/html/rfc6749#section-4.3.2
async fn ropc_token(state: &AppState, params: &HashMap<String, String>) -> Response {
    let ropc = &state.config.ropc;
    if param(params, "username") != ropc.username
        || param(params, "password") != ropc.password
        || param(params, "client_id") != ropc.client_id
        || param(params, "client_secret") != ropc.client_secret
    {
        return OAuthError::invalid_request(
            "username, password, client_id and client_secret are missing or invalid",
        )
        .into_response();
    }

    match state.ropc.issue("").await {
        Ok(token) => json_token(token),
        Err(err) => {
            error!("ROPC token issuance failed: {err}");
            OAuthError::internal().into_response()
        }
    }
}

async fn client_creds_token(state: &AppState, params: &HashMap<String, String>) -> Response {
    let client_creds = &state.config.client_creds;
    if param(params, "client_id") != client_creds.client_id
        || param(params, "client_secret") != client_creds.client_secret
    {
        return OAuthError::invalid_request("client_id and client_secret are missing or invalid")
            .into_response();
    }

    match state.client_creds.issue().await {
        Ok(token) => json_token(token),
        Err(err) => {
            error!("client credentials token issuance failed: {err}");
            OAuthError::internal().into_response()
        }
    }
}

/// Refresh exchange, RFC 6749 Section 6. The flow is picked from the
/// 8-character prefix, which is only safe after the exact-length check.
/// Rotations against one refresh token are serialized through a short-lived
/// KV lock so concurrent requests cannot each revoke the same prior token.
async fn refresh_token(state: &AppState, params: &HashMap<String, String>) -> Response {
    let refresh_token = param(params, "refresh_token");
    if refresh_token.len() != TOKEN_LEN {
        return OAuthError::invalid_request("refresh_token missing or invalid").into_response();
    }

    let lock_key = format!("OA2B_Lock:{refresh_token}");
    match state
        .kv
        .set_nx_ex(&lock_key, "1", REFRESH_LOCK_TTL_SECS)
        .await
    {
        Ok(true) => {}
        Ok(false) => return OAuthError::invalid_refresh_token().into_response(),
        // Same fail-open stance as the rate limiter: a KV hiccup on the lock
        // must not take the refresh path down.
        Err(err) => error!("refresh lock unavailable, proceeding unlocked: {err}"),
    }

    let response = match &refresh_token[..FLOW_ID_LEN] {
        AUTH_CODE_FLOW_ID => auth_code_refresh(state, refresh_token).await,
        ROPC_FLOW_ID => ropc_refresh(state, refresh_token).await,
        _ => OAuthError::invalid_refresh_token().into_response(),
    };

    if let Err(err) = state.kv.delete(&lock_key).await {
        error!("failed to release refresh lock: {err}");
    }

    response
}

async fn auth_code_refresh(state: &AppState, refresh_token: &str) -> Response {
    // Invalidate the previously issued access token, if any.
    match state.auth_code.refresh_token_exists(refresh_token, true).await {
        Ok(true) => match state.auth_code.refresh(refresh_token).await {
            Ok(token) => json_token(token),
            Err(err) => {
                error!("authorization code refresh failed: {err}");
                OAuthError::internal().into_response()
            }
        },
        Ok(false) => OAuthError::invalid_refresh_token().into_response(),
        Err(err) => {
            error!("authorization code refresh scan failed: {err}");
            OAuthError::internal().into_response()
        }
    }
}

async fn ropc_refresh(state: &AppState, refresh_token: &str) -> Response {
    match state.ropc.refresh_token_exists(refresh_token, true).await {
        Ok(true) => match state.ropc.refresh(refresh_token).await {
            Ok(token) => json_token(token),
            Err(err) => {
                error!("ROPC refresh failed: {err}");
                OAuthError::internal().into_response()
            }
        },
        Ok(false) => OAuthError::invalid_refresh_token().into_response(),
        Err(err) => {
            error!("ROPC refresh scan failed: {err}");
            OAuthError::internal().into_response()
        }
    }
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or("")
}

fn json_token<T: Serialize>(token: T) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json;charset=UTF-8")],
        Json(token),
    )
        .into_response()
}

/// Decode an HTTP Basic Auth header into a client id/secret pair. Accepts
/// the value with or without the `Basic ` prefix; anything undecodable
/// yields an empty pair, which fails credential checks downstream.
fn parse_basic_auth_header(header: &str) -> (String, String) {
    let header = header.trim();
    let encoded = header.strip_prefix("Basic ").unwrap_or(header);

    let Ok(bytes) = BASE64_STANDARD.decode(encoded) else {
        return (String::new(), String::new());
    };
    let Ok(decoded) = String::from_utf8(bytes) else {
        return (String::new(), String::new());
    };

    match decoded.split_once(':') {
        Some((client_id, client_secret)) => (client_id.to_string(), client_secret.to_string()),
        None => (String::new(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_auth_header() {
        let encoded = BASE64_STANDARD.encode("clientID:clientSecret");

        assert_eq!(
            parse_basic_auth_header(&format!("Basic {encoded}")),
            ("clientID".to_string(), "clientSecret".to_string())
        );
        // The prefix is optional.
        assert_eq!(
            parse_basic_auth_header(&encoded),
            ("clientID".to_string(), "clientSecret".to_string())
        );
    }

    #[test]
    fn test_parse_basic_auth_header_rejects_garbage() {
        assert_eq!(
            parse_basic_auth_header("Basic not-base64!!!"),
            (String::new(), String::new())
        );

        let no_separator = BASE64_STANDARD.encode("justonefield");
        assert_eq!(
            parse_basic_auth_header(&no_separator),
            (String::new(), String::new())
        );
    }
}
