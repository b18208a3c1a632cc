use super::pages::{html_error, render};
use super::read_form;
use crate::config::{FLOW_AUTH_CODE, FLOW_IMPLICIT};
use crate::state::AppState;
use axum::extract::{Query, Request, State};
use axum::response::{IntoResponse, Redirect, Response};
use http::StatusCode;
use log::error;
use serde_json::json;
use std::collections::HashMap;

// The authorization screen asks for consent to these; they are purely
// cosmetic on a sandbox server.
const SCOPES: [&str; 3] = ["Fly to Mars", "Travel back in time", "Ride a dragon"];

/// GET /authorize: entry point of the Authorization Code and Implicit flows.
/// Requires `response_type` and `client_id`; a recognized client gets the
/// consent screen tagged with the flow, anything else a 401.
pub async fn authorize(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let response_type = params.get("response_type").map(String::as_str).unwrap_or("");
    let client_id = params.get("client_id").map(String::as_str).unwrap_or("");

    if response_type.is_empty() || client_id.is_empty() {
        return html_error(
            &state,
            StatusCode::BAD_REQUEST,
            "Bad Request",
            "response_type and client_id are required.",
        );
    }

    match response_type {
        "code" => present_consent_screen(&state, client_id, FLOW_AUTH_CODE),
        "token" => present_consent_screen(&state, client_id, FLOW_IMPLICIT),
        other => html_error(
            &state,
            StatusCode::BAD_REQUEST,
            "Authorization Flow Error",
            format!("Unknown response_type: {other}"),
        ),
    }
}

fn present_consent_screen(state: &AppState, client_id: &str, flow: i64) -> Response {
    if client_id != state.config.auth_code.client_id {
        return html_error(
            state,
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            "Invalid client_id",
        );
    }

    render(
        state,
        StatusCode::OK,
        "auth_screen",
        &json!({ "flow": flow, "scopes": SCOPES }),
    )
}

/// POST /response: the consent screen's verdict. ACCEPT mints a grant
/// (Authorization Code) or a token (Implicit) and sends the user-agent back
/// to the redirect URI; CANCEL reports `access_denied` the RFC way.
pub async fn consent_response(State(state): State<AppState>, request: Request) -> Response {
    let params = match read_form(request).await {
        Ok(params) => params,
        Err(err) => return html_error(&state, err.status(), err.title(), err.description()),
    };

    let Some(flow) = params.get("flow").and_then(|raw| raw.parse::<i64>().ok()) else {
        return html_error(
            &state,
            StatusCode::BAD_REQUEST,
            "OAuth 2.0 Flow Error",
            "Unrecognized flow",
        );
    };

    let response = params.get("response").map(String::as_str).unwrap_or("");
    let mut redirect_uri = params
        .get("redirectURI")
        .map(String::as_str)
        .unwrap_or("")
        .to_string();

    match response {
        "ACCEPT" => match flow {
            FLOW_AUTH_CODE => match state.grants.mint(&redirect_uri).await {
                Ok(code) => redirect_uri = format!("{redirect_uri}?code={code}"),
                Err(err) => {
                    error!("failed to mint authorization grant: {err}");
                    return token_generation_failed(&state);
                }
            },
            FLOW_IMPLICIT => match state.implicit.issue().await {
                Ok(token) => {
                    redirect_uri = format!(
                        "{redirect_uri}#access_token={}&token_type=bearer&expires_in={}",
                        token.access_token, token.expires_in
                    );
                }
                Err(err) => {
                    error!("failed to mint implicit token: {err}");
                    return token_generation_failed(&state);
                }
            },
            _ => {
                return html_error(
                    &state,
                    StatusCode::BAD_REQUEST,
                    "OAuth 2.0 Flow Error",
                    "Unrecognized flow",
                )
            }
        },
        "CANCEL" => redirect_uri = format!("{redirect_uri}?error=access_denied"),
        _ => {}
    }

    Redirect::to(&redirect_uri).into_response()
}

fn token_generation_failed(state: &AppState) -> Response {
    html_error(
        state,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error",
        "Token generation failed. Please try again.",
    )
}
