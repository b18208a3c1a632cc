use crate::state::AppState;
use axum::extract::State;
use axum::response::{Html, IntoResponse, Response};
use handlebars::Handlebars;
use http::StatusCode;
use log::error;
use serde_json::json;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;

/// Load every `templates/*.hbs` file into a registry, keyed by file stem.
pub fn build_templates() -> Result<Handlebars<'static>, String> {
    let mut registry = Handlebars::new();
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");

    let entries =
        fs::read_dir(&dir).map_err(|e| format!("could not read {}: {e}", dir.display()))?;
    for entry in entries {
        let path = entry.map_err(|e| e.to_string())?.path();
        if path.is_file() && path.extension() == Some(OsStr::new("hbs")) {
            if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
                let contents = fs::read_to_string(&path).map_err(|e| e.to_string())?;
                registry
                    .register_template_string(name, contents)
                    .map_err(|e| format!("template {name}: {e}"))?;
            }
        }
    }

    Ok(registry)
}

/// Render a registered template with the given status code. A rendering
/// failure degrades to a bare 500 rather than taking the process down.
pub(crate) fn render(
    state: &AppState,
    status: StatusCode,
    template: &str,
    data: &serde_json::Value,
) -> Response {
    match state.templates.render(template, data) {
        Ok(body) => (status, Html(body)).into_response(),
        Err(err) => {
            error!("failed to render template {template}: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred while processing your request.",
            )
                .into_response()
        }
    }
}

/// HTML error screen used by the browser-facing handlers.
pub(crate) fn html_error<S: ToString>(
    state: &AppState,
    status: StatusCode,
    title: &str,
    desc: S,
) -> Response {
    render(
        state,
        status,
        "error",
        &json!({ "title": title, "desc": desc.to_string() }),
    )
}

/// Serves the home page: one card per flow with its pre-configured
/// credentials, so users can copy them into a client.
pub async fn home(State(state): State<AppState>) -> Response {
    render(
        &state,
        StatusCode::OK,
        "home",
        &json!({
            "baseURL": state.config.base_url,
            "authCode": {
                "authURL": state.config.auth_code.auth_url,
                "tokenURL": state.config.auth_code.token_url,
                "clientID": state.config.auth_code.client_id,
                "clientSecret": state.config.auth_code.client_secret,
            },
            "implicit": {
                "authURL": state.config.implicit.auth_url,
                "clientID": state.config.implicit.client_id,
            },
            "ropc": {
                "tokenURL": state.config.ropc.token_url,
                "username": state.config.ropc.username,
                "password": state.config.ropc.password,
                "clientID": state.config.ropc.client_id,
                "clientSecret": state.config.ropc.client_secret,
            },
            "clientCreds": {
                "tokenURL": state.config.client_creds.token_url,
                "clientID": state.config.client_creds.client_id,
                "clientSecret": state.config.client_creds.client_secret,
            },
        }),
    )
}

/// Serves the 404 page for anything that is not an exact route match.
pub async fn not_found(State(state): State<AppState>) -> Response {
    render(&state, StatusCode::NOT_FOUND, "not_found", &json!({}))
}
