use axum::extract::{ConnectInfo, Request};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{header, StatusCode, Version};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use url::form_urlencoded;

/// What the echo endpoint reflects back to the caller.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoResponse {
    method: String,
    http_version: String,

    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_params: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    urlencoded_form: Option<HashMap<String, String>>,

    headers: HashMap<String, String>,
    origin: String,
}

/// ANY /echo: reflects the request as JSON for client debugging. No
/// authentication, no side effects.
pub async fn echo(request: Request) -> Response {
    let mut response = EchoResponse {
        method: request.method().to_string(),
        http_version: version_string(request.version()),
        origin: request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default(),
        ..EchoResponse::default()
    };

    for (name, value) in request.headers() {
        response.headers.insert(
            name.to_string(),
            value.to_str().unwrap_or_default().to_string(),
        );
    }

    if let Some(query) = request.uri().query() {
        let params: HashMap<String, String> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        if !params.is_empty() {
            response.query_params = Some(params);
        }
    }

    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if let Ok(bytes) = axum::body::to_bytes(request.into_body(), 64 * 1024).await {
        if is_form && !bytes.is_empty() {
            let form: HashMap<String, String> =
                form_urlencoded::parse(&bytes).into_owned().collect();
            if !form.is_empty() {
                response.urlencoded_form = Some(form);
            }
        }
        response.body = String::from_utf8_lossy(&bytes).into_owned();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json;charset=UTF-8")],
        Json(response),
    )
        .into_response()
}

fn version_string(version: Version) -> String {
    match version {
        Version::HTTP_09 => "0.9".to_string(),
        Version::HTTP_10 => "1.0".to_string(),
        Version::HTTP_11 => "1.1".to_string(),
        Version::HTTP_2 => "2.0".to_string(),
        Version::HTTP_3 => "3.0".to_string(),
        other => format!("{other:?}"),
    }
}
