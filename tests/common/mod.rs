use axum::body::{Body, Bytes};
use axum::Router;
use http::{header, HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use oauth2_sandbox::config::policy::RatePolicy;
use oauth2_sandbox::config::{
    AppConfig, AuthCodeConfig, ClientCredsConfig, ImplicitConfig, RopcConfig,
};
use oauth2_sandbox::kv::Kv;
use oauth2_sandbox::{create_app, AppState};
use tower::ServiceExt;
use url::form_urlencoded;

/// Stable address used for every request so rate-limit buckets behave as if
/// a single client were talking to the server.
pub const CLIENT_ADDR: &str = "203.0.113.7";

/// A full application over the in-memory KV backend, plus direct access to
/// the state for assertions against the stores.
pub struct TestServer {
    pub app: Router,
    pub state: AppState,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_policies(Vec::new())
    }

    pub fn with_policies(policies: Vec<RatePolicy>) -> Self {
        let state = AppState::without_housekeeper(test_config(), Kv::in_memory(), policies)
            .expect("failed to build test state");
        Self {
            app: create_app(state.clone()),
            state,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("x-forwarded-for", CLIENT_ADDR)
            .body(Body::empty())
            .expect("failed to build request");
        self.send(request).await
    }

    pub async fn post_form(&self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let mut body = form_urlencoded::Serializer::new(String::new());
        for (key, value) in fields {
            body.append_pair(key, value);
        }

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("x-forwarded-for", CLIENT_ADDR)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.finish()))
            .expect("failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("failed to read response body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|err| {
            panic!("response body is not JSON ({err}): {}", self.text())
        })
    }

    pub fn location(&self) -> String {
        self.headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .expect("response carries no Location header")
            .to_string()
    }

    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "expected {expected} but got {} with body: {}",
            self.status,
            self.text()
        );
        self
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        base_url: "http://localhost:8080".to_string(),
        auth_code: AuthCodeConfig {
            auth_url: "http://localhost:8080/authorize".to_string(),
            token_url: "http://localhost:8080/token".to_string(),
            client_id: "clientID".to_string(),
            client_secret: "clientSecret".to_string(),
        },
        implicit: ImplicitConfig {
            auth_url: "http://localhost:8080/authorize".to_string(),
            client_id: "clientID".to_string(),
        },
        ropc: RopcConfig {
            token_url: "http://localhost:8080/token".to_string(),
            username: "john".to_string(),
            password: "doe".to_string(),
            client_id: "clientID".to_string(),
            client_secret: "clientSecret".to_string(),
        },
        client_creds: ClientCredsConfig {
            token_url: "http://localhost:8080/token".to_string(),
            client_id: "clientID".to_string(),
            client_secret: "clientSecret".to_string(),
        },
    }
}

/// Run the Authorization Code front channel and return the 20-character
/// grant attached to the redirect.
pub async fn obtain_auth_code(server: &TestServer, redirect_uri: &str) -> String {
    server
        .get("/authorize?response_type=code&client_id=clientID")
        .await
        .assert_status(StatusCode::OK);

    let response = server
        .post_form(
            "/response",
            &[
                ("flow", "1"),
                ("response", "ACCEPT"),
                ("redirectURI", redirect_uri),
            ],
        )
        .await;
    response.assert_status(StatusCode::SEE_OTHER);

    let location = response.location();
    let marker = format!("{redirect_uri}?code=");
    assert!(
        location.starts_with(&marker),
        "unexpected redirect: {location}"
    );
    location[marker.len()..].to_string()
}
