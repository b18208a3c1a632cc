use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::env;

pub mod policy;

/// Numeric flow tags carried through the consent form.
pub const FLOW_AUTH_CODE: i64 = 1;
pub const FLOW_IMPLICIT: i64 = 2;

/// Static client registration for the Authorization Code flow.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthCodeConfig {
    #[serde(rename = "authurl", default)]
    pub auth_url: String,
    #[serde(rename = "tokenurl", default)]
    pub token_url: String,
    #[serde(rename = "clientid", default)]
    pub client_id: String,
    #[serde(rename = "clientsecret", default)]
    pub client_secret: String,
}

/// Static client registration for the Implicit flow.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ImplicitConfig {
    #[serde(rename = "authurl", default)]
    pub auth_url: String,
    #[serde(rename = "clientid", default)]
    pub client_id: String,
}

/// Static resource-owner and client registration for the ROPC flow.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RopcConfig {
    #[serde(rename = "tokenurl", default)]
    pub token_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "clientid", default)]
    pub client_id: String,
    #[serde(rename = "clientsecret", default)]
    pub client_secret: String,
}

/// Static client registration for the Client Credentials flow.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClientCredsConfig {
    #[serde(rename = "tokenurl", default)]
    pub token_url: String,
    #[serde(rename = "clientid", default)]
    pub client_id: String,
    #[serde(rename = "clientsecret", default)]
    pub client_secret: String,
}

/// Server configuration: one block of static credentials per flow, loaded
/// from `server.json` at startup. Clients and users are not persisted
/// anywhere else; this is a demonstration server.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(rename = "baseurl", default)]
    pub base_url: String,
    #[serde(rename = "authcode", default)]
    pub auth_code: AuthCodeConfig,
    #[serde(default)]
    pub implicit: ImplicitConfig,
    #[serde(default)]
    pub ropc: RopcConfig,
    #[serde(rename = "clientcreds", default)]
    pub client_creds: ClientCredsConfig,
}

impl AppConfig {
    /// Load the configuration from a JSON file.
    pub fn load(path: &str) -> Result<Self, String> {
        let mut cfg: AppConfig = Config::builder()
            .add_source(File::new(path, FileFormat::Json))
            .build()
            .map_err(|e| e.to_string())?
            .try_deserialize()
            .map_err(|e| e.to_string())?;

        // Remove trailing "/" in the URL, if any
        if cfg.base_url.ends_with('/') {
            cfg.base_url.pop();
        }

        Ok(cfg)
    }
}

/// The port to listen on: `PORT` from the environment, 8080 otherwise.
pub fn listen_port() -> u16 {
    env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080)
}

/// Resolve the Redis endpoint from the environment, in priority order: the
/// container hostname when `DOCKER` is set, the local loopback default when
/// no `REDIS_*` variable is set, and the explicit host/port/password triple
/// otherwise.
pub fn redis_url() -> String {
    if env::var("DOCKER").is_ok() {
        return "redis://redis:6379".to_string();
    }

    let host = env::var("REDIS_HOST").unwrap_or_default();
    let port = env::var("REDIS_PORT").unwrap_or_default();
    let pass = env::var("REDIS_PASS").unwrap_or_default();

    if host.is_empty() && port.is_empty() && pass.is_empty() {
        return "redis://127.0.0.1:6379".to_string();
    }

    format!("redis://:{pass}@{host}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_server_config() {
        let dir = std::env::temp_dir().join("oauth2-sandbox-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("server.json");
        std::fs::write(
            &path,
            r#"{
                "baseURL": "http://localhost:8080/",
                "authCode": {
                    "authURL": "http://localhost:8080/authorize",
                    "tokenURL": "http://localhost:8080/token",
                    "clientID": "clientID",
                    "clientSecret": "clientSecret"
                },
                "implicit": {
                    "authURL": "http://localhost:8080/authorize",
                    "clientID": "clientID"
                },
                "ropc": {
                    "tokenURL": "http://localhost:8080/token",
                    "username": "john",
                    "password": "doe",
                    "clientID": "clientID",
                    "clientSecret": "clientSecret"
                },
                "clientCreds": {
                    "tokenURL": "http://localhost:8080/token",
                    "clientID": "clientID",
                    "clientSecret": "clientSecret"
                }
            }"#,
        )
        .unwrap();

        let cfg = AppConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.base_url, "http://localhost:8080");
        assert_eq!(cfg.auth_code.client_id, "clientID");
        assert_eq!(cfg.ropc.username, "john");
        assert_eq!(cfg.client_creds.client_secret, "clientSecret");
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        assert!(AppConfig::load("/does/not/exist.json").is_err());
    }
}
