use super::{
    mint_unique, token_exists, util, BearerToken, StoreError, TokenMeta, CLIENT_CREDS_FLOW_ID,
    CLIENT_CREDS_TOKENS_SET, TOKEN_EXPIRY_SECS,
};
use crate::kv::Kv;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Token issued by the Client Credentials flow; access token only.
/// https://tools.ietf.org/html/rfc6749#section-4.4.3
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCredsToken {
    pub access_token: String,
    pub expires_in: u64,
}

impl BearerToken for ClientCredsToken {
    fn access_token(&self) -> &str {
        &self.access_token
    }
}

#[derive(Clone)]
pub struct ClientCredsStore {
    kv: Kv,
}

impl ClientCredsStore {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    pub async fn issue(&self) -> Result<ClientCredsToken, StoreError> {
        mint_unique(&self.kv, CLIENT_CREDS_TOKENS_SET, || {
            let creation_time = Utc::now();
            let nonce = util::nonce(16);
            let access_token =
                util::flow_hash(CLIENT_CREDS_FLOW_ID, &[&creation_time.to_rfc3339(), &nonce]);

            (
                ClientCredsToken {
                    access_token,
                    expires_in: TOKEN_EXPIRY_SECS,
                },
                TokenMeta {
                    creation_time,
                    nonce,
                },
            )
        })
        .await
    }

    /// Whether the access token is currently live in this namespace.
    pub async fn verify(&self, access_token: &str) -> Result<bool, StoreError> {
        token_exists(&self.kv, CLIENT_CREDS_TOKENS_SET, access_token).await
    }
}
