use super::{
    mint_unique, util, BearerToken, StoreError, TokenMeta, IMPLICIT_FLOW_ID, IMPLICIT_TOKENS_SET,
    TOKEN_EXPIRY_SECS,
};
use crate::kv::Kv;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Token issued by the Implicit flow; access token only, no refresh token.
/// https://tools.ietf.org/html/rfc6749#section-4.2.2
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplicitToken {
    pub access_token: String,
    pub expires_in: u64,
}

impl BearerToken for ImplicitToken {
    fn access_token(&self) -> &str {
        &self.access_token
    }
}

#[derive(Clone)]
pub struct ImplicitStore {
    kv: Kv,
}

impl ImplicitStore {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    pub async fn issue(&self) -> Result<ImplicitToken, StoreError> {
        mint_unique(&self.kv, IMPLICIT_TOKENS_SET, || {
            let creation_time = Utc::now();
            let nonce = util::nonce(16);
            let access_token =
                util::flow_hash(IMPLICIT_FLOW_ID, &[&creation_time.to_rfc3339(), &nonce]);

            (
                ImplicitToken {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_token_shape() {
        let tokens = ImplicitStore::new(Kv::in_memory());
        let token = tokens.issue().await.unwrap();

        assert_eq!(token.access_token.len(), 72);
        assert!(token.access_token.starts_with(IMPLICIT_FLOW_ID));
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_issued_tokens_are_distinct() {
        let tokens = ImplicitStore::new(Kv::in_memory());
        let first = tokens.issue().await.unwrap();
        let second = tokens.issue().await.unwrap();
        assert_ne!(first.access_token, second.access_token);
    }
}
