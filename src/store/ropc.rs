use super::{
    mint_unique, refresh_token_scan, token_exists, util, BearerToken, HasRefreshToken,
    StoreError, TokenMeta, ROPC_FLOW_ID, ROPC_TOKENS_SET, TOKEN_EXPIRY_SECS, TOKEN_LEN,
};
use crate::kv::{Kv, KvBackend};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Token issued by the Resource Owner Password Credentials flow.
/// https://tools.ietf.org/html/rfc6749#section-4.3.3
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RopcToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

impl BearerToken for RopcToken {
    fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl HasRefreshToken for RopcToken {
    fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}

/// Mints, verifies, and revokes ROPC flow tokens.
#[derive(Clone)]
pub struct RopcStore {
    kv: Kv,
}

impl RopcStore {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    /// Issue an access/refresh token pair. A 72-character `refresh_token_in`
    /// replaces the generated refresh token before storage, preserving it
    /// across refresh rotations.
    pub async fn issue(&self, refresh_token_in: &str) -> Result<RopcToken, StoreError> {
        mint_unique(&self.kv, ROPC_TOKENS_SET, || {
            let creation_time = Utc::now();
            let timestamp = creation_time.to_rfc3339();
            let nonce = util::nonce(16);

            let access_token = util::flow_hash(ROPC_FLOW_ID, &[&timestamp, &nonce]);
            let mut refresh_token =
                util::flow_hash(ROPC_FLOW_ID, &[&access_token, &timestamp, &nonce]);
            if refresh_token_in.len() == TOKEN_LEN {
                refresh_token = refresh_token_in.to_string();
            }

            (
                RopcToken {
                    access_token,
                    refresh_token,
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

    /// Issue a new access token against a previously issued refresh token,
    /// keeping the refresh token intact.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RopcToken, StoreError> {
        self.issue(refresh_token).await
    }

    /// Whether the access token is currently live in this namespace.
    pub async fn verify(&self, access_token: &str) -> Result<bool, StoreError> {
        token_exists(&self.kv, ROPC_TOKENS_SET, access_token).await
    }

    /// Scan the namespace for a record carrying `refresh_token`; optionally
    /// revoke the access token that owns it.
    pub async fn refresh_token_exists(
        &self,
        refresh_token: &str,
        invalidate_if_found: bool,
    ) -> Result<bool, StoreError> {
        refresh_token_scan::<RopcToken>(
            &self.kv,
            ROPC_TOKENS_SET,
            refresh_token,
            invalidate_if_found,
        )
        .await
    }

    /// Delete an access token; a miss is not an error.
    pub async fn invalidate(&self, access_token: &str) -> Result<(), StoreError> {
        self.kv.hash_delete(ROPC_TOKENS_SET, access_token).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RopcStore {
        RopcStore::new(Kv::in_memory())
    }

    #[tokio::test]
    async fn test_issue_token_shape() {
        let tokens = store();
        let token = tokens.issue("").await.unwrap();

        assert_eq!(token.access_token.len(), 72);
        assert_eq!(token.refresh_token.len(), 72);
        assert!(token.access_token.starts_with(ROPC_FLOW_ID));
        assert!(token.refresh_token.starts_with(ROPC_FLOW_ID));
        assert_eq!(token.expires_in, 3600);
        assert!(tokens.verify(&token.access_token).await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_rotates_access_token_only() {
        let tokens = store();
        let original = tokens.issue("").await.unwrap();

        assert!(tokens
            .refresh_token_exists(&original.refresh_token, true)
            .await
            .unwrap());
        let rotated = tokens.refresh(&original.refresh_token).await.unwrap();

        assert_eq!(rotated.refresh_token, original.refresh_token);
        assert_ne!(rotated.access_token, original.access_token);
        assert!(!tokens.verify(&original.access_token).await.unwrap());
        assert!(tokens.verify(&rotated.access_token).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_refresh_token() {
        let tokens = store();
        tokens.issue("").await.unwrap();

        let absent = format!("{}{}", ROPC_FLOW_ID, "f".repeat(64));
        assert!(!tokens.refresh_token_exists(&absent, true).await.unwrap());
    }
}
