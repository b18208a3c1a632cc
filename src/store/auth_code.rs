use super::grants::GrantStore;
use super::{
    mint_unique, refresh_token_scan, token_exists, util, AuthCodeTokenMeta, BearerToken,
    HasRefreshToken, StoreError, AUTH_CODE_FLOW_ID, AUTH_CODE_TOKENS_SET, TOKEN_EXPIRY_SECS,
    TOKEN_LEN,
};
use crate::kv::{Kv, KvBackend};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Token issued by the Authorization Code flow.
/// https://tools.ietf.org/html/rfc6749#section-4.1.3
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCodeToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

impl BearerToken for AuthCodeToken {
    fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl HasRefreshToken for AuthCodeToken {
    fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}

/// Mints, verifies, and revokes Authorization Code flow tokens.
#[derive(Clone)]
pub struct AuthCodeStore {
    kv: Kv,
    grants: GrantStore,
}

impl AuthCodeStore {
    pub fn new(kv: Kv, grants: GrantStore) -> Self {
        Self { kv, grants }
    }

    /// Exchange an authorization grant for a token. The grant is consumed
    /// first and its errors propagate untouched.
    ///
    /// When `refresh_token_in` is exactly 72 characters it replaces the
    /// freshly generated refresh token before the record is stored; this is
    /// what keeps a client's refresh token stable across refresh rotations.
    pub async fn issue(
        &self,
        code: &str,
        refresh_token_in: &str,
        redirect_uri: &str,
    ) -> Result<AuthCodeToken, StoreError> {
        self.grants.consume(code, redirect_uri).await?;

        mint_unique(&self.kv, AUTH_CODE_TOKENS_SET, || {
            let creation_time = Utc::now();
            let timestamp = creation_time.to_rfc3339();
            let nonce = util::nonce(16);

            let access_token =
                util::flow_hash(AUTH_CODE_FLOW_ID, &[code, &timestamp, &nonce]);
            let mut refresh_token = util::flow_hash(AUTH_CODE_FLOW_ID, &[&timestamp, &nonce]);
            if refresh_token_in.len() == TOKEN_LEN {
                refresh_token = refresh_token_in.to_string();
            }

            (
                AuthCodeToken {
                    access_token,
                    refresh_token,
                    expires_in: TOKEN_EXPIRY_SECS,
                },
                AuthCodeTokenMeta {
                    auth_grant: code.to_string(),
                    creation_time,
                    nonce,
                },
            )
        })
        .await
    }

    /// Issue a new access token against a previously issued refresh token.
    /// The refresh token is carried over bit-for-bit. The caller is expected
    /// to have invalidated the prior access token via
    /// [`refresh_token_exists`](Self::refresh_token_exists) first.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthCodeToken, StoreError> {
        let code = self.grants.mint("").await?;
        self.issue(&code, refresh_token, "").await
    }

    /// Whether the access token is currently live in this namespace.
    pub async fn verify(&self, access_token: &str) -> Result<bool, StoreError> {
        token_exists(&self.kv, AUTH_CODE_TOKENS_SET, access_token).await
    }

    /// Scan the namespace for a record carrying `refresh_token`; optionally
    /// revoke the access token that owns it. O(n) in stored tokens.
    pub async fn refresh_token_exists(
        &self,
        refresh_token: &str,
        invalidate_if_found: bool,
    ) -> Result<bool, StoreError> {
        refresh_token_scan::<AuthCodeToken>(
            &self.kv,
            AUTH_CODE_TOKENS_SET,
            refresh_token,
            invalidate_if_found,
        )
        .await
    }

    /// Delete an access token; a miss is not an error.
    pub async fn invalidate(&self, access_token: &str) -> Result<(), StoreError> {
        self.kv.hash_delete(AUTH_CODE_TOKENS_SET, access_token).await?;
        Ok(())
    }
}
