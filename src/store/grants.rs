use super::{util, StoreError, AUTH_CODE_GRANTS_SET};
use crate::kv::{Kv, KvBackend};
use chrono::Utc;

/// Seconds an authorization grant stays redeemable, per RFC 6749 section
/// 4.1.2's recommended maximum.
pub const GRANT_EXPIRY_SECS: i64 = 600;

/// Single-use authorization grants for the Authorization Code flow.
///
/// A grant is stored under the composite field `code:redirect_uri` with its
/// issue time as the value. RFC 6749 requires the token request to repeat the
/// redirect URI used at authorization time, so binding it into the field name
/// makes the lookup verify it for free.
#[derive(Clone)]
pub struct GrantStore {
    kv: Kv,
}

impl GrantStore {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    /// Generate a new authorization grant and record it. Retries with a fresh
    /// nonce on the (theoretical) collision with an outstanding grant.
    pub async fn mint(&self, redirect_uri: &str) -> Result<String, StoreError> {
        loop {
            let code = util::nonce(20);
            let field = grant_field(&code, redirect_uri);
            let issued_at = Utc::now().timestamp().to_string();
            if self
                .kv
                .hash_set_if_absent(AUTH_CODE_GRANTS_SET, &field, &issued_at)
                .await?
            {
                return Ok(code);
            }
        }
    }

    /// Redeem a grant exactly once.
    ///
    /// An absent field means the grant was never issued, was already
    /// consumed, was reaped, or came with the wrong redirect URI; callers
    /// cannot distinguish these and are not meant to. A present field past
    /// the 10-minute window is reported expired and left for the sweeper.
    /// Otherwise the field is deleted, and the delete's return value decides
    /// the winner when two token requests race on the same grant.
    pub async fn consume(&self, code: &str, redirect_uri: &str) -> Result<(), StoreError> {
        let field = grant_field(code, redirect_uri);

        let issued_at = self
            .kv
            .hash_get(AUTH_CODE_GRANTS_SET, &field)
            .await?
            .ok_or(StoreError::InvalidGrant)?;
        let issued_at: i64 = serde_json::from_str(&issued_at)?;

        if Utc::now().timestamp() - issued_at >= GRANT_EXPIRY_SECS {
            return Err(StoreError::ExpiredGrant);
        }

        if !self.kv.hash_delete(AUTH_CODE_GRANTS_SET, &field).await? {
            return Err(StoreError::InvalidGrant);
        }

        Ok(())
    }
}

fn grant_field(code: &str, redirect_uri: &str) -> String {
    format!("{code}:{redirect_uri}")
}
