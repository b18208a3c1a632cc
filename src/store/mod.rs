use crate::kv::{Kv, KvBackend, KvError};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

pub mod auth_code;
pub mod client_creds;
pub mod grants;
pub mod housekeeper;
pub mod implicit;
pub mod ropc;
pub mod util;

/// Hash namespace holding Authorization Code flow tokens.
pub const AUTH_CODE_TOKENS_SET: &str = "OA2B_AC_Tokens";
/// Hash namespace holding issued authorization grants until a token request
/// consumes them.
pub const AUTH_CODE_GRANTS_SET: &str = "OA2B_AC_Grants";
/// Hash namespace holding Implicit flow tokens.
pub const IMPLICIT_TOKENS_SET: &str = "OA2B_IG_Tokens";
/// Hash namespace holding Resource Owner Password Credentials flow tokens.
pub const ROPC_TOKENS_SET: &str = "OA2B_ROPC_Tokens";
/// Hash namespace holding Client Credentials flow tokens.
pub const CLIENT_CREDS_TOKENS_SET: &str = "OA2B_CC_Tokens";

/// Prepended to tokens issued by the Authorization Code flow.
pub const AUTH_CODE_FLOW_ID: &str = "AUTHCODE";
/// Prepended to tokens issued by the Implicit flow.
pub const IMPLICIT_FLOW_ID: &str = "IMPLICIT";
/// Prepended to tokens issued by the ROPC flow.
pub const ROPC_FLOW_ID: &str = "PASSCRED";
/// Prepended to tokens issued by the Client Credentials flow.
pub const CLIENT_CREDS_FLOW_ID: &str = "CLICREDS";

/// Flow identifier prefix length; with the 64 hex chars of a SHA-256 digest
/// this makes every issued token exactly 72 characters.
pub const FLOW_ID_LEN: usize = 8;
/// Full length of every access and refresh token.
pub const TOKEN_LEN: usize = 72;

/// Seconds an access token is advertised (and honored) as valid.
pub const TOKEN_EXPIRY_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The grant was never issued, was already consumed, has been reaped, or
    /// was presented with a different redirect URI.
    #[error("recycled/expired/invalid authorization grant or wrong redirect_uri")]
    InvalidGrant,
    /// The grant exists but is past its 10-minute issue window.
    #[error("expired authorization grant")]
    ExpiredGrant,
    #[error("kv error: {0}")]
    Kv(#[from] KvError),
    #[error("malformed stored record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serialized shape of every token namespace entry: the client-visible token
/// alongside its server-side metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredRecord<T, M> {
    pub token: T,
    pub meta: M,
}

/// Metadata kept for tokens that are not bound to an authorization grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMeta {
    pub creation_time: DateTime<Utc>,
    pub nonce: String,
}

/// Metadata for Authorization Code flow tokens; additionally remembers the
/// grant the token was exchanged for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCodeTokenMeta {
    pub auth_grant: String,
    pub creation_time: DateTime<Utc>,
    pub nonce: String,
}

pub(crate) trait BearerToken {
    fn access_token(&self) -> &str;
}

/// Shared mint scaffold for all four flows: generate a candidate token,
/// insert it into the namespace only if the access token is not already
/// taken, and retry on collision. With 16 random nonce characters behind a
/// SHA-256 digest the expected iteration count is one.
pub(crate) async fn mint_unique<T, M, F>(
    kv: &Kv,
    set: &str,
    mut factory: F,
) -> Result<T, StoreError>
where
    T: BearerToken + Serialize,
    M: Serialize,
    F: FnMut() -> (T, M),
{
    loop {
        let (token, meta) = factory();
        let record = serde_json::to_string(&StoredRecord {
            token: &token,
            meta: &meta,
        })?;
        if kv
            .hash_set_if_absent(set, token.access_token(), &record)
            .await?
        {
            return Ok(token);
        }
    }
}

/// Presence check shared by the verify operations.
pub(crate) async fn token_exists(kv: &Kv, set: &str, access_token: &str) -> Result<bool, StoreError> {
    Ok(kv.hash_exists(set, access_token).await?)
}

/// Linear scan of a namespace for a matching refresh token. When
/// `invalidate_if_found` is set, the owning access-token entry is deleted,
/// which is how a refresh exchange revokes the prior access token.
pub(crate) async fn refresh_token_scan<T>(
    kv: &Kv,
    set: &str,
    refresh_token: &str,
    invalidate_if_found: bool,
) -> Result<bool, StoreError>
where
    T: BearerToken + HasRefreshToken + DeserializeOwned,
{
    for (field, raw) in kv.hash_get_all(set).await? {
        let record: StoredRecord<T, serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                log::error!("skipping unreadable record {field} in {set}: {err}");
                continue;
            }
        };

        if record.token.refresh_token() == refresh_token {
            if invalidate_if_found {
                kv.hash_delete(set, record.token.access_token()).await?;
            }
            return Ok(true);
        }
    }

    Ok(false)
}

pub(crate) trait HasRefreshToken {
    fn refresh_token(&self) -> &str;
}
