use super::grants::GRANT_EXPIRY_SECS;
use super::{
    StoreError, AUTH_CODE_GRANTS_SET, AUTH_CODE_TOKENS_SET, CLIENT_CREDS_TOKENS_SET,
    IMPLICIT_TOKENS_SET, ROPC_TOKENS_SET, TOKEN_EXPIRY_SECS,
};
use crate::kv::{Kv, KvBackend};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

/// Seconds between housekeeping rounds.
const SWEEP_INTERVAL_SECS: u64 = 300;

// Only the creation time matters to a sweep; the rest of the record is
// ignored during deserialization.
#[derive(Deserialize)]
struct SweptRecord {
    meta: SweptMeta,
}

#[derive(Deserialize)]
struct SweptMeta {
    creation_time: DateTime<Utc>,
}

/// Background task that reaps expired tokens and grants.
///
/// Every five minutes it fans out one sweep per namespace and waits for all
/// of them before sleeping again. A failing sweep is logged and abandoned for
/// the round; the loop itself keeps running. Dropping the handle cancels the
/// task, which gives the server a deterministic shutdown path.
pub struct Housekeeper {
    shutdown: CancellationToken,
}

impl Housekeeper {
    pub fn start(kv: Kv) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        tokio::spawn(async move {
            info!("Housekeeping service has started");
            let mut tick = interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Housekeeping service shutting down");
                        break;
                    }
                    _ = tick.tick() => {}
                }
                run_sweeps(&kv).await;
            }
        });

        Self { shutdown }
    }
}

impl Drop for Housekeeper {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// One housekeeping round: all five namespaces swept concurrently.
pub(crate) async fn run_sweeps(kv: &Kv) {
    let token_max_age = chrono::Duration::seconds(TOKEN_EXPIRY_SECS as i64);
    let (ac, implicit, ropc, cc, grants) = tokio::join!(
        sweep_tokens(kv, AUTH_CODE_TOKENS_SET, token_max_age),
        sweep_tokens(kv, IMPLICIT_TOKENS_SET, token_max_age),
        sweep_tokens(kv, ROPC_TOKENS_SET, token_max_age),
        sweep_tokens(kv, CLIENT_CREDS_TOKENS_SET, token_max_age),
        sweep_grants(kv),
    );

    for (set, outcome) in [
        (AUTH_CODE_TOKENS_SET, ac),
        (IMPLICIT_TOKENS_SET, implicit),
        (ROPC_TOKENS_SET, ropc),
        (CLIENT_CREDS_TOKENS_SET, cc),
        (AUTH_CODE_GRANTS_SET, grants),
    ] {
        if let Err(err) = outcome {
            error!("housekeeping sweep of {set} failed: {err}");
        }
    }
}

/// Delete every token in `set` whose creation time is at least `max_age` old.
/// Returns the number of reaped entries.
pub(crate) async fn sweep_tokens(
    kv: &Kv,
    set: &str,
    max_age: chrono::Duration,
) -> Result<usize, StoreError> {
    let now = Utc::now();
    let mut reaped = 0;

    for (field, raw) in kv.hash_get_all(set).await? {
        let record: SweptRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                error!("skipping unreadable record {field} in {set}: {err}");
                continue;
            }
        };

        if now - record.meta.creation_time >= max_age {
            kv.hash_delete(set, &field).await?;
            reaped += 1;
        }
    }

    Ok(reaped)
}

/// Delete every authorization grant past its 10-minute issue window.
pub(crate) async fn sweep_grants(kv: &Kv) -> Result<usize, StoreError> {
    let now = Utc::now().timestamp();
    let mut reaped = 0;

    for (field, raw) in kv.hash_get_all(AUTH_CODE_GRANTS_SET).await? {
        let issued_at: i64 = match raw.parse() {
            Ok(ts) => ts,
            Err(err) => {
                error!("skipping unreadable grant {field}: {err}");
                continue;
            }
        };

        if now - issued_at >= GRANT_EXPIRY_SECS {
            kv.hash_delete(AUTH_CODE_GRANTS_SET, &field).await?;
            reaped += 1;
        }
    }

    Ok(reaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::grants::GrantStore;
    use crate::store::ropc::RopcStore;
    use crate::store::{StoredRecord, TokenMeta};
    use serde_json::json;

    async fn insert_token(kv: &Kv, set: &str, access_token: &str, age_secs: i64) {
        let record = StoredRecord {
            token: json!({ "access_token": access_token, "expires_in": 3600 }),
            meta: TokenMeta {
                creation_time: Utc::now() - chrono::Duration::seconds(age_secs),
                nonce: "nonce".to_string(),
            },
        };
        kv.hash_set(set, access_token, &serde_json::to_string(&record).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_tokens_reaps_only_expired() {
        let kv = Kv::in_memory();
        insert_token(&kv, ROPC_TOKENS_SET, "stale", 7200).await;
        insert_token(&kv, ROPC_TOKENS_SET, "boundary", 3600).await;
        insert_token(&kv, ROPC_TOKENS_SET, "fresh", 60).await;

        let reaped = sweep_tokens(&kv, ROPC_TOKENS_SET, chrono::Duration::seconds(3600))
            .await
            .unwrap();

        assert_eq!(reaped, 2);
        assert!(!kv.hash_exists(ROPC_TOKENS_SET, "stale").await.unwrap());
        assert!(!kv.hash_exists(ROPC_TOKENS_SET, "boundary").await.unwrap());
        assert!(kv.hash_exists(ROPC_TOKENS_SET, "fresh").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_grants_reaps_only_expired() {
        let kv = Kv::in_memory();
        let grants = GrantStore::new(kv.clone());

        let live = grants.mint("http://cb").await.unwrap();
        let stale = (Utc::now().timestamp() - 601).to_string();
        kv.hash_set(AUTH_CODE_GRANTS_SET, "old:http://cb", &stale)
            .await
            .unwrap();

        let reaped = sweep_grants(&kv).await.unwrap();

        assert_eq!(reaped, 1);
        assert!(!kv
            .hash_exists(AUTH_CODE_GRANTS_SET, "old:http://cb")
            .await
            .unwrap());
        assert!(kv
            .hash_exists(AUTH_CODE_GRANTS_SET, &format!("{live}:http://cb"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_sweep_survives_unreadable_records() {
        let kv = Kv::in_memory();
        kv.hash_set(ROPC_TOKENS_SET, "garbage", "not json")
            .await
            .unwrap();
        insert_token(&kv, ROPC_TOKENS_SET, "stale", 7200).await;

        let reaped = sweep_tokens(&kv, ROPC_TOKENS_SET, chrono::Duration::seconds(3600))
            .await
            .unwrap();

        assert_eq!(reaped, 1);
        assert!(kv.hash_exists(ROPC_TOKENS_SET, "garbage").await.unwrap());
    }

    #[tokio::test]
    async fn test_housekeeper_initial_round() {
        let kv = Kv::in_memory();
        let ropc = RopcStore::new(kv.clone());
        insert_token(&kv, ROPC_TOKENS_SET, "stale", 7200).await;
        let fresh = ropc.issue("").await.unwrap();

        let housekeeper = Housekeeper::start(kv.clone());
        // The first interval tick fires immediately, so the opening sweep
        // lands without waiting out the five-minute cadence.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!kv.hash_exists(ROPC_TOKENS_SET, "stale").await.unwrap());
        assert!(ropc.verify(&fresh.access_token).await.unwrap());
        drop(housekeeper);
    }
}
