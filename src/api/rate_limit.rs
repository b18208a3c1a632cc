use crate::config::policy::RatePolicy;
use crate::kv::{Kv, KvBackend};
use crate::state::AppState;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use log::warn;
use std::net::SocketAddr;
use std::sync::Arc;

/// Per-route, per-IP rate limiting over TTL-backed counters.
///
/// Counters live under `route:ip` and expire with the policy window, so an
/// idle client's bucket disappears on its own. Any KV failure lets the
/// request through: for a demo server, availability beats strictness.
#[derive(Clone, Default)]
pub struct RateLimiter {
    policies: Arc<Vec<RatePolicy>>,
}

pub enum Verdict {
    Allow,
    Deny(RatePolicy),
}

impl RateLimiter {
    pub fn new(policies: Vec<RatePolicy>) -> Self {
        Self {
            policies: Arc::new(policies),
        }
    }

    fn policy_for(&self, route: &str) -> Option<&RatePolicy> {
        self.policies.iter().find(|policy| policy.route == route)
    }

    /// Record a hit and decide whether the request may pass. Routes without
    /// a policy are unlimited.
    pub async fn check(&self, kv: &Kv, route: &str, client_ip: &str) -> Verdict {
        let Some(policy) = self.policy_for(route) else {
            return Verdict::Allow;
        };

        let key = format!("{route}:{client_ip}");
        let hits = match kv.get(&key).await {
            Ok(Some(_)) => match kv.incr(&key).await {
                Ok(hits) => hits,
                Err(err) => {
                    warn!("rate limiter letting request pass, INCR failed: {err}");
                    return Verdict::Allow;
                }
            },
            Ok(None) => {
                let window_secs = (policy.minutes * 60).max(0) as u64;
                if let Err(err) = kv.set_ex(&key, "1", window_secs).await {
                    warn!("rate limiter letting request pass, SET failed: {err}");
                    return Verdict::Allow;
                }
                1
            }
            Err(err) => {
                warn!("rate limiter letting request pass, GET failed: {err}");
                return Verdict::Allow;
            }
        };

        if hits > policy.limit {
            Verdict::Deny(policy.clone())
        } else {
            Verdict::Allow
        }
    }
}

/// Middleware applied to every route.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let route = request.uri().path().to_string();
    let ip = client_ip(&request);

    match state.limiter.check(&state.kv, &route, &ip).await {
        Verdict::Allow => next.run(request).await,
        Verdict::Deny(policy) => (
            StatusCode::TOO_MANY_REQUESTS,
            format!(
                "You have exceeded the rate limit of {} requests per {} minute(s) on this route.\n",
                policy.limit, policy.minutes
            ),
        )
            .into_response(),
    }
}

/// Best-effort client address: the connection's peer IP when the listener
/// provides it, the first `X-Forwarded-For` entry otherwise. Requests with
/// neither share one bucket.
fn client_ip(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(vec![RatePolicy {
            route: "/".to_string(),
            limit: 3,
            minutes: 1,
        }])
    }

    #[tokio::test]
    async fn test_unlimited_route_passes() {
        let kv = Kv::in_memory();
        let limiter = limiter();

        for _ in 0..100 {
            assert!(matches!(
                limiter.check(&kv, "/echo", "1.2.3.4").await,
                Verdict::Allow
            ));
        }
    }

    #[tokio::test]
    async fn test_denies_past_the_limit() {
        let kv = Kv::in_memory();
        let limiter = limiter();

        for _ in 0..3 {
            assert!(matches!(
                limiter.check(&kv, "/", "1.2.3.4").await,
                Verdict::Allow
            ));
        }
        assert!(matches!(
            limiter.check(&kv, "/", "1.2.3.4").await,
            Verdict::Deny(_)
        ));
    }

    #[tokio::test]
    async fn test_buckets_are_per_ip() {
        let kv = Kv::in_memory();
        let limiter = limiter();

        for _ in 0..3 {
            limiter.check(&kv, "/", "1.2.3.4").await;
        }
        assert!(matches!(
            limiter.check(&kv, "/", "5.6.7.8").await,
            Verdict::Allow
        ));
        assert!(matches!(
            limiter.check(&kv, "/", "1.2.3.4").await,
            Verdict::Deny(_)
        ));
    }
}
