use crate::api::pages::build_templates;
use crate::api::rate_limit::RateLimiter;
use crate::config::policy::RatePolicy;
use crate::config::AppConfig;
use crate::kv::Kv;
use crate::store::auth_code::AuthCodeStore;
use crate::store::client_creds::ClientCredsStore;
use crate::store::grants::GrantStore;
use crate::store::housekeeper::Housekeeper;
use crate::store::implicit::ImplicitStore;
use crate::store::ropc::RopcStore;
use handlebars::Handlebars;
use std::sync::Arc;

/// Shared application state: the static configuration, the KV handle, the
/// per-flow stores, the rate limiter, and the template registry. Everything
/// is injected through the constructor; there are no process globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub kv: Kv,
    pub grants: GrantStore,
    pub auth_code: AuthCodeStore,
    pub ropc: RopcStore,
    pub implicit: ImplicitStore,
    pub client_creds: ClientCredsStore,
    pub limiter: RateLimiter,
    pub templates: Arc<Handlebars<'static>>,
    // Kept solely for its lifetime: dropping the last clone of the state
    // cancels the housekeeping task.
    _housekeeper: Option<Arc<Housekeeper>>,
}

impl AppState {
    /// Build the full state and start the housekeeping task.
    pub fn new(config: AppConfig, kv: Kv, policies: Vec<RatePolicy>) -> Result<Self, String> {
        let housekeeper = Some(Arc::new(Housekeeper::start(kv.clone())));
        Self::assemble(config, kv, policies, housekeeper)
    }

    /// State without the background housekeeper; sweeps can still be driven
    /// manually. Used by tests that need deterministic namespace contents.
    pub fn without_housekeeper(
        config: AppConfig,
        kv: Kv,
        policies: Vec<RatePolicy>,
    ) -> Result<Self, String> {
        Self::assemble(config, kv, policies, None)
    }

    fn assemble(
        config: AppConfig,
        kv: Kv,
        policies: Vec<RatePolicy>,
        housekeeper: Option<Arc<Housekeeper>>,
    ) -> Result<Self, String> {
        let templates = Arc::new(build_templates()?);
        let grants = GrantStore::new(kv.clone());

        Ok(Self {
            config: Arc::new(config),
            grants: grants.clone(),
            auth_code: AuthCodeStore::new(kv.clone(), grants),
            ropc: RopcStore::new(kv.clone()),
            implicit: ImplicitStore::new(kv.clone()),
            client_creds: ClientCredsStore::new(kv.clone()),
            limiter: RateLimiter::new(policies),
            templates,
            kv,
            _housekeeper: housekeeper,
        })
    }
}
