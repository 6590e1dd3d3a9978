//! Dispatch of canonical chat requests to the selected provider.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::adapters;
use crate::chat::{ChatRequest, ChatResult};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::http_client::HttpClient;
use crate::profile::{ProfileCatalog, ProviderProfile};
use crate::rate_limiter::{AdmitDecision, RateLimitSettings, RateLimiter, Window, WindowUsage};

/// Remaining minute-window requests at which a low-quota warning is logged.
const LOW_QUOTA_WARNING: usize = 3;

/// Values the router needs from configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub initial_model: String,
    pub request_timeout: Duration,
    pub rate_limit: RateLimitSettings,
}

/// Owns the active model selection, the credentials and the rate limiter.
///
/// All methods take `&self`; the limiter and the active profile sit behind
/// locks so a router shared across sessions keeps both consistent.
pub struct ModelRouter {
    catalog: ProfileCatalog,
    credentials: Credentials,
    active: RwLock<ProviderProfile>,
    limiter: Mutex<RateLimiter>,
    http: Arc<dyn HttpClient>,
    request_timeout: Duration,
}

impl ModelRouter {
    pub fn new(
        catalog: ProfileCatalog,
        credentials: Credentials,
        settings: RouterSettings,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        settings.rate_limit.validate()?;
        let limiter = RateLimiter::new(settings.rate_limit);
        Self::with_rate_limiter(catalog, credentials, settings, http, limiter)
    }

    /// Creates a router around an existing limiter (for testing).
    pub fn with_rate_limiter(
        catalog: ProfileCatalog,
        credentials: Credentials,
        settings: RouterSettings,
        http: Arc<dyn HttpClient>,
        limiter: RateLimiter,
    ) -> Result<Self> {
        let active = lookup(&catalog, &settings.initial_model)?.clone();
        Ok(Self {
            catalog,
            credentials,
            active: RwLock::new(active),
            limiter: Mutex::new(limiter),
            http,
            request_timeout: settings.request_timeout,
        })
    }

    pub fn active_profile(&self) -> ProviderProfile {
        self.active.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn active_model(&self) -> String {
        self.active_profile().name
    }

    pub fn available_models(&self) -> Vec<&str> {
        self.catalog.names()
    }

    pub fn has_credential(&self, profile: &ProviderProfile) -> bool {
        self.credentials.get(&profile.provider_id).is_some()
    }

    /// Selects another model. An unknown name leaves the current selection as it was.
    pub fn switch_model(&self, name: &str) -> Result<()> {
        let profile = lookup(&self.catalog, name)?.clone();
        info!("Switching model to {} ({})", profile.name, profile.family);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = profile;
        Ok(())
    }

    pub fn set_rate_limit_enabled(&self, enabled: bool) {
        self.limiter().set_enabled(enabled);
    }

    pub fn rate_limit_enabled(&self) -> bool {
        self.limiter().is_enabled()
    }

    pub fn rate_limit_usage(&self) -> [WindowUsage; 3] {
        self.limiter().usage()
    }

    fn limiter(&self) -> MutexGuard<'_, RateLimiter> {
        self.limiter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<()> {
        let mut limiter = self.limiter();
        match limiter.admit() {
            AdmitDecision::Allowed => {
                if limiter.is_enabled() {
                    let minute = limiter.usage_for(Window::Minute);
                    if minute.remaining() <= LOW_QUOTA_WARNING {
                        warn!("Only {} request(s) left in the current minute", minute.remaining());
                    }
                }
                Ok(())
            }
            AdmitDecision::Denied { window, retry_after } => {
                warn!("Rate limit hit on the {} window, retry in {:?}", window, retry_after);
                Err(Error::RateLimit { window, retry_after })
            }
        }
    }

    /// Sends `request` to the active model.
    ///
    /// The wire request is built and the rate limiter consulted before any
    /// network I/O. A call that later times out keeps its rate-limit slot.
    /// Provider failures are returned as-is, never retried.
    pub async fn dispatch(&self, request: &ChatRequest) -> Result<ChatResult> {
        let profile = self.active_profile();
        self.credentials.require(&profile.provider_id)?;
        let wire = adapters::build_wire_request(request, &profile, &self.credentials)?;

        self.admit()?;

        let started = Instant::now();
        let exchange = self
            .http
            .post_json(&wire.url, &wire.headers, &wire.body, self.request_timeout);
        let response = tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| Error::Timeout {
                timeout: self.request_timeout,
            })??;
        let latency = started.elapsed();

        info!(
            "{} ({}) answered with HTTP {} in {:?}",
            profile.name, profile.provider_id, response.status, latency
        );

        adapters::parse_wire_response(&profile, request.mode, response.status, &response.body, latency)
    }
}

fn lookup<'a>(catalog: &'a ProfileCatalog, name: &str) -> Result<&'a ProviderProfile> {
    catalog.get(name).ok_or_else(|| {
        Error::Config(format!(
            "unknown model '{}', available: {}",
            name,
            catalog.names().join(", ")
        ))
    })
}
