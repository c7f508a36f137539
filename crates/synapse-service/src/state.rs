//! Application state.

use std::sync::Arc;

use synapse_core::{Clock, PlanAuthority, ResetPolicy, SystemClock};
use synapse_store::Store;

use crate::auth::{IdentityResolver, JwtIdentity};
use crate::config::ServiceConfig;
use crate::ledger::CreditService;
use crate::providers::{GenerativeProvider, HttpProvider};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Deduction and status.
    pub credits: CreditService,

    /// Bearer token resolution.
    pub identity: Arc<dyn IdentityResolver>,

    /// Chat/image provider (optional).
    pub provider: Option<Arc<dyn GenerativeProvider>>,

    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create the production state: system clock, JWT identity and the HTTP
    /// provider when both provider keys are configured.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let provider = config
            .groq_api_key
            .as_ref()
            .zip(config.clipdrop_api_key.as_ref())
            .and_then(|(groq, clipdrop)| match HttpProvider::new(groq, clipdrop) {
                Ok(provider) => {
                    tracing::info!("Generative provider enabled");
                    Some(Arc::new(provider) as Arc<dyn GenerativeProvider>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create generative provider");
                    None
                }
            });

        if provider.is_none() {
            tracing::warn!("GROQ_API_KEY/CLIPDROP_API_KEY not configured - chat and image disabled");
        }

        Self::from_parts(store, config, Arc::new(SystemClock), provider)
    }

    /// Assemble the state from explicit collaborators.
    #[must_use]
    pub fn from_parts(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
        provider: Option<Arc<dyn GenerativeProvider>>,
    ) -> Self {
        let credits = CreditService::new(
            Arc::clone(&store),
            PlanAuthority::new(config.allowances),
            ResetPolicy::new(config.allowances, config.watermark_mode),
            Arc::clone(&clock),
            config.status_missing_ledger,
        );
        let identity = Arc::new(JwtIdentity::new(
            config.auth_secret.as_deref(),
            Arc::clone(&store),
            Arc::clone(&clock),
        ));

        Self {
            store,
            config,
            credits,
            identity,
            provider,
            clock,
        }
    }

    /// Check if a generative provider is configured.
    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }
}
