//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::payments::StripeService;
use crate::signals::{DeliveryLedger, Dispatcher, SignalCounter};
use crate::store::{NotionProjectStore, ProjectStore};
use crate::util::rate_limit::{create_limiter, Limiter};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ProjectStore>,
    pub stripe: StripeService,
    pub dispatcher: Dispatcher,
    pub checkout_limiter: Arc<Limiter>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(NotionProjectStore::new(&config));
        Self::with_store(config, store)
    }

    /// Build state around an explicit project store
    pub fn with_store(config: Config, store: Arc<dyn ProjectStore>) -> Self {
        let config = Arc::new(config);

        // Initialize Stripe
        let stripe = StripeService::new(&config);

        // Webhook dispatch: ledger of handled events plus the counter it feeds
        let ledger = Arc::new(DeliveryLedger::new(config.dedup_ttl));
        let dispatcher = Dispatcher::new(SignalCounter::new(store.clone()), ledger);

        let checkout_limiter = create_limiter(config.checkout_rate_limit);

        Self {
            config,
            store,
            stripe,
            dispatcher,
            checkout_limiter,
        }
    }
}
