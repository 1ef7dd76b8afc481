use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::ApiConfig;
use crate::models::subscription::SubscriptionDetails;
use crate::models::tryon::{TryOnOutcome, TryOnRequest, TryOnStatus};
use crate::services::api::{ApiClient, ApiError};
use crate::services::orchestrator::{Orchestrator, TryOnError};
use crate::services::storage::KeyValueStore;
use crate::services::subscription::{SubscriptionCache, SubscriptionEvent};

/// SDK entry point bundling the shared services handed to every
/// invocation.
#[derive(Clone)]
pub struct TryOnSdk {
    orchestrator: Arc<Orchestrator<ApiClient>>,
    subscription: SubscriptionCache<ApiClient>,
}

impl TryOnSdk {
    pub fn new(config: ApiConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, ApiError> {
        let api = ApiClient::new(config)?;
        let subscription = SubscriptionCache::new(api.clone(), store);
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(api), subscription.clone()));

        Ok(Self {
            orchestrator,
            subscription,
        })
    }

    /// Start a try-on invocation on its own task. Returns the stream of
    /// progress hints and the handle resolving to the final outcome.
    pub fn start_try_on(
        &self,
        request: TryOnRequest,
    ) -> (
        mpsc::UnboundedReceiver<TryOnStatus>,
        JoinHandle<Result<TryOnOutcome, TryOnError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::clone(&self.orchestrator);
        let handle = tokio::spawn(async move { orchestrator.run(request, tx).await });
        (rx, handle)
    }

    /// Run a try-on invocation to completion, discarding progress hints.
    pub async fn try_on(&self, request: TryOnRequest) -> Result<TryOnOutcome, TryOnError> {
        let (_status, handle) = self.start_try_on(request);
        handle
            .await
            .map_err(|e| TryOnError::Unknown(Box::new(e)))?
    }

    /// Cancel every in-flight invocation.
    pub fn abort_all(&self) {
        self.orchestrator.abort_all();
    }

    /// Refresh the remote configuration document. Safe to call on every
    /// app foreground; failures retry in the background.
    pub async fn load_subscription(&self) {
        self.subscription.load().await;
    }

    /// The current configuration document; never blocks.
    pub fn subscription_details(&self) -> SubscriptionDetails {
        self.subscription.details()
    }

    /// Subscribe to configuration load outcomes.
    pub fn subscription_events(&self) -> broadcast::Receiver<SubscriptionEvent> {
        self.subscription.subscribe()
    }
}
