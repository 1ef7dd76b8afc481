use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::models::subscription::SubscriptionDetails;
use crate::services::api::{ApiError, SubscriptionFetch, SubscriptionSource};
use crate::services::storage::{KeyValueStore, StoreError};

/// Storage key for the cached document. Distinct from the validator key.
pub const DETAILS_KEY: &str = "subscription.details";

/// Storage key for the ETag validator of the cached document.
pub const ETAG_KEY: &str = "subscription.etag";

/// Storage key for the schema version the cached document was written at.
pub const SCHEMA_VERSION_KEY: &str = "subscription.schema_version";

/// Schema version of the current document shape. Bumping this forces one
/// unconditional re-fetch on the next load, ignoring any stored validator.
const TARGET_SCHEMA_VERSION: u32 = 2;

/// Fixed wait between background retries of a failed load.
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Outcome signal of a `load()` cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// Freshness confirmed: either the document was unchanged or a new one
    /// was committed.
    Resolved,
    /// The fetch failed; a background retry is scheduled and the cached or
    /// default document stays in effect.
    FailedToResolve,
}

struct CacheInner<S> {
    source: S,
    store: Arc<dyn KeyValueStore>,
    details: RwLock<SubscriptionDetails>,
    load_gate: Mutex<()>,
    retry_pending: AtomicBool,
    events: broadcast::Sender<SubscriptionEvent>,
}

/// Local cache of the remote configuration document.
///
/// `details()` is synchronous and always answers: the last committed
/// document, or the hardcoded default before anything was ever fetched.
/// `load()` refreshes opportunistically and never surfaces a hard failure
/// to callers; a failed fetch retries in the background forever.
///
/// Cloning the cache is cheap and shares state, like the HTTP client.
pub struct SubscriptionCache<S> {
    inner: Arc<CacheInner<S>>,
}

impl<S> Clone for SubscriptionCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> SubscriptionCache<S> {
    /// Build the cache over a fetch source and a persistent store,
    /// rehydrating the last committed document if one exists.
    pub fn new(source: S, store: Arc<dyn KeyValueStore>) -> Self {
        let details = match store.get(DETAILS_KEY) {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(details) => details,
                Err(e) => {
                    warn!(error = %e, "Persisted subscription document is unreadable, using defaults");
                    SubscriptionDetails::default()
                }
            },
            Ok(None) => SubscriptionDetails::default(),
            Err(e) => {
                warn!(error = %e, "Could not read persisted subscription document, using defaults");
                SubscriptionDetails::default()
            }
        };

        let (events, _) = broadcast::channel(16);

        Self {
            inner: Arc::new(CacheInner {
                source,
                store,
                details: RwLock::new(details),
                load_gate: Mutex::new(()),
                retry_pending: AtomicBool::new(false),
                events,
            }),
        }
    }

    /// The current configuration document. Never blocks, never fails.
    pub fn details(&self) -> SubscriptionDetails {
        self.inner
            .details
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribe to load outcome signals.
    pub fn subscribe(&self) -> broadcast::Receiver<SubscriptionEvent> {
        self.inner.events.subscribe()
    }
}

impl<S> SubscriptionCache<S>
where
    S: SubscriptionSource + 'static,
{
    /// Refresh the cached document. Idempotent and safe to call on every
    /// app foreground; a call while another load is in flight no-ops (the
    /// pending load's outcome reaches all subscribers).
    pub async fn load(&self) {
        let Ok(_gate) = self.inner.load_gate.try_lock() else {
            debug!("Subscription load already in flight");
            return;
        };

        match self.load_inner().await {
            Ok(()) => {
                let _ = self.inner.events.send(SubscriptionEvent::Resolved);
            }
            Err(e) => {
                warn!(
                    error = %e,
                    backoff_secs = RETRY_BACKOFF.as_secs(),
                    "Failed to resolve subscription details, retrying in background"
                );
                let _ = self.inner.events.send(SubscriptionEvent::FailedToResolve);
                self.schedule_retry();
            }
        }
    }

    async fn load_inner(&self) -> Result<(), CacheError> {
        let stored_version = self
            .inner
            .store
            .get(SCHEMA_VERSION_KEY)?
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);

        // Version gate: a stale schema invalidates the validator so the
        // next fetch is unconditional, even if the remote is unchanged.
        let etag = if stored_version < TARGET_SCHEMA_VERSION {
            info!(
                stored_version,
                target_version = TARGET_SCHEMA_VERSION,
                "Subscription schema version is stale, forcing full re-fetch"
            );
            self.inner.store.remove(ETAG_KEY)?;
            None
        } else {
            self.inner.store.get(ETAG_KEY)?
        };

        match self.inner.source.fetch_subscription(etag.as_deref()).await? {
            SubscriptionFetch::NotModified => {
                debug!("Subscription details unchanged");
            }
            SubscriptionFetch::New { details, etag } => {
                self.inner
                    .store
                    .set(DETAILS_KEY, &serde_json::to_string(&details)?)?;
                match &etag {
                    Some(etag) => self.inner.store.set(ETAG_KEY, etag)?,
                    None => self.inner.store.remove(ETAG_KEY)?,
                }
                // Adopt the target version only once the document committed.
                self.inner
                    .store
                    .set(SCHEMA_VERSION_KEY, &TARGET_SCHEMA_VERSION.to_string())?;

                *self
                    .inner
                    .details
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = details;
                info!(etag = etag.as_deref().unwrap_or("-"), "Subscription details updated");
            }
        }

        Ok(())
    }

    fn schedule_retry(&self) {
        if self.inner.retry_pending.swap(true, Ordering::SeqCst) {
            return;
        }

        let cache = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RETRY_BACKOFF).await;
            cache.inner.retry_pending.store(false, Ordering::SeqCst);
            cache.load().await;
        });
    }
}

#[derive(Debug, thiserror::Error)]
enum CacheError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode subscription document: {0}")]
    Encode(#[from] serde_json::Error),
}
