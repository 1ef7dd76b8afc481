use garde::Validate;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::operation::{CreateOperationRequest, OperationStatus};
use crate::models::tryon::{
    PhotoSource, TryOnOutcome, TryOnRequest, TryOnResult, TryOnStats, TryOnStatus,
};
use crate::services::api::{ApiError, TryOnApi};
use crate::services::delays::DelaySequence;
use crate::services::subscription::SubscriptionCache;

type InvocationRegistry = Arc<Mutex<HashMap<Uuid, CancellationToken>>>;

/// Sequences the try-on pipeline: upload, start, poll, download.
///
/// Retry budgets and the polling cadence come from the subscription cache
/// at the start of each invocation, so server-side config updates take
/// effect without a restart. Each invocation runs as one cooperative task
/// and registers a cancellation token so `abort_all()` can interrupt it at
/// its next suspension point.
pub struct Orchestrator<A> {
    api: Arc<A>,
    subscription: SubscriptionCache<A>,
    invocations: InvocationRegistry,
}

impl<A: TryOnApi> Orchestrator<A> {
    pub fn new(api: Arc<A>, subscription: SubscriptionCache<A>) -> Self {
        Self {
            api,
            subscription,
            invocations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cancel every in-flight invocation. Each resolves with the
    /// `Terminate` kind at its next suspension point and issues no further
    /// network calls.
    pub fn abort_all(&self) {
        let invocations = self
            .invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        info!(invocations = invocations.len(), "Aborting all try-on invocations");
        for token in invocations.values() {
            token.cancel();
        }
    }

    /// Run one try-on invocation to completion, emitting coarse progress
    /// hints through `status` along the way.
    pub async fn run(
        &self,
        request: TryOnRequest,
        status: mpsc::UnboundedSender<TryOnStatus>,
    ) -> Result<TryOnOutcome, TryOnError> {
        request
            .validate()
            .map_err(|e| TryOnError::InternalSdk(format!("invalid try-on request: {}", e)))?;

        let invocation_id = Uuid::new_v4();
        let token = CancellationToken::new();
        {
            let mut invocations = self
                .invocations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            invocations.insert(invocation_id, token.clone());
        }
        let _guard = InvocationGuard {
            invocations: Arc::clone(&self.invocations),
            id: invocation_id,
        };

        info!(
            invocation_id = %invocation_id,
            products = request.product_ids.len(),
            "Starting try-on invocation"
        );

        let details = self.subscription.details();
        let counts = details.retry_counts.clone();
        let schedule = details.delay_schedule();

        let mut stats = TryOnStats::default();

        // ── Phase 1: Upload ──────────────────────────────────────────────
        let uploaded = match &request.photo {
            PhotoSource::Uploaded(handle) => {
                debug!(invocation_id = %invocation_id, image_id = %handle.id, "Photo already uploaded, skipping upload phase");
                handle.clone()
            }
            PhotoSource::Bytes { data, file_name } => {
                image::guess_format(data)
                    .map_err(|e| TryOnError::PreparePhoto(e.to_string()))?;

                let _ = status.send(TryOnStatus::UploadingImage);
                let upload_started = Instant::now();

                let uploaded = cancellable(
                    &token,
                    with_attempts(counts.photo_upload, "photo_upload", || {
                        self.api.upload_photo(data, file_name)
                    }),
                )
                .await?
                .map_err(|e| phase_error(e, TryOnError::UploadPhoto))?;

                stats.upload_duration = upload_started.elapsed();
                let _ = status.send(TryOnStatus::ImageUploaded);
                uploaded
            }
        };

        // ── Phase 2: Start operation ─────────────────────────────────────
        let _ = status.send(TryOnStatus::ScanningBody);
        let create_request = CreateOperationRequest {
            uploaded_image_id: uploaded.id.clone(),
            product_ids: request.product_ids.clone(),
            body_profile: request.body_profile.clone(),
        };

        let operation_id = cancellable(
            &token,
            with_attempts(counts.operation_start, "operation_start", || {
                self.api.create_operation(&create_request)
            }),
        )
        .await?
        .map_err(|e| phase_error(e, TryOnError::StartOperation))?;

        let generation_started = Instant::now();
        let _ = status.send(TryOnStatus::GeneratingOutfit);
        info!(invocation_id = %invocation_id, operation_id = %operation_id, "Generation operation started");

        // ── Phase 3: Poll to a terminal status ───────────────────────────
        // Every poll call, successful or not, consumes one unit of the
        // operation_status budget.
        let mut delays = DelaySequence::new(schedule);
        delays.reset();
        let max_attempts = counts.operation_status.saturating_add(1);
        let mut terminal = None;

        for attempt in 1..=max_attempts {
            let delay = delays.next_delay().ok_or_else(|| {
                TryOnError::InternalSdk("operation delay schedule ran dry".to_string())
            })?;
            cancellable(&token, sleep(delay)).await?;

            match cancellable(&token, self.api.fetch_operation(&operation_id)).await? {
                Ok(operation) => {
                    debug!(
                        invocation_id = %invocation_id,
                        attempt,
                        max_attempts,
                        operation_status = %operation.status,
                        "Polled operation"
                    );
                    if operation.status.is_terminal() {
                        terminal = Some(operation);
                        break;
                    }
                }
                Err(ApiError::Authorization(message)) => {
                    return Err(TryOnError::Authorization(message));
                }
                Err(e) => {
                    warn!(invocation_id = %invocation_id, attempt, error = %e, "Poll attempt failed");
                }
            }
        }

        stats.try_on_duration = generation_started.elapsed();

        let operation = terminal.ok_or(TryOnError::OperationTimeout {
            attempts: max_attempts,
        })?;

        match operation.status {
            OperationStatus::Success => {}
            OperationStatus::Aborted => {
                return Err(TryOnError::Abort {
                    message: operation.error,
                });
            }
            _ => {
                return Err(TryOnError::OperationFailed {
                    message: operation.error,
                });
            }
        }

        // ── Phase 4: Download results ────────────────────────────────────
        if operation.generated_images.is_empty() {
            return Err(TryOnError::EmptyResults);
        }

        let download_started = Instant::now();
        let mut results = Vec::with_capacity(operation.generated_images.len());

        for image in &operation.generated_images {
            let bytes = cancellable(
                &token,
                with_attempts(counts.result_download, "result_download", || {
                    self.api.download_image(&image.url)
                }),
            )
            .await?
            .map_err(|e| phase_error(e, TryOnError::DownloadResult))?;

            results.push(TryOnResult {
                id: image.identifier().to_string(),
                image_url: image.url.clone(),
                image_bytes: bytes,
                product_ids: request.product_ids.clone(),
            });
        }

        stats.download_duration = download_started.elapsed();

        info!(
            invocation_id = %invocation_id,
            results = results.len(),
            upload_ms = stats.upload_duration.as_millis() as u64,
            try_on_ms = stats.try_on_duration.as_millis() as u64,
            download_ms = stats.download_duration.as_millis() as u64,
            "Try-on invocation completed"
        );

        Ok(TryOnOutcome { results, stats })
    }
}

/// Removes the invocation's cancellation token from the registry on every
/// exit path, including panics and cancellation.
struct InvocationGuard {
    invocations: InvocationRegistry,
    id: Uuid,
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        let mut invocations = self
            .invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        invocations.remove(&self.id);
    }
}

/// Race a pipeline step against the invocation's cancellation token.
async fn cancellable<F: Future>(
    token: &CancellationToken,
    step: F,
) -> Result<F::Output, TryOnError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(TryOnError::Terminate),
        output = step => Ok(output),
    }
}

/// Run one stage call with up to `budget` immediate retries on transient
/// failure. Authorization failures are never retried.
async fn with_attempts<T, F, Fut>(budget: u32, phase: &'static str, mut call: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(e @ ApiError::Authorization(_)) => return Err(e),
            Err(e) if attempt > budget => return Err(e),
            Err(e) => {
                warn!(phase, attempt, budget, error = %e, "Attempt failed, retrying");
            }
        }
    }
}

fn phase_error(e: ApiError, wrap: fn(ApiError) -> TryOnError) -> TryOnError {
    match e {
        ApiError::Authorization(message) => TryOnError::Authorization(message),
        other => wrap(other),
    }
}

/// Failure taxonomy of a try-on invocation. The UI layer maps each kind to
/// a localized message; `Abort` and `Terminate` unwind silently.
#[derive(Debug, thiserror::Error)]
pub enum TryOnError {
    #[error("failed to prepare photo: {0}")]
    PreparePhoto(String),

    #[error("failed to upload photo: {0}")]
    UploadPhoto(#[source] ApiError),

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("failed to start operation: {0}")]
    StartOperation(#[source] ApiError),

    #[error("operation failed: {}", .message.as_deref().unwrap_or("no server message"))]
    OperationFailed { message: Option<String> },

    #[error("operation did not reach a terminal status within {attempts} poll attempts")]
    OperationTimeout { attempts: u32 },

    #[error("operation succeeded but produced no images")]
    EmptyResults,

    #[error("failed to download result: {0}")]
    DownloadResult(#[source] ApiError),

    #[error("internal SDK error: {0}")]
    InternalSdk(String),

    #[error("operation aborted: {}", .message.as_deref().unwrap_or("no usable subject"))]
    Abort { message: Option<String> },

    #[error("try-on invocation was terminated")]
    Terminate,

    #[error("unknown error: {0}")]
    Unknown(#[source] Box<dyn std::error::Error + Send + Sync>),
}
