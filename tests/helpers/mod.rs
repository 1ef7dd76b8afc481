//! Scripted mock of the try-on service for pipeline tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tryon_sdk::models::operation::{
    CreateOperationRequest, GeneratedImage, OperationStatus, TryOnOperation, UploadedImage,
};
use tryon_sdk::models::subscription::{RetryCounts, SubscriptionDetails};
use tryon_sdk::models::tryon::{PhotoSource, TryOnRequest};
use tryon_sdk::services::api::{
    ApiError, SubscriptionFetch, SubscriptionSource, TryOnApi,
};
use tryon_sdk::services::orchestrator::Orchestrator;
use tryon_sdk::services::storage::{KeyValueStore, MemoryStore};
use tryon_sdk::services::subscription::{SubscriptionCache, DETAILS_KEY};

/// Always-fail marker for the leading-failure counters.
pub const ALWAYS: u32 = u32::MAX;

/// One scripted response of the status endpoint. An exhausted script keeps
/// answering `in_progress`.
pub enum PollStep {
    Status(OperationStatus),
    Operation(TryOnOperation),
    TransportError,
}

pub fn success_with(images: Vec<GeneratedImage>) -> PollStep {
    PollStep::Operation(TryOnOperation {
        id: "op-1".to_string(),
        status: OperationStatus::Success,
        error: None,
        generated_images: images,
    })
}

pub fn terminal_with_error(status: OperationStatus, message: &str) -> PollStep {
    PollStep::Operation(TryOnOperation {
        id: "op-1".to_string(),
        status,
        error: Some(message.to_string()),
        generated_images: Vec::new(),
    })
}

pub fn image(id: &str) -> GeneratedImage {
    GeneratedImage {
        id: Some(id.to_string()),
        url: format!("https://cdn.example.com/{}.jpg", id),
    }
}

/// Scripted behavior and call counters for one test run.
#[derive(Default)]
pub struct MockState {
    pub upload_failures: u32,
    pub upload_unauthorized: bool,
    pub start_failures: u32,
    pub download_failures: u32,
    pub poll_script: Mutex<VecDeque<PollStep>>,

    pub upload_calls: AtomicU32,
    pub start_calls: AtomicU32,
    pub poll_calls: AtomicU32,
    pub download_calls: AtomicU32,
    pub last_create: Mutex<Option<CreateOperationRequest>>,
}

impl MockState {
    pub fn with_poll_script(script: Vec<PollStep>) -> Self {
        Self {
            poll_script: Mutex::new(script.into()),
            ..Self::default()
        }
    }
}

/// Cheap-clone handle over shared mock state, standing in for the real
/// API client.
#[derive(Clone)]
pub struct MockApi {
    state: Arc<MockState>,
}

impl MockApi {
    pub fn new(state: MockState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> &MockState {
        &self.state
    }
}

fn transient() -> ApiError {
    ApiError::Status {
        status: 503,
        message: "overloaded".to_string(),
    }
}

impl TryOnApi for MockApi {
    async fn upload_photo(&self, _image: &[u8], _file_name: &str) -> Result<UploadedImage, ApiError> {
        let attempt = self.state.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.upload_unauthorized {
            return Err(ApiError::Authorization("token rejected".to_string()));
        }
        if attempt < self.state.upload_failures {
            return Err(transient());
        }
        Ok(UploadedImage {
            id: "upl-1".to_string(),
            url: "https://cdn.example.com/upl-1.jpg".to_string(),
        })
    }

    async fn create_operation(&self, request: &CreateOperationRequest) -> Result<String, ApiError> {
        let attempt = self.state.start_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.last_create.lock().unwrap() = Some(request.clone());
        if attempt < self.state.start_failures {
            return Err(transient());
        }
        Ok("op-1".to_string())
    }

    async fn fetch_operation(&self, operation_id: &str) -> Result<TryOnOperation, ApiError> {
        self.state.poll_calls.fetch_add(1, Ordering::SeqCst);
        match self.state.poll_script.lock().unwrap().pop_front() {
            Some(PollStep::Status(status)) => Ok(TryOnOperation {
                id: operation_id.to_string(),
                status,
                error: None,
                generated_images: Vec::new(),
            }),
            Some(PollStep::Operation(operation)) => Ok(operation),
            Some(PollStep::TransportError) => Err(transient()),
            None => Ok(TryOnOperation {
                id: operation_id.to_string(),
                status: OperationStatus::InProgress,
                error: None,
                generated_images: Vec::new(),
            }),
        }
    }

    async fn download_image(&self, _url: &str) -> Result<Vec<u8>, ApiError> {
        let attempt = self.state.download_calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.state.download_failures {
            return Err(transient());
        }
        Ok(vec![0xFF, 0xD8, 0xFF, 0xE0])
    }
}

impl SubscriptionSource for MockApi {
    async fn fetch_subscription(&self, _etag: Option<&str>) -> Result<SubscriptionFetch, ApiError> {
        Ok(SubscriptionFetch::NotModified)
    }
}

/// Subscription document with the given budgets and the default schedule.
pub fn details_with_counts(counts: RetryCounts) -> SubscriptionDetails {
    SubscriptionDetails {
        retry_counts: counts,
        ..SubscriptionDetails::default()
    }
}

/// Build an orchestrator whose config cache was rehydrated from `details`.
pub fn orchestrator_with(
    details: &SubscriptionDetails,
    state: MockState,
) -> (MockApi, Orchestrator<MockApi>) {
    let api = MockApi::new(state);

    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    store
        .set(DETAILS_KEY, &serde_json::to_string(details).unwrap())
        .unwrap();

    let cache = SubscriptionCache::new(api.clone(), store);
    let orchestrator = Orchestrator::new(Arc::new(api.clone()), cache);
    (api, orchestrator)
}

/// Minimal JPEG header accepted by the photo format sniff.
pub fn jpeg_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0]
}

pub fn request(products: &[&str]) -> TryOnRequest {
    TryOnRequest {
        product_ids: products.iter().map(|p| p.to_string()).collect(),
        photo: PhotoSource::Bytes {
            data: jpeg_bytes(),
            file_name: "photo.jpg".to_string(),
        },
        body_profile: None,
    }
}
