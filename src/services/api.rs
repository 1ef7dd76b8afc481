use reqwest::{multipart, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::models::operation::{CreateOperationRequest, TryOnOperation, UploadedImage};
use crate::models::subscription::SubscriptionDetails;
use crate::services::auth::{AuthError, AuthStrategy};

const UPLOADED_IMAGES_PATH: &str = "/uploaded_images";
const OPERATIONS_PATH: &str = "/try_on_operations";
const SUBSCRIPTION_PATH: &str = "/subscription_details";

/// The four stage operations of the try-on pipeline. Each is a single
/// network call; retry policy lives with the orchestrator, not here.
///
/// The trait exists so tests can script responses without a server.
pub trait TryOnApi: Send + Sync {
    /// Upload a user photo, returning the server-side handle. Secure call.
    fn upload_photo(
        &self,
        image: &[u8],
        file_name: &str,
    ) -> impl Future<Output = Result<UploadedImage, ApiError>> + Send;

    /// Start a generation job, returning the operation identifier. Secure
    /// call; not idempotent on the server side.
    fn create_operation(
        &self,
        request: &CreateOperationRequest,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    /// Fetch the current snapshot of a generation job.
    fn fetch_operation(
        &self,
        operation_id: &str,
    ) -> impl Future<Output = Result<TryOnOperation, ApiError>> + Send;

    /// Download one generated image by its absolute URL.
    fn download_image(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, ApiError>> + Send;
}

/// Outcome of a conditional subscription fetch.
#[derive(Debug)]
pub enum SubscriptionFetch {
    /// Server confirmed the cached document is still current.
    NotModified,
    /// A new document, with the validator to store for the next fetch.
    New {
        details: SubscriptionDetails,
        etag: Option<String>,
    },
}

/// Conditional fetch of the remote configuration document.
pub trait SubscriptionSource: Send + Sync {
    fn fetch_subscription(
        &self,
        etag: Option<&str>,
    ) -> impl Future<Output = Result<SubscriptionFetch, ApiError>> + Send;
}

#[derive(Debug, Deserialize)]
struct CreatedOperation {
    id: String,
}

/// Client for the try-on generation service.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: AuthStrategy,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ApiError::Http)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: config.auth,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach auth headers and send. 401/403 map to the non-retriable
    /// authorization error regardless of which stage issued the call.
    async fn send(
        &self,
        mut builder: reqwest::RequestBuilder,
        secure: bool,
    ) -> Result<reqwest::Response, ApiError> {
        for (name, value) in self.auth.headers(secure).await? {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Authorization(format!(
                "HTTP {} from {}",
                status.as_u16(),
                response.url()
            )));
        }

        Ok(response)
    }
}

/// Reject non-success responses, preserving the body for diagnostics.
async fn require_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), url = %url, "Request rejected by server");

    Err(ApiError::Status {
        status: status.as_u16(),
        message: body,
    })
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl TryOnApi for ApiClient {
    async fn upload_photo(&self, image: &[u8], file_name: &str) -> Result<UploadedImage, ApiError> {
        debug!(bytes = image.len(), file_name, "Uploading photo");

        let part = multipart::Part::bytes(image.to_vec()).file_name(file_name.to_string());
        let form = multipart::Form::new().part("image", part);

        let response = self
            .send(
                self.http
                    .post(self.endpoint(UPLOADED_IMAGES_PATH))
                    .multipart(form),
                true,
            )
            .await?;

        decode_json(require_success(response).await?).await
    }

    async fn create_operation(&self, request: &CreateOperationRequest) -> Result<String, ApiError> {
        debug!(
            products = request.product_ids.len(),
            uploaded_image_id = %request.uploaded_image_id,
            "Starting generation operation"
        );

        let response = self
            .send(
                self.http.post(self.endpoint(OPERATIONS_PATH)).json(request),
                true,
            )
            .await?;

        let created: CreatedOperation = decode_json(require_success(response).await?).await?;
        Ok(created.id)
    }

    async fn fetch_operation(&self, operation_id: &str) -> Result<TryOnOperation, ApiError> {
        let url = format!("{}/{}", self.endpoint(OPERATIONS_PATH), operation_id);
        let response = self.send(self.http.get(url), false).await?;
        decode_json(require_success(response).await?).await
    }

    async fn download_image(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        // Generated images live on plain HTTPS URLs; no auth headers.
        let response = self.http.get(url).send().await?;
        let response = require_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl SubscriptionSource for ApiClient {
    async fn fetch_subscription(&self, etag: Option<&str>) -> Result<SubscriptionFetch, ApiError> {
        let mut builder = self.http.get(self.endpoint(SUBSCRIPTION_PATH));
        if let Some(etag) = etag {
            builder = builder.header("if-none-match", etag);
        }

        let response = self.send(builder, false).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("Subscription document unchanged");
            return Ok(SubscriptionFetch::NotModified);
        }

        let response = require_success(response).await?;
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let details = decode_json(response).await?;

        Ok(SubscriptionFetch::New { details, etag })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("authorization failed: {0}")]
    Authorization(String),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Authorization(e.to_string())
    }
}
