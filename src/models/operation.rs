use serde::{Deserialize, Serialize};
use strum::Display;

/// Status of a remote generation operation.
///
/// Unrecognized wire values decode to `Unknown` rather than failing; the
/// orchestrator keeps polling through `Unknown` until its attempt budget
/// runs out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationStatus {
    Created,
    InProgress,
    Success,
    Failed,
    Aborted,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl OperationStatus {
    /// True for statuses from which the operation makes no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Success
                | OperationStatus::Failed
                | OperationStatus::Aborted
                | OperationStatus::Cancelled
        )
    }
}

/// A server-side generation job, as returned by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnOperation {
    pub id: String,
    pub status: OperationStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub generated_images: Vec<GeneratedImage>,
}

/// Reference to one generated output image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
}

impl GeneratedImage {
    /// Stable identifier for the image: the server id when present,
    /// otherwise the download URL.
    pub fn identifier(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.url)
    }
}

/// Handle to a photo the server has accepted for generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub id: String,
    pub url: String,
}

/// Request body for starting a generation operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOperationRequest {
    pub uploaded_image_id: String,
    pub product_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_profile: Option<BodyProfile>,
}

/// Optional survey data for size-recommendation variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BodyProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<u32>,
}
