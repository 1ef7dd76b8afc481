use garde::Validate;
use serde::Serialize;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use strum::Display;

use crate::models::operation::{BodyProfile, UploadedImage};

/// Photo input for a try-on invocation.
#[derive(Debug, Clone)]
pub enum PhotoSource {
    /// Raw image bytes to upload, with the file name for the multipart part.
    Bytes { data: Vec<u8>, file_name: String },
    /// A photo the server already holds; the upload phase is skipped and
    /// its duration stays at zero.
    Uploaded(UploadedImage),
}

/// Request to generate try-on images for a set of products.
#[derive(Debug, Clone, Validate)]
pub struct TryOnRequest {
    #[garde(length(min = 1))]
    pub product_ids: Vec<String>,

    #[garde(skip)]
    pub photo: PhotoSource,

    #[garde(skip)]
    pub body_profile: Option<BodyProfile>,
}

/// Coarse progress hints forwarded to the UI layer while an invocation
/// runs. These are display states, not orchestrator substates.
#[derive(Debug, Clone, Copy, Serialize, Display, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "snake_case")]
pub enum TryOnStatus {
    UploadingImage,
    ImageUploaded,
    ScanningBody,
    GeneratingOutfit,
}

/// One generated try-on image, downloaded and ready for display.
///
/// Two results are the same result when their identifiers match, whatever
/// the other fields say.
#[derive(Debug, Clone, Eq)]
pub struct TryOnResult {
    pub id: String,
    pub image_url: String,
    pub image_bytes: Vec<u8>,
    pub product_ids: Vec<String>,
}

impl PartialEq for TryOnResult {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for TryOnResult {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Per-phase timing for one invocation. A skipped phase leaves its
/// duration at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TryOnStats {
    pub upload_duration: Duration,
    pub try_on_duration: Duration,
    pub download_duration: Duration,
}

impl TryOnStats {
    pub fn total(&self) -> Duration {
        self.upload_duration + self.try_on_duration + self.download_duration
    }
}

/// Final output of a successful invocation.
#[derive(Debug, Clone)]
pub struct TryOnOutcome {
    pub results: Vec<TryOnResult>,
    pub stats: TryOnStats,
}
