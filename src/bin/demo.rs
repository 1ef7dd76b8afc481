use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tryon_sdk::{
    config::{ApiConfig, AppConfig},
    models::tryon::{PhotoSource, TryOnRequest},
    sdk::TryOnSdk,
    services::{auth::AuthStrategy, storage::FileStore},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("Usage: tryon-demo <photo-path> <product-id> [<product-id> ...]");
        std::process::exit(2);
    }
    let photo_path = Path::new(&args[0]);
    let product_ids = args[1..].to_vec();

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    let photo = std::fs::read(photo_path).expect("Failed to read photo");
    let file_name = photo_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo.jpg".to_string());

    // Initialize services
    tracing::info!(store_path = %config.store_path, "Initializing try-on SDK");
    let store = Arc::new(FileStore::open(&config.store_path).expect("Failed to open local store"));
    let sdk = TryOnSdk::new(
        ApiConfig::new(
            &config.base_url,
            AuthStrategy::ApiKey {
                api_key: config.api_key.clone(),
            },
        ),
        store,
    )
    .expect("Failed to initialize SDK");

    // Refresh remote configuration; defaults apply if this fails.
    sdk.load_subscription().await;
    let details = sdk.subscription_details();
    tracing::info!(
        photo_upload = details.retry_counts.photo_upload,
        operation_start = details.retry_counts.operation_start,
        operation_status = details.retry_counts.operation_status,
        result_download = details.retry_counts.result_download,
        "Using retry budgets"
    );

    let (mut status, handle) = sdk.start_try_on(TryOnRequest {
        product_ids,
        photo: PhotoSource::Bytes {
            data: photo,
            file_name,
        },
        body_profile: None,
    });

    let progress = tokio::spawn(async move {
        while let Some(hint) = status.recv().await {
            tracing::info!(status = %hint, "Try-on progress");
        }
    });

    match handle.await.expect("Invocation task panicked") {
        Ok(outcome) => {
            for (index, result) in outcome.results.iter().enumerate() {
                let path = format!("tryon-result-{}.jpg", index);
                std::fs::write(&path, &result.image_bytes).expect("Failed to write result image");
                tracing::info!(id = %result.id, path = %path, "Saved generated image");
            }
            tracing::info!(
                results = outcome.results.len(),
                upload_ms = outcome.stats.upload_duration.as_millis() as u64,
                try_on_ms = outcome.stats.try_on_duration.as_millis() as u64,
                download_ms = outcome.stats.download_duration.as_millis() as u64,
                total_ms = outcome.stats.total().as_millis() as u64,
                "Try-on completed"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Try-on failed");
            std::process::exit(1);
        }
    }

    let _ = progress.await;
}
