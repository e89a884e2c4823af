use crate::services::storage::S3StorageService;
use aws_sdk_s3::config::Region;
use std::env;
use std::sync::Arc;
use tracing::info;

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("{} must be set", name))
}

pub async fn setup_storage() -> anyhow::Result<Arc<S3StorageService>> {
    let endpoint_url = required("MINIO_ENDPOINT")?;
    let access_key = required("MINIO_ACCESS_KEY")?;
    let secret_key = required("MINIO_SECRET_KEY")?;
    let bucket = required("MINIO_BUCKET")?;
    // Base used to build resolvable URLs; defaults to path-style on the endpoint.
    let public_base_url =
        env::var("ASSET_PUBLIC_BASE_URL").unwrap_or_else(|_| format!("{}/{}", endpoint_url, bucket));

    info!("☁️  S3 Storage: {} (Bucket: {})", endpoint_url, bucket);

    let aws_config = aws_config::from_env()
        .endpoint_url(&endpoint_url)
        .region(Region::new("us-east-1"))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    match s3_client.head_bucket().bucket(&bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
        Err(e) => tracing::warn!("⚠️ Bucket '{}' is not reachable yet: {}", bucket, e),
    }

    Ok(Arc::new(S3StorageService::new(
        s3_client,
        bucket,
        public_base_url,
    )))
}
