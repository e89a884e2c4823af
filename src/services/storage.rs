use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use url::Url;

/// Characters escaped inside one `/`-separated key segment.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Object-store adapter consumed by the lifecycle core.
///
/// Assets are addressed by their public id, which doubles as the object key.
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn delete_file(&self, public_id: &str) -> Result<()>;
    async fn file_exists(&self, public_id: &str) -> Result<bool>;
    /// Resolvable URL for a public id.
    fn public_url(&self, public_id: &str) -> String;
    /// Inverse of `public_url`: the public id a store URL points at, if it
    /// belongs to this store.
    fn resolve_public_id(&self, url: &str) -> Option<String>;
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3StorageService {
    pub fn new(client: Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Percent-encodes a key for use in a URL path, keeping its `/` separators.
pub fn encode_key(public_id: &str) -> String {
    public_id
        .split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Extracts the key from either `{base}/{key}` or a path-style
/// `{host}/{bucket}/{key}` URL. Query strings and fragments are ignored,
/// and the key comes back percent-decoded.
pub fn extract_public_id(url: &str, public_base_url: &str, bucket: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path().trim_start_matches('/');

    let base_path = Url::parse(public_base_url)
        .ok()
        .filter(|base| base.host_str() == parsed.host_str())
        .map(|base| base.path().trim_matches('/').to_string())
        .unwrap_or_default();

    let key = if !base_path.is_empty() && path.starts_with(&format!("{}/", base_path)) {
        &path[base_path.len() + 1..]
    } else if let Some(rest) = path.strip_prefix(&format!("{}/", bucket)) {
        rest
    } else {
        path
    };

    if key.is_empty() {
        return None;
    }
    percent_decode_str(key)
        .decode_utf8()
        .ok()
        .map(|key| key.into_owned())
}

#[async_trait]
impl StorageService for S3StorageService {
    async fn delete_file(&self, public_id: &str) -> Result<()> {
        let res = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(public_id)
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 delete_object failed: bucket={}, key={}, error={:?}",
                self.bucket,
                public_id,
                e
            );
            return Err(e.into());
        }
        Ok(())
    }

    async fn file_exists(&self, public_id: &str) -> Result<bool> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(public_id)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow::anyhow!(service_error))
                }
            }
        }
    }

    fn public_url(&self, public_id: &str) -> String {
        format!("{}/{}", self.public_base_url, encode_key(public_id))
    }

    fn resolve_public_id(&self, url: &str) -> Option<String> {
        extract_public_id(url, &self.public_base_url, &self.bucket)
    }
}
