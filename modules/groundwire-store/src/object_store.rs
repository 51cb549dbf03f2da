//! S3-compatible bucket access for raw scrape files and archived media.

use std::collections::HashSet;

use s3::creds::Credentials;
use s3::{Bucket, Region};
use tracing::debug;

use crate::error::{Result, StoreError};

#[derive(Clone)]
pub struct ObjectStore {
    bucket: Box<Bucket>,
    public_base_url: String,
}

impl ObjectStore {
    /// Open one bucket against a custom S3 endpoint (R2, minio, AWS).
    pub fn open(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
        public_base_url: &str,
    ) -> Result<Self> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        };
        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)?;
        let bucket = Bucket::new(bucket_name, region, credentials)?.with_path_style();

        Ok(Self {
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn name(&self) -> String {
        self.bucket.name()
    }

    /// Stable public URL for a key, whether or not it exists yet.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// All keys under a prefix. `processed/` subtrees can be excluded by
    /// the caller; this lists everything.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let pages = self.bucket.list(prefix.to_string(), None).await?;
        let mut keys = Vec::new();
        for page in pages {
            keys.extend(page.contents.into_iter().map(|o| o.key));
        }
        Ok(keys)
    }

    /// Key set for duplicate-upload short-circuiting, loaded once at the
    /// start of a media run.
    pub async fn key_set(&self) -> Result<HashSet<String>> {
        Ok(self.list_keys("").await?.into_iter().collect())
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self.bucket.get_object(key).await?;
        if response.status_code() != 200 {
            return Err(StoreError::ObjectStore(format!(
                "get {key}: status {}",
                response.status_code()
            )));
        }
        Ok(response.bytes().to_vec())
    }

    /// Upload bytes and return the public URL. If the key is known to
    /// already exist, skip the upload and return the canonical URL.
    pub async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        existing: Option<&HashSet<String>>,
    ) -> Result<String> {
        if let Some(existing) = existing {
            if existing.contains(key) {
                debug!(key, "object already stored, skipping upload");
                return Ok(self.public_url(key));
            }
        }

        self.bucket
            .put_object_with_content_type(key, bytes, content_type)
            .await?;
        Ok(self.public_url(key))
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.bucket.delete_object(key).await?;
        Ok(())
    }

    /// Server-side copy within the bucket (archive to `processed/`).
    pub async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.bucket.copy_object_internal(from, to).await?;
        Ok(())
    }
}
