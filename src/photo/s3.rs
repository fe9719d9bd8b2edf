//! Object-storage photo store on S3 (feature `s3`).

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use image::RgbImage;

use super::{content_type_for_key, decode_stored, encode_for_key, store_key, PhotoRef, PhotoStore};
use crate::error::StoreError;
use crate::runtime::{aws_config, BlockingRuntime};

const BACKEND: &str = "s3";

pub struct S3PhotoStore {
    runtime: BlockingRuntime,
    client: Client,
    bucket: String,
}

impl S3PhotoStore {
    pub fn connect(bucket: &str, region: &str) -> Result<Self, StoreError> {
        if bucket.trim().is_empty() {
            return Err(StoreError::unavailable(BACKEND, "bucket name is empty"));
        }
        let runtime = BlockingRuntime::new(BACKEND)?;
        let config = aws_config(&runtime, region);
        log::info!("s3 photo store: bucket={} region={}", bucket, region);
        Ok(Self {
            client: Client::new(&config),
            runtime,
            bucket: bucket.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl PhotoStore for S3PhotoStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn save(&self, image: &RgbImage, key: &str) -> Result<String, StoreError> {
        let key = store_key(key)?;
        let bytes = encode_for_key(image, &key)?;
        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .content_type(content_type_for_key(&key))
                    .body(ByteStream::from(bytes))
                    .send(),
            )
            .map_err(|e| StoreError::unavailable(BACKEND, format!("put {}: {}", key, e)))?;
        log::debug!("saved s3://{}/{}", self.bucket, key);
        Ok(key)
    }

    fn load(&self, key: &str) -> Result<RgbImage, StoreError> {
        let key = store_key(key)?;
        let bytes = self.runtime.block_on(async {
            let output = match self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    let missing = e
                        .as_service_error()
                        .map(|service| service.is_no_such_key())
                        .unwrap_or(false);
                    return Err(if missing {
                        StoreError::PhotoNotFound(key.clone())
                    } else {
                        StoreError::unavailable(BACKEND, format!("get {}: {}", key, e))
                    });
                }
            };
            output
                .body
                .collect()
                .await
                .map(|data| data.into_bytes())
                .map_err(|e| StoreError::unavailable(BACKEND, format!("read {}: {}", key, e)))
        })?;
        decode_stored(&bytes)
    }

    fn locate(&self, key: &str) -> Result<PhotoRef, StoreError> {
        Ok(PhotoRef::Object {
            bucket: self.bucket.clone(),
            key: store_key(key)?,
        })
    }
}
