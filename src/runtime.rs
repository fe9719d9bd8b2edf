//! Blocking bridge for the async SDK backends.
//!
//! The stores expose blocking `save`/`load`; backends built on async
//! clients (AWS SDK, sqlx) own a small multi-threaded runtime and block on
//! each request. Callers must not invoke these stores from inside another
//! async runtime.

use std::future::Future;

use crate::error::StoreError;

pub struct BlockingRuntime {
    runtime: tokio::runtime::Runtime,
}

impl BlockingRuntime {
    pub fn new(backend: &'static str) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name(format!("warden-{}", backend))
            .enable_all()
            .build()
            .map_err(|e| StoreError::unavailable(backend, format!("start runtime: {}", e)))?;
        Ok(Self { runtime })
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Shared AWS client configuration for a region.
#[cfg(any(feature = "s3", feature = "dynamodb", feature = "rekognition"))]
pub fn aws_config(runtime: &BlockingRuntime, region: &str) -> aws_config::SdkConfig {
    let region = aws_config::Region::new(region.to_string());
    runtime.block_on(
        aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region)
            .load(),
    )
}
