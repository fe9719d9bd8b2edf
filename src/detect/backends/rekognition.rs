//! AWS Rekognition label detection (feature `rekognition`).
//!
//! Object references are passed as S3 objects; local photos are uploaded
//! inline as bytes.

use anyhow::{Context, Result};
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{Image, S3Object};
use aws_sdk_rekognition::Client;

use crate::detect::backend::Detector;
use crate::detect::result::DetectedInstance;
use crate::error::StoreError;
use crate::photo::PhotoRef;
use crate::runtime::{aws_config, BlockingRuntime};

pub struct RekognitionDetector {
    runtime: BlockingRuntime,
    client: Client,
    max_labels: i32,
}

impl RekognitionDetector {
    pub fn connect(region: &str, max_labels: i32) -> Result<Self, StoreError> {
        let runtime = BlockingRuntime::new("rekognition")?;
        let config = aws_config(&runtime, region);
        Ok(Self {
            client: Client::new(&config),
            runtime,
            max_labels,
        })
    }

    fn image_for(photo: &PhotoRef) -> Result<Image> {
        Ok(match photo {
            PhotoRef::Object { bucket, key } => Image::builder()
                .s3_object(S3Object::builder().bucket(bucket).name(key).build())
                .build(),
            PhotoRef::Local { path } => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("read {}", path.display()))?;
                Image::builder().bytes(Blob::new(bytes)).build()
            }
        })
    }
}

impl Detector for RekognitionDetector {
    fn name(&self) -> &'static str {
        "rekognition"
    }

    fn infer(&self, photo: &PhotoRef) -> Result<Vec<DetectedInstance>> {
        let image = Self::image_for(photo)?;
        let output = self
            .runtime
            .block_on(
                self.client
                    .detect_labels()
                    .image(image)
                    .max_labels(self.max_labels)
                    .send(),
            )
            .context("rekognition detect_labels")?;

        let mut instances = Vec::new();
        for label in output.labels() {
            let name = label.name().unwrap_or_default();
            for instance in label.instances() {
                instances.push(DetectedInstance::new(
                    name,
                    f64::from(instance.confidence().unwrap_or(0.0)),
                ));
            }
        }
        Ok(instances)
    }
}
