use async_trait::async_trait;

use crate::errors::BenchResult;
use crate::scoring::BoundingBox;

/// Locates the UI element a text query refers to.
#[async_trait]
pub trait ElementDetector: Send + Sync {
    /// Returns the box in pixel coordinates of `image_bytes`, or `None` when
    /// the service answered without a usable box.
    async fn detect(&self, image_bytes: &[u8], query: &str) -> BenchResult<Option<BoundingBox>>;
}

/// Turns a terse benchmark instruction into a richer element description.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn rewrite(&self, image_url: &str, instruction: &str) -> BenchResult<String>;
}

/// Publishes a file and returns a URL other services can read it from.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> BenchResult<String>;
}

/// Downloads a remote image.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> BenchResult<Vec<u8>>;
}
