//! Clients for the external services the benchmark talks to. Each sits
//! behind a trait so the evaluation loop can run against in-process fakes.
pub mod detector;
pub mod fetch;
pub mod rewrite;
pub mod traits;
pub mod upload;

pub use detector::HttpElementDetector;
pub use fetch::HttpImageFetcher;
pub use rewrite::VisionRewriteClient;
pub use traits::{ElementDetector, ImageFetcher, ImageUploader, QueryRewriter};
pub use upload::OssUploader;
