//! Evaluation scorer: box normalization, hit and overlap tests, and the
//! per-sample verdict that decides whether a sample is a bad case.
pub mod bbox;
pub mod verdict;

pub use bbox::{BoundingBox, ImageDimensions};
pub use verdict::{hit, overlap, score, Verdict};
