pub mod annotator;

pub use annotator::Annotator;
