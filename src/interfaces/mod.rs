pub mod indexer;
pub mod source;

pub use indexer::Indexer;
pub use source::{BatchSource, ContentSource, FetchOutcome, RawChapter};
