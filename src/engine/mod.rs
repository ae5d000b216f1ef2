pub mod context;
pub mod fetcher;
pub mod pipeline;
pub mod task;

pub use fetcher::ChapterFetcher;
pub use pipeline::{DownloadEngine, DownloadRequest};
