pub mod indexer;
pub mod search;
pub mod selectors;

pub use indexer::FanqieIndexer;
pub use search::SearchClient;
pub use selectors::SiteSelectors;
