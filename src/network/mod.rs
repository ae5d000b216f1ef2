pub mod headers;
pub mod middleware;
pub mod service;
#[cfg(test)]
pub mod stub;

pub use service::{HttpService, with_retry};
