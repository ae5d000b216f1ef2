pub mod config;
pub mod epub;
pub mod error;
pub mod event;
pub mod model;
pub mod output;
pub mod store;
