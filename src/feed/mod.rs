pub mod http;
pub mod provider;

pub use http::HttpFeed;
pub use provider::FeedSource;
