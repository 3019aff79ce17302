pub mod cache;
pub mod client;
pub mod error;
pub mod paginate;
pub mod result;
pub mod traverse;

pub use cache::RefCache;
pub use client::{AccessPolicy, Client, Page, RateLimitWait};
pub use error::{ResumePoint, ScanError};
pub use paginate::paginate;
pub use result::{Item, Message, Metadata, NodeResult};
pub use traverse::{Frontier, NodeFetcher, NodeParser, Traversal, TraversalOptions};
