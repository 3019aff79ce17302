pub mod config;
pub mod data;
pub mod error;
pub mod extract;
pub mod feed;
pub mod parse;
pub mod report;
pub mod session;
pub mod source;
pub mod text;

pub use config::{ConfigOverrides, TrawlConfig};
pub use data::Archive;
pub use error::{CoreError, Result};
pub use extract::{ExtractOptions, JsonLinesSink, RunSummary, Sink, execute_extraction};
pub use feed::{FeedCache, FeedSource, FeedTarget};
pub use parse::{MarkerParser, SelectorParser};
pub use session::{Session, WarnOnce};
pub use source::{LinkSource, MessageStream, SetSource, TemplateFetcher};

use colored::Colorize;

pub fn print_banner() {
    eprintln!(
        "{} {}",
        "trawl".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
