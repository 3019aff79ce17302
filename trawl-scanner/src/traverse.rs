//! Frontier traversal over linked nodes.
//!
//! A run starts from one seed node and walks the chain each node declares through its
//! successor, optionally picking up related nodes on the way. Every node is fetched,
//! parsed and resolved before the next one is looked at. Nodes whose media URL comes back
//! empty are fetched again after a delay, up to a fixed number of times, and then skipped.

use crate::error::{Result, ResumePoint};
use crate::result::{Item, NodeResult};
use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Fetches the raw content of one node.
#[async_trait]
pub trait NodeFetcher: Send + Sync {
    async fn fetch(&self, node: &str, context: &str) -> Result<String>;
}

/// Turns fetched content into a [`NodeResult`].
///
/// Parsers never fail; fields they cannot find come back empty.
pub trait NodeParser: Send + Sync {
    fn parse(&self, raw: &str) -> NodeResult;
}

#[async_trait]
impl<T: NodeFetcher + ?Sized> NodeFetcher for Arc<T> {
    async fn fetch(&self, node: &str, context: &str) -> Result<String> {
        (**self).fetch(node, context).await
    }
}

impl<T: NodeParser + ?Sized> NodeParser for Arc<T> {
    fn parse(&self, raw: &str) -> NodeResult {
        (**self).parse(raw)
    }
}

#[derive(Debug, Clone)]
pub struct TraversalOptions {
    pub max_transient_retries: u32,
    pub transient_retry_delay: Duration,
    pub expand_related: bool,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_transient_retries: 2,
            transient_retry_delay: Duration::from_secs(5),
            expand_related: false,
        }
    }
}

impl TraversalOptions {
    pub fn with_max_transient_retries(mut self, retries: u32) -> Self {
        self.max_transient_retries = retries;
        self
    }

    pub fn with_transient_retry_delay(mut self, delay: Duration) -> Self {
        self.transient_retry_delay = delay;
        self
    }

    pub fn with_expand_related(mut self, expand: bool) -> Self {
        self.expand_related = expand;
        self
    }
}

/// Work list of node ids. An id is recorded as seen before it is queued and is never queued twice.
#[derive(Debug, Default)]
pub struct Frontier {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl Frontier {
    pub fn new(seed: impl Into<String>) -> Self {
        let mut frontier = Self::default();
        frontier.push(seed.into());
        frontier
    }

    /// Queues `node` unless it was queued before. Returns whether it was added.
    pub fn push(&mut self, node: String) -> bool {
        if !self.seen.insert(node.clone()) {
            return false;
        }
        self.order.push(node);
        true
    }

    pub fn contains(&self, node: &str) -> bool {
        self.seen.contains(node)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.order.get(index).map(String::as_str)
    }

    pub fn nodes(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// One traversal run. Owns its frontier and retry counter.
pub struct Traversal<F, P> {
    fetcher: F,
    parser: P,
    options: TraversalOptions,
    context: String,
    frontier: Frontier,
    cursor: usize,
    retries: u32,
    emitted: usize,
    skipped: Vec<String>,
}

impl<F: NodeFetcher, P: NodeParser> Traversal<F, P> {
    pub fn new(fetcher: F, parser: P, seed: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            fetcher,
            parser,
            options: TraversalOptions::default(),
            context: context.into(),
            frontier: Frontier::new(seed),
            cursor: 0,
            retries: 0,
            emitted: 0,
            skipped: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: TraversalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Nodes given up on after their retries ran out.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Processes nodes until one yields an item or the frontier is exhausted.
    pub async fn next_item(&mut self) -> Result<Option<Item>> {
        while let Some(current) = self.frontier.get(self.cursor).map(str::to_string) {
            let raw = match self.fetcher.fetch(&current, &self.context).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(
                        "Aborting traversal at node {} (context {}): {}",
                        current, self.context, e
                    );
                    return Err(e.with_resume(ResumePoint {
                        node: current,
                        context: self.context.clone(),
                    }));
                }
            };
            let node = self.parser.parse(&raw);

            if self.options.expand_related {
                for related in &node.related {
                    if self.frontier.push(related.clone()) {
                        debug!("Found related node {} alongside {}", related, current);
                    }
                }
            }

            let item = if node.has_payload() {
                self.retries = 0;
                self.emitted += 1;
                Some(self.make_item(&current, &node))
            } else if self.retries < self.options.max_transient_retries {
                self.retries += 1;
                warn!(
                    "No media URL for node {}, retrying in {:.1}s ({}/{})",
                    current,
                    self.options.transient_retry_delay.as_secs_f64(),
                    self.retries,
                    self.options.max_transient_retries
                );
                tokio::time::sleep(self.options.transient_retry_delay).await;
                continue;
            } else {
                error!(
                    "No media URL for node {} (context {}) after {} retries, skipping",
                    current, self.context, self.retries
                );
                self.retries = 0;
                self.skipped.push(current.clone());
                None
            };

            self.follow_successor(&current, node.successor.as_deref());
            self.cursor += 1;

            if item.is_some() {
                return Ok(item);
            }
        }

        Ok(None)
    }

    fn make_item(&self, current: &str, node: &NodeResult) -> Item {
        let mut metadata = node.metadata.clone();
        metadata
            .entry("context")
            .or_insert_with(|| Value::String(self.context.clone()));

        Item {
            node: current.to_string(),
            num: self.emitted,
            url: node.url.clone(),
            metadata,
        }
    }

    fn follow_successor(&mut self, current: &str, successor: Option<&str>) {
        match successor {
            None => debug!("No successor after node {}, chain is over", current),
            Some(next) if next == current => {
                debug!("Node {} names itself as successor, chain is over", current)
            }
            Some(next) if self.frontier.contains(next) => debug!(
                "Detected a loop from node {} back to {}, chain is over",
                current, next
            ),
            Some(next) => {
                self.frontier.push(next.to_string());
            }
        }
    }

    /// Turns the run into a stream of items. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Item>> {
        stream::try_unfold(self, |mut traversal| async move {
            let item = traversal.next_item().await;
            item.map(|item| item.map(|item| (item, traversal)))
        })
    }
}
