// Markup sources: media sets and link chains

use crate::config::SetConfig;
use crate::error::{CoreError, Result};
use crate::parse::{MarkerParser, SelectorParser, SetDirectory};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::info;
use trawl_scanner::{
    AccessPolicy, Client, Message, Metadata, NodeFetcher, NodeParser, Traversal, TraversalOptions,
};
use url::Url;

/// Ordered messages of one run. Ends after the first error.
pub type MessageStream = BoxStream<'static, Result<Message>>;

/// Fetches nodes by filling `{node}` and `{context}` into a URL template.
#[derive(Clone)]
pub struct TemplateFetcher {
    client: Client,
    policy: AccessPolicy,
    template: String,
}

impl TemplateFetcher {
    pub fn new(client: Client, template: impl Into<String>) -> Self {
        Self {
            client,
            policy: AccessPolicy::default(),
            template: template.into(),
        }
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Placeholders are filled in one pass, so values are never rescanned.
    pub fn url_for(&self, node: &str, context: &str) -> String {
        let mut url = String::with_capacity(self.template.len() + node.len() + context.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            url.push_str(&rest[..start]);
            rest = &rest[start..];
            if let Some(after) = rest.strip_prefix("{node}") {
                url.push_str(node);
                rest = after;
            } else if let Some(after) = rest.strip_prefix("{context}") {
                url.push_str(context);
                rest = after;
            } else {
                url.push('{');
                rest = &rest[1..];
            }
        }
        url.push_str(rest);
        url
    }
}

#[async_trait]
impl NodeFetcher for TemplateFetcher {
    async fn fetch(&self, node: &str, context: &str) -> trawl_scanner::error::Result<String> {
        let page = self
            .client
            .fetch_page(&self.url_for(node, context), &self.policy)
            .await?;
        Ok(page.body)
    }
}

/// Leads a traversal with its directory record.
fn directory_then<F, P>(metadata: Metadata, traversal: Traversal<F, P>) -> MessageStream
where
    F: NodeFetcher + 'static,
    P: NodeParser + 'static,
{
    stream::once(future::ready(Ok(Message::Directory { metadata })))
        .chain(
            traversal
                .into_stream()
                .map(|item| item.map(Message::from).map_err(CoreError::from)),
        )
        .boxed()
}

/// A media set: one set page listing the first item, then a chain of photo pages.
pub struct SetSource {
    client: Client,
    config: SetConfig,
    parser: MarkerParser,
    set_id: String,
    start_at: Option<String>,
    options: TraversalOptions,
}

impl SetSource {
    pub fn new(client: Client, config: &SetConfig, set_id: impl Into<String>) -> Self {
        Self {
            client,
            config: config.clone(),
            parser: MarkerParser::new(),
            set_id: set_id.into(),
            start_at: None,
            options: TraversalOptions::default(),
        }
    }

    /// Start the chain at `node` instead of the set's first item.
    pub fn with_start_at(mut self, node: Option<String>) -> Self {
        self.start_at = node.filter(|n| !n.is_empty());
        self
    }

    /// `expand_related` also turns on author follow-ups in the parser.
    pub fn with_options(mut self, options: TraversalOptions) -> Self {
        self.parser = self.parser.with_followups(options.expand_related);
        self.options = options;
        self
    }

    pub async fn directory(&self) -> Result<SetDirectory> {
        let url = self.config.set_url().replace("{context}", &self.set_id);
        let page = self
            .client
            .fetch_page(&url, &self.config.access_policy())
            .await?;

        let mut directory = self.parser.parse_set_page(&page.body);
        if directory.set_id.is_empty() {
            directory.set_id = self.set_id.clone();
        }
        Ok(directory)
    }

    async fn open(self) -> Result<MessageStream> {
        let directory = self.directory().await?;
        let context = directory.set_id.clone();
        let seed = self
            .start_at
            .clone()
            .unwrap_or_else(|| directory.first_node.clone());
        if seed.is_empty() {
            return Err(CoreError::Extraction(format!(
                "no first item found in set {}",
                context
            )));
        }
        info!(
            "Set {} \"{}\" by {}, starting at {}",
            context, directory.title, directory.username, seed
        );

        let fetcher = TemplateFetcher::new(self.client, self.config.node_url())
            .with_policy(self.config.access_policy());
        let traversal = Traversal::new(fetcher, self.parser, seed, context.as_str())
            .with_options(self.options);

        let mut metadata = directory.metadata();
        metadata.insert("context".to_string(), Value::from(context));
        Ok(directory_then(metadata, traversal))
    }

    pub fn into_stream(self) -> MessageStream {
        stream::once(self.open()).try_flatten().boxed()
    }
}

/// A chain of plain HTML pages linked by a "next" selector.
pub struct LinkSource {
    client: Client,
    parser: SelectorParser,
    seed: String,
    host: String,
    options: TraversalOptions,
}

impl LinkSource {
    pub fn new(client: Client, seed: &str, parser: SelectorParser) -> Result<Self> {
        let url = Url::parse(seed).map_err(|e| CoreError::Config(format!("invalid seed URL {}: {}", seed, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| CoreError::Config(format!("seed URL {} has no host", seed)))?
            .to_string();

        Ok(Self {
            client,
            parser,
            seed: url.to_string(),
            host,
            options: TraversalOptions::default(),
        })
    }

    pub fn with_options(mut self, options: TraversalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn into_stream(self) -> MessageStream {
        let mut metadata = Metadata::new();
        metadata.insert("context".to_string(), Value::from(self.host.as_str()));
        metadata.insert("seed".to_string(), Value::from(self.seed.as_str()));

        let fetcher = TemplateFetcher::new(self.client, "{node}");
        let traversal = Traversal::new(fetcher, self.parser, self.seed, self.host)
            .with_options(self.options);
        directory_then(metadata, traversal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_fills_node_and_context() {
        let fetcher = TemplateFetcher::new(
            Client::new().unwrap(),
            "https://example.com/photo/?fbid={node}&set={context}",
        );
        assert_eq!(
            fetcher.url_for("123", "a.456"),
            "https://example.com/photo/?fbid=123&set=a.456"
        );
    }

    #[test]
    fn test_template_does_not_rescan_filled_values() {
        let fetcher = TemplateFetcher::new(Client::new().unwrap(), "{node}?set={context}");
        assert_eq!(
            fetcher.url_for("https://example.com/{context}/p", "a.1"),
            "https://example.com/{context}/p?set=a.1"
        );
        assert_eq!(fetcher.url_for("{x}", "{node}"), "{x}?set={node}");
    }

    #[test]
    fn test_link_source_requires_absolute_seed() {
        let parser = SelectorParser::new("https://example.com/", "img").unwrap();
        assert!(LinkSource::new(Client::new().unwrap(), "/relative", parser).is_err());
    }
}
