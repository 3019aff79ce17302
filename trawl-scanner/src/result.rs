use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Metadata = Map<String, Value>;

/// What a parser makes of one fetched node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeResult {
    /// Media URL. Empty when the backend left it out of an otherwise valid response.
    pub url: String,
    pub metadata: Metadata,
    pub successor: Option<String>,
    pub related: Vec<String>,
}

impl NodeResult {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_successor(mut self, successor: impl Into<String>) -> Self {
        let successor = successor.into();
        self.successor = (!successor.is_empty()).then_some(successor);
        self
    }

    pub fn with_related(mut self, related: Vec<String>) -> Self {
        self.related = related;
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn has_payload(&self) -> bool {
        !self.url.is_empty()
    }
}

/// One emitted media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub node: String,
    /// 1-based position in the emission order of the run.
    pub num: usize,
    pub url: String,
    pub metadata: Metadata,
}

/// Records handed to an output sink, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Directory { metadata: Metadata },
    Url(Item),
}

impl From<Item> for Message {
    fn from(item: Item) -> Self {
        Message::Url(item)
    }
}
