// Node parsers for the markup sources

use crate::error::{CoreError, Result};
use crate::text::{decode, extr, extract_iter, filename_parts};
use chrono::DateTime;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use trawl_scanner::{Metadata, NodeParser, NodeResult};
use url::Url;

const PHOTO_ID: (&str, &str) = (r#""__isNode":"Photo","id":""#, "\"");
const PHOTO_URL: (&str, &str) = (r#","image":{"uri":""#, "\",\"");
const OWNER_NAME: (&str, &str) = (r#""owner":{"__typename":"User","name":""#, "\"");
const OWNER_ID: (&str, &str) = (r#""owner":{"__typename":"User","id":""#, "\"");
const CAPTION: (&str, &str) = (r#""message":{"delight_ranges""#, r#""},"message_preferred_body""#);
const CAPTION_TEXT: &str = r#"],"text":""#;
const PUBLISH_TIME: (&str, &str) = (r#"\"publish_time\":"#, ",");
const NEXT_AFTER: (&str, &str) = (r#""nextMediaAfterNodeId":{"__typename":"Photo","id":""#, "\"");
const NEXT_EDGE: (&str, &str) = (r#""nextMedia":{"edges":[{"node":{"__typename":"Photo","id":""#, "\"");
const COMMENT: (&str, &str) = (r#"{"node":{"id""#, r#""cursor":null}"#);
const COMMENT_BY_AUTHOR: &str = r#""is_author_original_poster":true"#;
const COMMENT_PHOTO: (&str, &str) = (r#"{"__typename":"Photo","id":""#, "\"");

const SET_TOKEN: [(&str, &str); 2] = [
    (r#""mediaSetToken":""#, "\""),
    (r#""mediasetToken":""#, "\""),
];
const SET_OWNER_NAME: [(&str, &str); 2] = [
    (r#""user":{"__isProfile":"User","name":""#, "\",\""),
    (r#""actors":[{"__typename":"User","name":""#, "\",\""),
];
const SET_TITLE: (&str, &str) = (r#""title":{"text":""#, "\"");
const SET_FIRST_MEDIA: (&str, &str) = (r#"{"__typename":"Photo","__isMedia":"Photo",""#, r#"","creation_story""#);
const SET_FIRST_PHOTO: (&str, &str) = (r#"{"__typename":"Photo","id":""#, "\"");

fn first_of<'a>(page: &'a str, markers: &[(&str, &str)]) -> &'a str {
    markers
        .iter()
        .map(|(begin, end)| extr(page, begin, end))
        .find(|value| !value.is_empty())
        .unwrap_or("")
}

/// The directory record of a media set page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetDirectory {
    pub set_id: String,
    pub title: String,
    pub username: String,
    pub user_id: String,
    pub first_node: String,
}

impl SetDirectory {
    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("set_id".to_string(), Value::from(self.set_id.as_str()));
        metadata.insert("title".to_string(), Value::from(self.title.as_str()));
        metadata.insert("username".to_string(), Value::from(self.username.as_str()));
        metadata.insert("user_id".to_string(), Value::from(self.user_id.as_str()));
        metadata
    }
}

/// Reads photo pages that carry their data as JSON fragments inside inline scripts.
#[derive(Debug, Clone, Default)]
pub struct MarkerParser {
    followups: bool,
}

impl MarkerParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also report photos the set's author posted in the comments as related nodes.
    pub fn with_followups(mut self, followups: bool) -> Self {
        self.followups = followups;
        self
    }

    pub fn parse_set_page(&self, page: &str) -> SetDirectory {
        let first_media = extr(page, SET_FIRST_MEDIA.0, SET_FIRST_MEDIA.1);
        let first_node = match first_media.rsplit_once(r#""id":""#) {
            Some((_, id)) if !id.is_empty() => id,
            _ => extr(page, SET_FIRST_PHOTO.0, SET_FIRST_PHOTO.1),
        };

        SetDirectory {
            set_id: first_of(page, &SET_TOKEN).to_string(),
            title: decode(extr(page, SET_TITLE.0, SET_TITLE.1)),
            username: decode(first_of(page, &SET_OWNER_NAME)),
            user_id: extr(page, OWNER_ID.0, OWNER_ID.1).to_string(),
            first_node: first_node.to_string(),
        }
    }

    fn followups(&self, page: &str) -> Vec<String> {
        extract_iter(page, COMMENT.0, COMMENT.1)
            .filter(|comment| comment.contains(COMMENT_BY_AUTHOR) && comment.contains(COMMENT_PHOTO.0))
            .map(|comment| extr(comment, COMMENT_PHOTO.0, COMMENT_PHOTO.1).to_string())
            .filter(|id| !id.is_empty())
            .collect()
    }
}

impl NodeParser for MarkerParser {
    fn parse(&self, page: &str) -> NodeResult {
        let url = decode(extr(page, PHOTO_URL.0, PHOTO_URL.1));
        let caption_raw = extr(page, CAPTION.0, CAPTION.1);
        let caption = caption_raw
            .rsplit_once(CAPTION_TEXT)
            .map(|(_, text)| text)
            .unwrap_or(caption_raw);
        let date = extr(page, PUBLISH_TIME.0, PUBLISH_TIME.1)
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string());
        let (name, extension) = filename_parts(&url);

        let mut result = NodeResult::new(url)
            .with_successor(first_of(page, &[NEXT_AFTER, NEXT_EDGE]))
            .with_field("id", extr(page, PHOTO_ID.0, PHOTO_ID.1))
            .with_field("username", decode(extr(page, OWNER_NAME.0, OWNER_NAME.1)))
            .with_field("user_id", extr(page, OWNER_ID.0, OWNER_ID.1))
            .with_field("caption", decode(caption))
            .with_field("date", date.map(Value::from).unwrap_or(Value::Null))
            .with_field("filename", name)
            .with_field("extension", extension);

        if self.followups {
            result = result.with_related(self.followups(page));
        }
        result
    }
}

/// Reads plain HTML pages with CSS selectors. Node ids are absolute page URLs.
///
/// Relative links are resolved against the seed URL given at construction.
#[derive(Debug, Clone)]
pub struct SelectorParser {
    base: Url,
    media: String,
    next: Option<String>,
    related: Option<String>,
}

impl SelectorParser {
    pub fn new(base: &str, media: &str) -> Result<Self> {
        let base = Url::parse(base).map_err(|e| CoreError::Config(format!("invalid seed URL {}: {}", base, e)))?;
        validate_selector(media)?;
        Ok(Self {
            base,
            media: media.to_string(),
            next: None,
            related: None,
        })
    }

    pub fn with_next(mut self, selector: &str) -> Result<Self> {
        validate_selector(selector)?;
        self.next = Some(selector.to_string());
        Ok(self)
    }

    pub fn with_related(mut self, selector: &str) -> Result<Self> {
        validate_selector(selector)?;
        self.related = Some(selector.to_string());
        Ok(self)
    }

    fn resolve(&self, link: &str) -> Option<String> {
        let link = link.trim();
        if link.is_empty() {
            return None;
        }
        let mut url = self.base.join(link).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        url.set_fragment(None);
        Some(url.to_string())
    }

    fn links<'a>(&'a self, document: &'a Html, selector: &str) -> impl Iterator<Item = String> + 'a {
        // Selectors were validated in the constructors, so a parse failure only means no matches.
        let selector = Selector::parse(selector).ok();
        selector
            .into_iter()
            .flat_map(move |selector| {
                document
                    .select(&selector)
                    .filter_map(|element| link_of(element).and_then(|link| self.resolve(link)))
                    .collect::<Vec<_>>()
            })
    }
}

fn validate_selector(selector: &str) -> Result<()> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| CoreError::Selector {
            selector: selector.to_string(),
            reason: format!("{:?}", e),
        })
}

fn link_of(element: ElementRef<'_>) -> Option<&str> {
    ["src", "data-src", "href", "content"]
        .into_iter()
        .find_map(|attr| element.value().attr(attr))
}

impl NodeParser for SelectorParser {
    fn parse(&self, page: &str) -> NodeResult {
        let document = Html::parse_document(page);

        let url = self.links(&document, &self.media).next().unwrap_or_default();
        let (name, extension) = filename_parts(&url);
        let title = Selector::parse("title")
            .ok()
            .and_then(|selector| {
                document
                    .select(&selector)
                    .next()
                    .map(|element| element.text().collect::<String>().trim().to_string())
            })
            .unwrap_or_default();

        let mut result = NodeResult::new(url)
            .with_field("title", title)
            .with_field("filename", name)
            .with_field("extension", extension);

        if let Some(next) = &self.next
            && let Some(successor) = self.links(&document, next).next()
        {
            result = result.with_successor(successor);
        }
        if let Some(related) = &self.related {
            result = result.with_related(self.links(&document, related).collect());
        }
        result
    }
}
