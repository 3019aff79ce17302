//! Chapter feeds served by a JSON API.
//!
//! A series feed is walked page by page with [`paginate`]; every chapter then needs its parent
//! series (and, with `metadata` on, its author and group names) plus a media server to build page
//! URLs from. Series, people and groups rarely change, so they are looked up once per process
//! through [`RefCache`]s shared between runs.

use crate::config::FeedConfig;
use crate::error::{CoreError, Result};
use crate::source::MessageStream;
use crate::text::{filename_parts, language_name};
use chrono::DateTime;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use trawl_scanner::{Client, Item, Message, Metadata, RefCache, paginate};

#[derive(Debug, Clone, Deserialize)]
pub struct Entity<A> {
    pub id: String,
    pub attributes: A,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Relationship {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// An API record: the entity plus its links to other entities.
#[derive(Debug, Clone, Deserialize)]
pub struct Record<A> {
    pub data: Entity<A>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl<A> Record<A> {
    fn related(&self, kind: &str) -> Vec<String> {
        self.relationships
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterAttributes {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub translated_language: String,
    #[serde(default)]
    pub publish_at: Option<String>,
    pub hash: String,
    /// Page file names.
    pub data: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesAttributes {
    /// Language code to title.
    pub title: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedAttributes {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaServer {
    base_url: String,
}

pub type Chapter = Record<ChapterAttributes>;

/// The parts of a series every chapter needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub artists: Vec<String>,
}

impl From<Record<SeriesAttributes>> for Series {
    fn from(record: Record<SeriesAttributes>) -> Self {
        let title = record
            .data
            .attributes
            .title
            .get("en")
            .or_else(|| record.data.attributes.title.values().next())
            .cloned()
            .unwrap_or_default();
        Series {
            authors: record.related("author"),
            artists: record.related("artist"),
            id: record.data.id,
            title,
        }
    }
}

/// Lookups shared by every feed run of a process.
#[derive(Debug, Default)]
pub struct FeedCache {
    series: RefCache<String, Series>,
    people: RefCache<String, String>,
    groups: RefCache<String, String>,
}

pub type SharedFeedCache = Arc<Mutex<FeedCache>>;

impl FeedCache {
    pub fn shared() -> SharedFeedCache {
        Arc::new(Mutex::new(FeedCache::default()))
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    async fn series(&mut self, client: &Client, api_root: &str, id: &str) -> Result<Series> {
        let url = format!("{}/manga/{}", api_root, id);
        let series = self
            .series
            .get_or_fetch(id.to_string(), || async move {
                debug!("Resolving series {}", url);
                let record: Record<SeriesAttributes> = client.call(&url, &[]).await?;
                Ok::<_, CoreError>(Series::from(record))
            })
            .await?;
        Ok(series)
    }

    async fn person(&mut self, client: &Client, api_root: &str, id: &str) -> Result<String> {
        let url = format!("{}/author/{}", api_root, id);
        self.people
            .get_or_fetch(id.to_string(), || name_of(client, url))
            .await
    }

    async fn group(&mut self, client: &Client, api_root: &str, id: &str) -> Result<String> {
        let url = format!("{}/group/{}", api_root, id);
        self.groups
            .get_or_fetch(id.to_string(), || name_of(client, url))
            .await
    }
}

async fn name_of(client: &Client, url: String) -> Result<String> {
    let record: Record<NamedAttributes> = client.call(&url, &[]).await?;
    Ok(record.data.attributes.name)
}

/// What a feed run reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedTarget {
    /// Every chapter of a series.
    Series(String),
    /// One chapter.
    Chapter(String),
}

pub struct FeedSource {
    client: Client,
    config: FeedConfig,
    target: FeedTarget,
    cache: SharedFeedCache,
}

impl FeedSource {
    pub fn new(client: Client, config: &FeedConfig, target: FeedTarget) -> Self {
        Self {
            client,
            config: config.clone(),
            target,
            cache: FeedCache::shared(),
        }
    }

    /// Share lookups with other runs.
    pub fn with_cache(mut self, cache: SharedFeedCache) -> Self {
        self.cache = cache;
        self
    }

    fn api_root(&self) -> String {
        self.config.api_root.trim_end_matches('/').to_string()
    }

    /// Query parameters of the series feed, without the offset.
    pub fn feed_params(&self) -> Vec<(String, String)> {
        let order = if self.config.reverse { "desc" } else { "asc" };
        let mut params = vec![
            ("order[volume]".to_string(), order.to_string()),
            ("order[chapter]".to_string(), order.to_string()),
            ("limit".to_string(), self.config.page_size.to_string()),
        ];
        for lang in &self.config.lang {
            params.push(("translatedLanguage[]".to_string(), lang.clone()));
        }
        params
    }

    fn chapters(&self) -> stream::BoxStream<'static, Result<Chapter>> {
        let api_root = self.api_root();
        match &self.target {
            FeedTarget::Series(id) => {
                let endpoint = format!("{}/manga/{}/feed", api_root, id);
                paginate(&self.client, &endpoint, self.feed_params())
                    .map_err(CoreError::from)
                    .boxed()
            }
            FeedTarget::Chapter(id) => {
                let client = self.client.clone();
                let url = format!("{}/chapter/{}", api_root, id);
                stream::once(async move {
                    client
                        .call::<Chapter>(&url, &[])
                        .await
                        .map_err(CoreError::from)
                })
                .boxed()
            }
        }
    }

    pub fn into_stream(self) -> MessageStream {
        let chapters = self.chapters();
        let api_root = self.api_root();
        let FeedSource {
            client,
            config,
            cache,
            ..
        } = self;

        chapters
            .and_then(move |chapter| {
                let client = client.clone();
                let api_root = api_root.clone();
                let metadata = config.metadata;
                let cache = cache.clone();
                async move { chapter_messages(&client, &api_root, metadata, &cache, chapter).await }
            })
            .map_ok(|messages| stream::iter(messages.into_iter().map(Ok::<_, CoreError>)))
            .try_flatten()
            .boxed()
    }
}

/// The directory record and page URLs of one chapter.
async fn chapter_messages(
    client: &Client,
    api_root: &str,
    with_people: bool,
    cache: &SharedFeedCache,
    chapter: Chapter,
) -> Result<Vec<Message>> {
    let series_id = chapter
        .related("manga")
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::Extraction(format!("chapter {} has no series", chapter.data.id)))?;

    let mut data = {
        let mut cache = cache.lock().await;
        let series = cache.series(client, api_root, &series_id).await?;
        let mut data = chapter_metadata(&series, &chapter);

        if with_people {
            let mut artists = Vec::new();
            for id in &series.artists {
                artists.push(Value::from(cache.person(client, api_root, id).await?));
            }
            let mut authors = Vec::new();
            for id in &series.authors {
                authors.push(Value::from(cache.person(client, api_root, id).await?));
            }
            let mut groups = Vec::new();
            for id in chapter.related("scanlation_group") {
                groups.push(Value::from(cache.group(client, api_root, &id).await?));
            }
            data.insert("artist".to_string(), Value::Array(artists));
            data.insert("author".to_string(), Value::Array(authors));
            data.insert("group".to_string(), Value::Array(groups));
        }
        data
    };

    let server: MediaServer = client
        .call(&format!("{}/at-home/server/{}", api_root, chapter.data.id), &[])
        .await?;
    let base = format!(
        "{}/data/{}/",
        server.base_url.trim_end_matches('/'),
        chapter.data.attributes.hash
    );
    info!(
        "Chapter {} of {}: {} pages",
        chapter.data.id,
        data["manga"],
        chapter.data.attributes.data.len()
    );

    let mut messages = Vec::with_capacity(chapter.data.attributes.data.len() + 1);
    messages.push(Message::Directory {
        metadata: data.clone(),
    });
    for (index, file) in chapter.data.attributes.data.iter().enumerate() {
        let page = index + 1;
        let (name, extension) = filename_parts(file);
        data.insert("page".to_string(), Value::from(page));
        data.insert("filename".to_string(), Value::from(name));
        data.insert("extension".to_string(), Value::from(extension));
        messages.push(Message::Url(Item {
            node: page.to_string(),
            num: page,
            url: format!("{}{}", base, file),
            metadata: data.clone(),
        }));
    }
    Ok(messages)
}

fn chapter_metadata(series: &Series, chapter: &Chapter) -> Metadata {
    let attributes = &chapter.data.attributes;
    let lang = attributes
        .translated_language
        .split('-')
        .next()
        .unwrap_or_default();
    let (number, minor) = match attributes.chapter.as_deref() {
        Some(chapter) if !chapter.is_empty() => match chapter.split_once('.') {
            Some((number, minor)) => (number, format!(".{}", minor)),
            None => (chapter, String::new()),
        },
        _ => ("0", String::new()),
    };
    let date = attributes
        .publish_at
        .as_deref()
        .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
        .map(|date| date.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string());

    let mut data = Metadata::new();
    data.insert("manga".to_string(), Value::from(series.title.as_str()));
    data.insert("manga_id".to_string(), Value::from(series.id.as_str()));
    data.insert(
        "title".to_string(),
        Value::from(attributes.title.clone().unwrap_or_default()),
    );
    data.insert("volume".to_string(), Value::from(parse_int(attributes.volume.as_deref())));
    data.insert("chapter".to_string(), Value::from(parse_int(Some(number))));
    data.insert("chapter_minor".to_string(), Value::from(minor));
    data.insert("chapter_id".to_string(), Value::from(chapter.data.id.as_str()));
    data.insert("date".to_string(), date.map(Value::from).unwrap_or(Value::Null));
    data.insert("lang".to_string(), Value::from(lang));
    data.insert(
        "language".to_string(),
        language_name(lang).map(Value::from).unwrap_or(Value::Null),
    );
    data.insert("count".to_string(), Value::from(attributes.data.len()));
    data.insert("context".to_string(), Value::from(chapter.data.id.as_str()));
    data
}

fn parse_int(value: Option<&str>) -> i64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chapter(number: Option<&str>, volume: Option<&str>) -> Chapter {
        serde_json::from_value(json!({
            "data": {
                "id": "c1",
                "attributes": {
                    "title": "Oneshot",
                    "volume": volume,
                    "chapter": number,
                    "translatedLanguage": "pt-br",
                    "publishAt": "2021-05-30T12:34:56+00:00",
                    "hash": "h",
                    "data": ["1.png", "2.png"]
                }
            },
            "relationships": [{"id": "m1", "type": "manga"}]
        }))
        .unwrap()
    }

    fn series() -> Series {
        Series {
            id: "m1".to_string(),
            title: "Souten no Koumori".to_string(),
            authors: Vec::new(),
            artists: Vec::new(),
        }
    }

    #[test]
    fn test_chapter_number_split() {
        let data = chapter_metadata(&series(), &chapter(Some("12.5"), Some("3")));
        assert_eq!(data["chapter"], 12);
        assert_eq!(data["chapter_minor"], ".5");
        assert_eq!(data["volume"], 3);
        assert_eq!(data["lang"], "pt");
        assert_eq!(data["language"], "Portuguese");
        assert_eq!(data["date"], "2021-05-30 12:34:56");
        assert_eq!(data["count"], 2);
    }

    #[test]
    fn test_missing_numbers_default_to_zero() {
        let data = chapter_metadata(&series(), &chapter(None, None));
        assert_eq!(data["chapter"], 0);
        assert_eq!(data["chapter_minor"], "");
        assert_eq!(data["volume"], 0);
    }

    #[test]
    fn test_unknown_language_is_null() {
        let mut chapter = chapter(Some("1"), None);
        chapter.data.attributes.translated_language = "xx".to_string();
        let data = chapter_metadata(&series(), &chapter);
        assert_eq!(data["lang"], "xx");
        assert_eq!(data["language"], Value::Null);
    }

    #[test]
    fn test_series_title_prefers_english() {
        let record: Record<SeriesAttributes> = serde_json::from_value(json!({
            "data": {"id": "m1", "attributes": {"title": {"ja": "蝙蝠", "en": "Bat"}}},
            "relationships": [
                {"id": "a1", "type": "author"},
                {"id": "a2", "type": "artist"}
            ]
        }))
        .unwrap();
        let series = Series::from(record);
        assert_eq!(series.title, "Bat");
        assert_eq!(series.authors, ["a1"]);
        assert_eq!(series.artists, ["a2"]);
    }
}
