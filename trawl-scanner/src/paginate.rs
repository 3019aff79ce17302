use crate::client::Client;
use crate::error::{Result, ScanError};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use tracing::debug;

/// One page of an offset-paginated listing.
#[derive(Debug, Deserialize)]
pub struct OffsetPage<T> {
    #[serde(alias = "data")]
    pub results: Vec<T>,
    pub offset: u64,
    pub limit: u64,
    pub total: u64,
}

struct Cursor<T> {
    client: Client,
    endpoint: String,
    params: Vec<(String, String)>,
    /// `None` once the declared total has been reached.
    next_offset: Option<u64>,
    buffer: VecDeque<T>,
}

impl<T: DeserializeOwned> Cursor<T> {
    async fn fetch(&mut self, offset: u64) -> Result<()> {
        let mut params = self.params.clone();
        params.push(("offset".to_string(), offset.to_string()));

        let page: OffsetPage<T> = self.client.call(&self.endpoint, &params).await?;
        debug!(
            "Page of {} at offset {} ({} of {})",
            self.endpoint,
            offset,
            page.results.len(),
            page.total
        );

        let next = offset.checked_add(page.limit).ok_or_else(|| {
            ScanError::ParseError(format!(
                "{} declared a page limit of {} at offset {}, past the largest offset",
                self.endpoint, page.limit, offset
            ))
        })?;
        self.next_offset = if next >= page.total {
            None
        } else if page.limit == 0 {
            return Err(ScanError::ParseError(format!(
                "{} declared a page limit of 0 at offset {} of {}",
                self.endpoint, offset, page.total
            )));
        } else {
            Some(next)
        };

        self.buffer.extend(page.results);
        Ok(())
    }

    async fn next_record(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            let Some(offset) = self.next_offset else {
                return Ok(None);
            };
            self.fetch(offset).await?;
        }
    }
}

/// Walks an offset-paginated endpoint, yielding records until the declared total is reached.
///
/// `params` are sent with every request; the `offset` parameter is managed here and starts at 0.
/// A failed page ends the stream with that error.
pub fn paginate<T>(
    client: &Client,
    endpoint: &str,
    params: Vec<(String, String)>,
) -> impl Stream<Item = Result<T>> + Send + 'static
where
    T: DeserializeOwned + Send + 'static,
{
    let cursor = Cursor {
        client: client.clone(),
        endpoint: endpoint.to_string(),
        params,
        next_offset: Some(0),
        buffer: VecDeque::new(),
    };

    stream::try_unfold(cursor, |mut cursor| async move {
        let record = cursor.next_record().await;
        record.map(|record| record.map(|record| (record, cursor)))
    })
}
