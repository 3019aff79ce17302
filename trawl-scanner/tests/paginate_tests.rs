// Tests for offset pagination

use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use std::time::Duration;
use trawl_scanner::{Client, ScanError, paginate};
use wiremock::{
    Mock, MockServer, Request, Respond, ResponseTemplate,
    matchers::{method, path, query_param},
};

/// Serves `total` numbered records in pages of `limit`, honouring the `offset` query parameter.
struct Listing {
    total: u64,
    limit: u64,
}

impl Respond for Listing {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let offset: u64 = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "offset")
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(0);

        let results: Vec<u64> = (offset..(offset + self.limit).min(self.total)).collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok",
            "data": results,
            "limit": self.limit,
            "offset": offset,
            "total": self.total,
        }))
    }
}

fn client() -> Client {
    Client::builder()
        .retry_delay(Duration::from_millis(10))
        .build()
        .unwrap()
}

async fn requested_offsets(server: &MockServer) -> Vec<u64> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(key, _)| key == "offset")
                .and_then(|(_, value)| value.parse().ok())
        })
        .collect()
}

#[tokio::test]
async fn test_yields_every_record_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manga/m1/feed"))
        .respond_with(Listing { total: 7, limit: 3 })
        .mount(&server)
        .await;

    let endpoint = format!("{}/manga/m1/feed", server.uri());
    let records: Vec<u64> = paginate::<u64>(&client(), &endpoint, Vec::new())
        .try_collect()
        .await
        .unwrap();

    assert_eq!(records, (0..7).collect::<Vec<_>>());
    assert_eq!(requested_offsets(&server).await, [0, 3, 6]);
}

#[tokio::test]
async fn test_stops_when_offset_reaches_total_exactly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(Listing { total: 6, limit: 3 })
        .mount(&server)
        .await;

    let records: Vec<u64> = paginate::<u64>(&client(), &server.uri(), Vec::new())
        .try_collect()
        .await
        .unwrap();

    assert_eq!(records.len(), 6);
    assert_eq!(requested_offsets(&server).await, [0, 3]);
}

#[tokio::test]
async fn test_empty_listing_makes_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(Listing { total: 0, limit: 100 })
        .expect(1)
        .mount(&server)
        .await;

    let records: Vec<u64> = paginate::<u64>(&client(), &server.uri(), Vec::new())
        .try_collect()
        .await
        .unwrap();

    assert!(records.is_empty());
}

#[tokio::test]
async fn test_base_params_are_sent_with_every_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(Listing { total: 5, limit: 2 })
        .mount(&server)
        .await;

    let params = vec![
        ("order[chapter]".to_string(), "asc".to_string()),
        ("translatedLanguage[]".to_string(), "en".to_string()),
    ];
    let records: Vec<u64> = paginate::<u64>(&client(), &server.uri(), params)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(records.len(), 5);

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 3);
    for request in requests {
        let pairs: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("order[chapter]".to_string(), "asc".to_string())));
        assert!(pairs.contains(&("translatedLanguage[]".to_string(), "en".to_string())));
        assert_eq!(pairs.iter().filter(|(key, _)| key == "offset").count(), 1);
    }
}

#[tokio::test]
async fn test_failed_page_ends_stream_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(Listing { total: 9, limit: 3 })
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let results: Vec<_> = paginate::<u64>(&client(), &server.uri(), Vec::new())
        .collect()
        .await;

    assert_eq!(results.len(), 4);
    assert!(results[..3].iter().all(|r| r.is_ok()));
    assert!(matches!(
        results[3],
        Err(ScanError::Terminal { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_zero_limit_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [1, 2],
            "limit": 0,
            "offset": 0,
            "total": 10,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let results: Vec<_> = paginate::<u64>(&client(), &server.uri(), Vec::new())
        .collect()
        .await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(ScanError::ParseError(_))));
}

#[tokio::test]
async fn test_offset_overflow_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [1, 2, 3, 4, 5],
            "limit": 5,
            "offset": 0,
            "total": u64::MAX,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("offset", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [6],
            "limit": u64::MAX,
            "offset": 5,
            "total": u64::MAX,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let results: Vec<_> = paginate::<u64>(&client(), &server.uri(), Vec::new())
        .collect()
        .await;

    assert_eq!(results.len(), 6);
    assert!(results[..5].iter().all(|r| r.is_ok()));
    assert!(matches!(results[5], Err(ScanError::ParseError(_))));
    assert_eq!(requested_offsets(&server).await, [0, 5]);
}
