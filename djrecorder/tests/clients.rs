//! HTTP client tests against a mock station

use djrecorder::{Error, StatusClient, StatusSource, StreamClient, StreamSource};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn status_client(server: &MockServer) -> StatusClient {
    StatusClient::builder()
        .url(format!("{}/api", server.uri()))
        .idle_dj("Hanyuu-sama")
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_status_with_live_dj() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "main": {
                "np": "Artist - Song",
                "dj": { "djname": "SomeDJ", "id": 18 },
                "listeners": 120
            }
        })))
        .mount(&server)
        .await;

    let status = status_client(&server).await.fetch_status().await.unwrap();

    assert!(status.live);
    assert_eq!(status.dj, "SomeDJ");
    assert_eq!(status.now_playing, "Artist - Song");
}

#[tokio::test]
async fn test_status_with_idle_dj() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "main": { "np": "Automated", "dj": { "djname": "Hanyuu-sama" } }
        })))
        .mount(&server)
        .await;

    let status = status_client(&server).await.fetch_status().await.unwrap();

    assert!(!status.live);
    assert_eq!(status.dj, "Hanyuu-sama");
}

#[tokio::test]
async fn test_explicit_afk_flag_wins() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "main": { "np": "X", "dj": { "djname": "SomeDJ" }, "isafkstream": true }
        })))
        .mount(&server)
        .await;

    let status = status_client(&server).await.fetch_status().await.unwrap();
    assert!(!status.live);
}

#[tokio::test]
async fn test_status_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = status_client(&server).await.fetch_status().await;
    match result {
        Err(Error::Status(msg)) => assert!(msg.contains("503")),
        other => panic!("expected a status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_status_malformed_body_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = tokio_test::assert_err!(status_client(&server).await.fetch_status().await);
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_stream_requests_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/main.mp3"))
        .and(header("Icy-MetaData", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("icy-metaint", "8192")
                .set_body_bytes(vec![7u8; 64]),
        )
        .mount(&server)
        .await;

    let client = StreamClient::new(format!("{}/main.mp3", server.uri())).unwrap();
    let mut stream = client.open(true).await.unwrap();
    assert_eq!(stream.metaint(), Some(8192));

    let mut body = Vec::new();
    while let Some(chunk) = stream.next_chunk().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, vec![7u8; 64]);
}

#[tokio::test]
async fn test_stream_without_metadata_ignores_metaint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/main.mp3"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("icy-metaint", "8192")
                .set_body_bytes(vec![1u8; 16]),
        )
        .mount(&server)
        .await;

    let client = StreamClient::new(format!("{}/main.mp3", server.uri())).unwrap();
    let stream = client.open(false).await.unwrap();
    assert_eq!(stream.metaint(), None);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("icy-metadata"));
}

#[tokio::test]
async fn test_stream_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/main.mp3"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = StreamClient::new(format!("{}/main.mp3", server.uri())).unwrap();
    let err = client.open(false).await.unwrap_err();
    assert!(matches!(err, Error::Stream(_)));
    assert!(!err.is_fatal());
}
