//! HttpFetcher against a local one-shot HTTP server

use mfehost::config::LoaderConfig;
use mfehost::loader::{AssetFetcher, AssetKind, FetchError, HttpFetcher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve exactly one request with the given status line and body; returns the base URL
async fn serve_once(status: &'static str, content_type: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_fetch_success() {
    let base = serve_once("200 OK", "text/javascript", "customElements.define('x', X);").await;
    let fetcher = HttpFetcher::new(&LoaderConfig::default()).unwrap();

    let url = format!("{}/main.js", base);
    let asset = fetcher.fetch(&url, AssetKind::Code).await.unwrap();

    assert_eq!(asset.url, url);
    assert_eq!(asset.kind, AssetKind::Code);
    assert_eq!(asset.content_type, "text/javascript");
    assert_eq!(asset.body, b"customElements.define('x', X);");
}

#[tokio::test]
async fn test_fetch_error_status() {
    let base = serve_once("404 Not Found", "text/plain", "missing").await;
    let fetcher = HttpFetcher::new(&LoaderConfig::default()).unwrap();

    let err = fetcher
        .fetch(&format!("{}/styles.css", base), AssetKind::Style)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_fetch_rejects_oversized_asset() {
    let base = serve_once("200 OK", "text/css", ".a { color: red; } .b { color: blue; }").await;
    let config = LoaderConfig {
        max_asset_bytes: 8,
        ..Default::default()
    };
    let fetcher = HttpFetcher::new(&config).unwrap();

    let err = fetcher
        .fetch(&format!("{}/styles.css", base), AssetKind::Style)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::TooLarge { limit: 8, .. }));
}

#[tokio::test]
async fn test_fetch_connection_refused() {
    // bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let fetcher = HttpFetcher::new(&LoaderConfig::default()).unwrap();
    let err = fetcher
        .fetch(&format!("http://{}/main.js", addr), AssetKind::Code)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Network { .. }));
}
