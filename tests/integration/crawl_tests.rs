//! Integration tests for the crawler
//!
//! These tests use wiremock to serve Explorer listing pages and test the
//! full run cycle end-to-end: fetch, extract, filter and export.

use mixdb_crawler::config::{Config, CrawlerConfig, OutputConfig, SourceConfig, UserAgentConfig};
use mixdb_crawler::crawler::{
    CrawlEngine, CrawlSettings, Deduplicator, HttpFetcher, MixesDbExtractor, MAX_CRAWL_DELAY,
};
use mixdb_crawler::output::{load_exported_identifiers, read_document, ExportSink, JsonExporter, SqliteExporter};
use mixdb_crawler::storage::open_storage;
use mixdb_crawler::RunPhase;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXPLORER_PATH: &str = "/w/MixesDB:Explorer/Mixes";
const USER_AGENT: &str = "TestBot/1.0.0 (+https://example.com/contact; test@example.com)";

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, export_dir: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            target_count: 10,
            batch_size: 2,
            max_concurrent_fetches: 2,
            max_retries: 3,
            retry_base_delay_ms: 10,
            retry_max_delay_ms: 50,
            delay_between_batches: 0.0,
            quality_threshold: 0.3,
            require_tracks: true,
            max_failed_batches: 2,
            request_timeout: 5,
            ..CrawlerConfig::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        source: SourceConfig {
            base_url: base_url.to_string(),
            explorer_path: EXPLORER_PATH.to_string(),
            page_size: 2,
            respect_robots: true,
        },
        output: OutputConfig {
            export_dir: export_dir.to_string(),
            database_path: None,
        },
        genres: vec![],
    }
}

fn engine(config: &Config) -> CrawlEngine<HttpFetcher, MixesDbExtractor> {
    let fetcher = HttpFetcher::new(config).unwrap();
    let extractor = MixesDbExtractor::new(&config.source.base_url, config.source.page_size).unwrap();
    CrawlEngine::new(fetcher, extractor, config.genre_table(), CrawlSettings::from_config(config))
}

/// An Explorer page listing mixes `first..first + count`, each with a two-track list
fn listing(first: u32, count: u32) -> String {
    let mut body = String::from("<html><head><title>Explorer</title></head><body><div id=\"content\">\n");
    for i in first..first + count {
        body.push_str(&format!(
            r#"<div class="mix">
  <a href="/w/2024-05-{day:02}_-_DJ_{i}_-_Live">2024-05-{day:02} - DJ {i} - Live</a>
  <p>Duration 1:00:00 | 320 kbps</p>
  <ol>
    <li>[0:00] Artist {i}A - Opening</li>
    <li>[4:30] Artist {i}B - Closing</li>
  </ol>
</div>
"#,
            day = i % 28 + 1,
            i = i
        ));
    }
    body.push_str("</div></body></html>");
    body
}

/// Serves one listing page, only to requests carrying the configured user agent
async fn mount_page(server: &MockServer, offset: usize, body: String) {
    Mock::given(method("GET"))
        .and(path(EXPLORER_PATH))
        .and(query_param("style", "TA"))
        .and(query_param("offset", offset.to_string()))
        .and(header("user-agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn explorer_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == EXPLORER_PATH)
        .count()
}

#[tokio::test]
async fn test_full_run_reaches_target() {
    let server = MockServer::start().await;
    mount_page(&server, 0, listing(1, 2)).await;
    mount_page(&server, 2, listing(3, 2)).await;

    let mut config = create_test_config(&server.uri(), "unused");
    config.crawler.target_count = 3;
    let snapshot = engine(&config).run("Techno").await.unwrap();

    assert_eq!(snapshot.phase, RunPhase::Completed);
    assert_eq!(snapshot.records.len(), 3);
    assert_eq!(snapshot.discarded_overflow, 1);
    assert_eq!(snapshot.pages_fetched, 2);
    assert_eq!(snapshot.style_code.as_deref(), Some("TA"));

    let first = &snapshot.records[0];
    assert_eq!(first.title, "2024-05-02 - DJ 1 - Live");
    assert_eq!(first.author.as_deref(), Some("DJ 1"));
    assert!(first.url.starts_with(&server.uri()));
    assert!(first.genres.contains("Techno"));
    assert_eq!(first.tracks.len(), 2);
    assert_eq!(first.tracks[1].artist.as_deref(), Some("Artist 1B"));
    assert_eq!(first.quality_score, 1.0);
}

#[tokio::test]
async fn test_listing_end_exhausts_run() {
    let server = MockServer::start().await;
    mount_page(&server, 0, listing(1, 2)).await;
    mount_page(&server, 2, listing(3, 1)).await;

    let config = create_test_config(&server.uri(), "unused");
    let snapshot = engine(&config).run("techno").await.unwrap();

    assert_eq!(snapshot.phase, RunPhase::Exhausted);
    assert_eq!(snapshot.genre, "Techno");
    assert_eq!(snapshot.records.len(), 3);
    assert_eq!(snapshot.error_count, 0);
    assert_eq!(explorer_requests(&server).await, 2);
}

#[tokio::test]
async fn test_rate_limited_page_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EXPLORER_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(&server, 0, listing(1, 1)).await;

    let config = create_test_config(&server.uri(), "unused");
    let snapshot = engine(&config).run("Techno").await.unwrap();

    assert_eq!(snapshot.phase, RunPhase::Exhausted);
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.page_errors, 0);
    assert_eq!(explorer_requests(&server).await, 2);
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EXPLORER_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), "unused");
    let snapshot = engine(&config).run("Techno").await.unwrap();

    // Two failed batches of one page, three attempts each
    assert_eq!(snapshot.phase, RunPhase::Exhausted);
    assert_eq!(snapshot.error_count, 2);
    assert_eq!(snapshot.page_errors, 2);
    assert!(snapshot.records.is_empty());
    assert_eq!(explorer_requests(&server).await, 6);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EXPLORER_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), "unused");
    let snapshot = engine(&config).run("Techno").await.unwrap();

    assert_eq!(snapshot.error_count, 2);
    assert_eq!(explorer_requests(&server).await, 2);
}

#[tokio::test]
async fn test_robots_disallow_blocks_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /w/\n"))
        .mount(&server)
        .await;
    mount_page(&server, 0, listing(1, 2)).await;

    let config = create_test_config(&server.uri(), "unused");
    let snapshot = engine(&config).run("Techno").await.unwrap();

    assert_eq!(snapshot.phase, RunPhase::Exhausted);
    assert_eq!(snapshot.page_errors, 2);
    assert_eq!(explorer_requests(&server).await, 0);
}

async fn serve_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_robots_crawl_delay() {
    let server = MockServer::start().await;
    serve_robots(&server, "User-agent: TestBot\nCrawl-delay: 3\n").await;

    let config = create_test_config(&server.uri(), "unused");
    let fetcher = HttpFetcher::new(&config).unwrap();
    assert_eq!(fetcher.crawl_delay().await, Some(Duration::from_secs(3)));
}

#[tokio::test]
async fn test_huge_robots_crawl_delay_is_clamped() {
    let server = MockServer::start().await;
    serve_robots(&server, "User-agent: *\nCrawl-delay: 1e30\n").await;

    let config = create_test_config(&server.uri(), "unused");
    let fetcher = HttpFetcher::new(&config).unwrap();
    assert_eq!(fetcher.crawl_delay().await, Some(MAX_CRAWL_DELAY));
}

#[tokio::test]
async fn test_unknown_genre_makes_no_requests() {
    let server = MockServer::start().await;

    let config = create_test_config(&server.uri(), "unused");
    let snapshot = engine(&config).run("Polka").await.unwrap();

    assert_eq!(snapshot.phase, RunPhase::Aborted);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_exported_mixes_seed_the_next_run() {
    let server = MockServer::start().await;
    mount_page(&server, 0, listing(1, 2)).await;
    mount_page(&server, 2, listing(3, 1)).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path().to_str().unwrap());
    let engine = engine(&config);
    let exporter = JsonExporter::new(&config.output.export_dir);

    let first = engine.run("Techno").await.unwrap();
    let receipt = exporter.export(&first).unwrap();
    let document = read_document(&PathBuf::from(&receipt.location)).unwrap();
    assert_eq!(document.total_mixes, 3);
    assert_eq!(document.mixes[0].tracks.len(), 2);

    let known = load_exported_identifiers(dir.path(), "Techno").unwrap();
    assert_eq!(known.len(), 3);

    let second = engine
        .run_with("Techno", 10, Deduplicator::with_seen(known))
        .await
        .unwrap();
    assert_eq!(second.phase, RunPhase::Exhausted);
    assert!(second.records.is_empty());
    assert_eq!(second.rejections.duplicate, 3);
}

#[tokio::test]
async fn test_sqlite_export_round_trip() {
    let server = MockServer::start().await;
    mount_page(&server, 0, listing(1, 2)).await;
    mount_page(&server, 2, listing(3, 1)).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path().to_str().unwrap());
    let snapshot = engine(&config).run("Techno").await.unwrap();

    let storage = open_storage(&dir.path().join("mixes.db")).unwrap();
    let exporter = SqliteExporter::new(storage, Some("test-hash".to_string()));
    let receipt = exporter.export(&snapshot).unwrap();
    assert_eq!(receipt.records, 3);

    let known = exporter.known_identifiers("Techno").unwrap();
    for record in &snapshot.records {
        assert!(known.contains(&record.id));
    }
}
