//! Listing, render and feed connectors against a local mock HTTP server.

use chrono::{TimeZone, Utc};
use headline_archiver::config::Config;
use headline_archiver::connector_feed::FeedStrategy;
use headline_archiver::connector_listing::FinvizListing;
use headline_archiver::connector_render::RenderStrategy;
use headline_archiver::error::ArchiveError;
use headline_archiver::extract::QualityIssue;
use headline_archiver::fetch::{FetchError, FetchSettings, HttpFetcher};
use headline_archiver::models::{Headline, HeadlineRecord, Strategy};
use headline_archiver::traits::{ContentStrategy, ListingSource};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING_HTML: &str = r#"<html><body>
<table class="news_table">
  <tr class="news_table-row">
    <td class="news_date-cell">Oct-18-24 09:35AM</td>
    <td><a class="nn-tab-link" href="https://www.reuters.com/markets/fed-holds">Fed holds rates steady</a>
        <span class="news_source">Reuters</span></td>
  </tr>
  <tr class="news_table-row">
    <td class="news_date-cell">09:10AM</td>
    <td><a class="nn-tab-link" href="/news/123/apple-beats">Apple beats estimates</a></td>
  </tr>
  <tr class="news_table-row">
    <td class="news_date-cell">sometime</td>
    <td><a class="nn-tab-link" href="/news/124">Unparseable time</a></td>
  </tr>
  <tr class="news_table-row">
    <td class="news_date-cell">08:00AM</td>
    <td>no link here</td>
  </tr>
</table>
</body></html>"#;

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.listing.url = format!("{}/news.ashx", server.uri());
    config.crawl.min_content_chars = 200;
    config.crawl.min_feed_chars = 40;
    config
}

fn fetcher(config: &Config) -> HttpFetcher {
    HttpFetcher::new(&FetchSettings::from_config(config)).unwrap()
}

fn record(title: &str, url: &str) -> HeadlineRecord {
    HeadlineRecord::observe(
        &Headline {
            title: title.to_string(),
            url: url.to_string(),
            source: None,
            publish_at: Utc::now(),
        },
        Utc::now(),
    )
}

fn article_page(body: &str) -> String {
    format!(
        "<html><head><title>Story</title></head><body>\
         <nav>Markets | Tech | Opinion</nav>\
         <article><h1>Story</h1>{}</article>\
         <footer>Copyright</footer></body></html>",
        body
    )
}

fn long_paragraphs() -> String {
    (0..6)
        .map(|i| {
            format!(
                "<p>Paragraph {} of the report: equity markets moved higher as investors \
                 weighed fresh economic data against central bank guidance.</p>",
                i
            )
        })
        .collect()
}

// ─── Listing ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_listing_fetch_parses_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news.ashx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING_HTML))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let listing = FinvizListing::new(&config, fetcher(&config)).unwrap();
    let headlines = listing.fetch_listing().await.unwrap();

    assert_eq!(headlines.len(), 2);
    assert_eq!(headlines[0].title, "Fed holds rates steady");
    assert_eq!(headlines[0].url, "https://www.reuters.com/markets/fed-holds");
    assert_eq!(headlines[0].source.as_deref(), Some("Reuters"));
    assert_eq!(
        headlines[0].publish_at,
        Utc.with_ymd_and_hms(2024, 10, 18, 13, 35, 0).unwrap()
    );

    // Time-only row inherits the date printed above it; relative link resolved.
    assert_eq!(headlines[1].title, "Apple beats estimates");
    assert_eq!(headlines[1].url, format!("{}/news/123/apple-beats", server.uri()));
    assert_eq!(headlines[1].source, None);
    assert_eq!(
        headlines[1].publish_at,
        Utc.with_ymd_and_hms(2024, 10, 18, 13, 10, 0).unwrap()
    );
}

#[tokio::test]
async fn test_listing_http_error_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news.ashx"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let listing = FinvizListing::new(&config, fetcher(&config)).unwrap();
    let err = listing.fetch_listing().await.unwrap_err();
    assert_eq!(err.kind(), "network");
    assert!(err.to_string().contains("503"));
}

// ─── Render ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_render_direct_extracts_article() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/markets/story"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_page(&long_paragraphs())))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let strategy = RenderStrategy::new(&config, fetcher(&config));
    let rec = record("Story", &format!("{}/markets/story", server.uri()));
    let content = strategy.fetch_content(&rec).await.unwrap();

    assert_eq!(content.strategy, Strategy::Render);
    assert_eq!(content.title.as_deref(), Some("Story"));
    assert!(content.markdown.contains("Paragraph 5 of the report"));
    assert!(!content.markdown.contains("Markets | Tech"));
    assert!(!content.markdown.contains("Copyright"));
}

#[tokio::test]
async fn test_render_refuses_paywall_stub() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/premium"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_page(
            "<p>Stocks rallied on Friday.</p><p>Subscribe to continue reading.</p>",
        )))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let strategy = RenderStrategy::new(&config, fetcher(&config));
    let err = strategy
        .fetch_content(&record("Premium", &format!("{}/premium", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::ContentQuality(QualityIssue::Paywall(_))
    ));
}

#[tokio::test]
async fn test_render_refuses_thin_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/thin"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_page("<p>Loading...</p>")))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let strategy = RenderStrategy::new(&config, fetcher(&config));
    let err = strategy
        .fetch_content(&record("Thin", &format!("{}/thin", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::ContentQuality(QualityIssue::TooShort { min: 200, .. })
    ));
}

#[tokio::test]
async fn test_render_service_posts_url_with_token() {
    let server = MockServer::start().await;
    let article_url = "https://www.wsj.com/articles/markets-rally";
    Mock::given(method("POST"))
        .and(path("/content"))
        .and(query_param("token", "s3cret"))
        .and(body_json(json!({ "url": article_url })))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_page(&long_paragraphs())))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.render.endpoint = Some(format!("{}/", server.uri()));
    config.render.token = Some("s3cret".to_string());
    let strategy = RenderStrategy::new(&config, fetcher(&config));

    let content = strategy
        .fetch_content(&record("Markets rally", article_url))
        .await
        .unwrap();
    assert!(content.markdown.contains("Paragraph 0 of the report"));
    assert!(!RenderStrategy::describe(&config).contains("s3cret"));
}

// ─── Feed ───────────────────────────────────────────────────────────

fn rss_feed(server: &MockServer) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Wire</title>
    <item>
      <title>Fed holds rates steady as inflation cools</title>
      <link>{uri}/fed</link>
      <content:encoded><![CDATA[<p>The Federal Reserve left its benchmark rate unchanged on Wednesday&nbsp;and signalled patience.</p>]]></content:encoded>
    </item>
    <item>
      <title>Oil prices slip</title>
      <link>{uri}/oil</link>
      <description>Short.</description>
    </item>
  </channel>
</rss>"#,
        uri = server.uri()
    )
}

async fn feed_server() -> MockServer {
    MockServer::start().await
}

fn feed_config(server: &MockServer) -> Config {
    let mut config = config_for(server);
    config
        .feeds
        .insert("127.0.0.1".to_string(), format!("{}/feed.xml", server.uri()));
    config
}

#[tokio::test]
async fn test_feed_matches_entry_and_caches_per_cycle() {
    let server = feed_server().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss_feed(&server)))
        .expect(2)
        .mount(&server)
        .await;

    let config = feed_config(&server);
    let strategy = FeedStrategy::new(&config, fetcher(&config));

    // Title differs in case and punctuation; the link matches.
    let by_link = record("FED HOLDS RATES STEADY, AS INFLATION COOLS", &format!("{}/fed", server.uri()));
    let content = strategy.fetch_content(&by_link).await.unwrap();
    assert_eq!(content.strategy, Strategy::Feed);
    assert!(content.markdown.contains("benchmark rate unchanged"));

    // Same cycle: served from the cache, matched by title containment.
    let by_title = record(
        "Fed holds rates steady as inflation cools - analysts",
        &format!("{}/elsewhere", server.uri()),
    );
    assert!(strategy.fetch_content(&by_title).await.is_ok());

    // Next cycle downloads the feed again.
    strategy.reset();
    assert!(strategy.fetch_content(&by_link).await.is_ok());
}

#[tokio::test]
async fn test_feed_errors_are_content_quality() {
    let server = feed_server().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss_feed(&server)))
        .mount(&server)
        .await;

    let config = feed_config(&server);
    let strategy = FeedStrategy::new(&config, fetcher(&config));

    let missing = strategy
        .fetch_content(&record("Gold hits record", &format!("{}/gold", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(
        missing,
        ArchiveError::ContentQuality(QualityIssue::NotInFeed)
    ));

    let short = strategy
        .fetch_content(&record("Oil prices slip", &format!("{}/oil", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(
        short,
        ArchiveError::ContentQuality(QualityIssue::TooShort { .. })
    ));

    let no_feed = strategy
        .fetch_content(&record("Anything", "https://unconfigured.example.org/a"))
        .await
        .unwrap_err();
    assert!(matches!(
        no_feed,
        ArchiveError::ContentQuality(QualityIssue::NoFeed(_))
    ));
}

#[tokio::test]
async fn test_feed_that_is_not_xml_is_network_error() {
    let server = feed_server().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let config = feed_config(&server);
    let strategy = FeedStrategy::new(&config, fetcher(&config));
    let err = strategy
        .fetch_content(&record("Oil prices slip", &format!("{}/oil", server.uri())))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "network");
}

// ─── Fetcher ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetcher_enforces_size_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;

    let settings = FetchSettings {
        max_bytes: 1024,
        ..FetchSettings::default()
    };
    let fetcher = HttpFetcher::new(&settings).unwrap();
    let err = fetcher
        .get_text(&format!("{}/huge", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::TooLarge { max_bytes: 1024 }));
}

#[tokio::test]
async fn test_fetcher_rejects_invalid_url() {
    let fetcher = HttpFetcher::new(&FetchSettings::default()).unwrap();
    let err = fetcher.get_text("not a url").await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidUrl(_)));
}
