//! Integration tests for crawl sessions
//!
//! Sites are served from memory by `StaticRenderer`; wiremock stands in for
//! robots.txt and for an HTTP object store.

use gleaner::batch::IssueSeverity;
use gleaner::browser::{PageRenderer, ReadinessProbe, StaticFailure, StaticPage, StaticRenderer};
use gleaner::config::{parse_config, Config};
use gleaner::crawler::{CrawlEvent, CrawlSession};
use gleaner::output::{json, FileSink, HttpObjectStore, ObjectStoreSink, RecordSink, SinkError};
use gleaner::{BatchStatus, CrawlBatch, GleanError, Tagger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FSRA_SITE: &str = r#"
[[site]]
id = "fsra"
label = "FSRA"
landing-url = "https://www.fsra.ae/news"
ready-selector = ".news-list"
item-selector = ".news-item"
detail-selectors = [".content", "main"]

[site.fields]
title = ".title"
date = ".date"
link = "a"
"#;

/// Builds a validated configuration around one `[[site]]` block
fn config(max_pages: u32, detail_concurrency: usize, extra: &str, site: &str) -> Config {
    parse_config(&format!(
        r#"
[crawler]
max-pages = {max_pages}
page-timeout-ms = 300
detail-timeout-ms = 300
inter-page-delay-min-ms = 0
inter-page-delay-max-ms = 0
detail-concurrency = {detail_concurrency}
{extra}

[retry]
max-attempts = 3
delay-ms = 10
max-delay-ms = 10

[identity]
user-agents = ["agent-a", "agent-b"]

[browser]
ready-poll-ms = 10

[output]
sink = "file"
path = "unused.json"

{site}
"#
    ))
    .unwrap()
}

fn session(config: &Config, site: &StaticRenderer) -> CrawlSession {
    let profile = config.site(None).unwrap().clone();
    let probe = ReadinessProbe::new(
        &config.browser.denial_markers,
        Duration::from_millis(config.browser.ready_poll_ms),
    );
    let pages = PageRenderer::new(Arc::new(site.clone()), probe);
    CrawlSession::new(config, profile, pages, Tagger::heuristic())
}

fn list_page(items: &[(&str, &str, Option<&str>)]) -> StaticPage {
    let body: String = items
        .iter()
        .map(|(title, href, date)| {
            let date = date
                .map(|d| format!(r#"<span class="date">{}</span>"#, d))
                .unwrap_or_default();
            format!(
                r#"<li class="news-item"><a href="{}"><span class="title">{}</span></a>{}</li>"#,
                href, title, date
            )
        })
        .collect();
    StaticPage::new(
        "News",
        format!(
            r#"<html><head><title>News</title></head><body><ul class="news-list">{}</ul></body></html>"#,
            body
        ),
    )
}

fn detail_page(text: &str) -> StaticPage {
    StaticPage::new(
        "Announcement",
        format!("<html><body><main>{}</main></body></html>", text),
    )
}

/// The FSRA list page with "Circular 5" and "Notice 9"
fn fsra_site() -> StaticRenderer {
    StaticRenderer::new()
        .page(
            "https://www.fsra.ae/news",
            list_page(&[
                ("Circular 5", "/a", Some("01/02/2024")),
                ("Notice 9", "/b", None),
            ]),
        )
        .page(
            "https://www.fsra.ae/a",
            StaticPage::new(
                "Circular 5",
                r#"<html><body><nav>Home</nav><main><div class="content">New framework for digital assets.</div></main></body></html>"#,
            ),
        )
        .page(
            "https://www.fsra.ae/b",
            detail_page("Notice on anti-money laundering returns."),
        )
}

#[tokio::test]
async fn test_circular_and_notice_scenario() {
    let config = config(5, 2, "", FSRA_SITE);
    let site = fsra_site();

    let batch = session(&config, &site).collect().await.unwrap();

    assert_eq!(batch.status(), &BatchStatus::Done);
    assert_eq!(batch.metadata().pages_visited, 1);
    assert_eq!(batch.len(), 2);

    // The undated notice is kept, with a single warning for its date
    let issues = &batch.metadata().errors;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, IssueSeverity::Warning);
    assert_eq!(issues[0].message, "item 1: no date found");

    let first = &batch.records()[0];
    assert_eq!(first.title(), "Circular 5");
    assert_eq!(first.date(), "01/02/2024");
    assert_eq!(first.source(), "FSRA");
    assert_eq!(first.content(), "New framework for digital assets.");
    assert!(first.url().ends_with("/a"));
    assert!(first.tags().contains(&"digital assets".to_string()));

    let second = &batch.records()[1];
    assert_eq!(second.title(), "Notice 9");
    assert_eq!(second.date(), "");
    assert_eq!(second.content(), "Notice on anti-money laundering returns.");
    assert_eq!(site.open_contexts(), 0);
}

#[tokio::test]
async fn test_page_ceiling_on_endless_site() {
    let template_site = r#"
[[site]]
id = "endless"
label = "Endless"
landing-url = "https://endless.test/news?page=1"
ready-selector = ".news-list"
item-selector = ".news-item"

[site.fields]
title = ".title"

[site.pagination]
mode = "url-template"
template = "https://endless.test/news?page={page}"
"#;
    let config = config(3, 1, "", template_site);

    let mut site = StaticRenderer::new();
    for n in 1..=10 {
        let href = format!("/item/{}", n);
        let title = format!("Item {}", n);
        site = site
            .page(
                format!("https://endless.test/news?page={}", n),
                list_page(&[(title.as_str(), href.as_str(), None)]),
            )
            .page(
                format!("https://endless.test/item/{}", n),
                detail_page("Body text"),
            );
    }

    let batch = session(&config, &site).collect().await.unwrap();

    assert_eq!(batch.status(), &BatchStatus::Done);
    assert_eq!(batch.metadata().pages_visited, 3);
    assert_eq!(batch.len(), 3);
    let list_visits = site
        .visits()
        .iter()
        .filter(|visit| visit.url.contains("?page="))
        .count();
    assert_eq!(list_visits, 3);
}

#[tokio::test]
async fn test_page_two_timeout_keeps_page_one() {
    let template_site = r#"
[[site]]
id = "vara"
label = "VARA"
landing-url = "https://www.vara.ae/news?page=1"
ready-selector = ".news-list"
item-selector = ".news-item"

[site.fields]
title = ".title"

[site.pagination]
mode = "url-template"
template = "https://www.vara.ae/news?page={page}"
"#;
    let config = config(5, 1, "", template_site);
    let site = StaticRenderer::new()
        .page(
            "https://www.vara.ae/news?page=1",
            list_page(&[("First", "/1", None), ("Second", "/2", None)]),
        )
        .page("https://www.vara.ae/1", detail_page("One"))
        .page("https://www.vara.ae/2", detail_page("Two"))
        .page(
            "https://www.vara.ae/news?page=2",
            list_page(&[("Third", "/3", None)]),
        )
        .fail("https://www.vara.ae/news?page=2", 3, StaticFailure::Hang);

    let batch = session(&config, &site).collect().await.unwrap();

    let reason = batch.status().failure_reason().unwrap();
    assert!(reason.contains("page 2"));
    assert_eq!(batch.metadata().pages_visited, 1);

    let titles: Vec<&str> = batch.records().iter().map(|r| r.title()).collect();
    assert_eq!(titles, vec!["First", "Second"]);
    assert_eq!(batch.records()[1].content(), "Two");

    let errors: Vec<_> = batch
        .metadata()
        .errors
        .iter()
        .filter(|issue| issue.severity == IssueSeverity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].page_number, 2);
    assert!(errors[0].message.contains("timeout"));
    assert_eq!(site.open_contexts(), 0);
}

#[tokio::test]
async fn test_missing_dates_keep_items() {
    let config = config(1, 1, "", FSRA_SITE);
    let site = StaticRenderer::new()
        .page(
            "https://www.fsra.ae/news",
            list_page(&[
                ("One", "/1", Some("01/01/2024")),
                ("Two", "/2", None),
                ("Three", "/3", None),
                ("Four", "/4", Some("04/01/2024")),
            ]),
        )
        .page("https://www.fsra.ae/1", detail_page("One"))
        .page("https://www.fsra.ae/2", detail_page("Two"))
        .page("https://www.fsra.ae/3", detail_page("Three"))
        .page("https://www.fsra.ae/4", detail_page("Four"));

    let batch = session(&config, &site).collect().await.unwrap();

    assert_eq!(batch.len(), 4);
    assert_eq!(batch.records()[1].date(), "");
    assert_eq!(batch.records()[2].date(), "");
    assert_eq!(batch.records()[3].date(), "04/01/2024");

    let date_warnings = batch
        .metadata()
        .errors
        .iter()
        .filter(|issue| issue.severity == IssueSeverity::Warning)
        .filter(|issue| issue.message.contains("no date found"))
        .count();
    assert_eq!(date_warnings, 2);
    assert!(batch.status().is_done());
}

#[tokio::test]
async fn test_concurrent_details_keep_list_order() {
    let config = config(1, 4, "", FSRA_SITE);
    let mut site = StaticRenderer::new().page(
        "https://www.fsra.ae/news",
        list_page(&[
            ("One", "/1", None),
            ("Two", "/2", None),
            ("Three", "/3", None),
            ("Four", "/4", None),
            ("Five", "/5", None),
        ]),
    );
    for n in 1..=5u64 {
        // Earlier items finish last
        site = site.page(
            format!("https://www.fsra.ae/{}", n),
            detail_page(&format!("Body {}", n)).with_delay(Duration::from_millis(60 - n * 10)),
        );
    }

    let batch = session(&config, &site).collect().await.unwrap();

    let contents: Vec<&str> = batch.records().iter().map(|r| r.content()).collect();
    assert_eq!(contents, vec!["Body 1", "Body 2", "Body 3", "Body 4", "Body 5"]);
}

#[tokio::test]
async fn test_failed_detail_degrades_only_its_record() {
    let config = config(1, 2, "", FSRA_SITE);
    let site = fsra_site().fail(
        "https://www.fsra.ae/a",
        3,
        StaticFailure::Error("net::ERR_CONNECTION_RESET".to_string()),
    );

    let batch = session(&config, &site).collect().await.unwrap();

    assert!(batch.status().is_done());
    assert_eq!(batch.records()[0].content(), "");
    assert_eq!(
        batch.records()[1].content(),
        "Notice on anti-money laundering returns."
    );
    assert!(batch
        .metadata()
        .errors
        .iter()
        .any(|issue| issue.message.contains("ERR_CONNECTION_RESET")));
}

#[tokio::test]
async fn test_click_pagination_and_duplicates() {
    let click_site = r#"
[[site]]
id = "adgm"
label = "ADGM"
landing-url = "https://www.adgm.com/announcements"
ready-selector = ".news-list"
item-selector = ".news-item"

[site.fields]
title = ".title"

[site.pagination]
mode = "click"
next-selector = ".next"
"#;
    let config = config(10, 1, "", click_site);

    let page_one = StaticPage::new(
        "Announcements",
        r##"<html><body><ul class="news-list">
            <li class="news-item"><a href="/a"><span class="title">A</span></a></li>
            <li class="news-item"><a href="/b"><span class="title">B</span></a></li>
        </ul><a class="next" href="#">Next</a></body></html>"##,
    );
    let page_two = StaticPage::new(
        "Announcements",
        r##"<html><body><ul class="news-list">
            <li class="news-item"><a href="/b?utm_source=list"><span class="title">B again</span></a></li>
            <li class="news-item"><a href="/c"><span class="title">C</span></a></li>
        </ul><a class="next disabled" href="#">Next</a></body></html>"##,
    );

    let site = StaticRenderer::new()
        .page("https://www.adgm.com/announcements", page_one)
        .page("https://www.adgm.com/announcements/2", page_two)
        .link(
            "https://www.adgm.com/announcements",
            ".next",
            "https://www.adgm.com/announcements/2",
        )
        .page("https://www.adgm.com/a", detail_page("Alpha"))
        .page("https://www.adgm.com/b", detail_page("Beta"))
        .page("https://www.adgm.com/c", detail_page("Gamma"));

    let batch = session(&config, &site).collect().await.unwrap();

    assert!(batch.status().is_done());
    assert_eq!(batch.metadata().pages_visited, 2);
    let titles: Vec<&str> = batch.records().iter().map(|r| r.title()).collect();
    assert_eq!(titles, vec!["A", "B", "C"]);
    assert!(batch
        .metadata()
        .errors
        .iter()
        .any(|issue| issue.page_number == 2 && issue.message.contains("duplicate")));
    assert!(!site
        .visits()
        .iter()
        .any(|visit| visit.url.contains("utm_source")));
    assert_eq!(site.open_contexts(), 0);
}

#[tokio::test]
async fn test_cancellation_delivers_partial_batch() {
    let template_site = r#"
[[site]]
id = "fsra"
label = "FSRA"
landing-url = "https://www.fsra.ae/news?page=1"
ready-selector = ".news-list"
item-selector = ".news-item"

[site.fields]
title = ".title"

[site.pagination]
mode = "url-template"
template = "https://www.fsra.ae/news?page={page}"
"#;
    let config = config(5, 1, "", template_site);
    let site = StaticRenderer::new()
        .page(
            "https://www.fsra.ae/news?page=1",
            list_page(&[("First", "/1", None), ("Second", "/2", None)]),
        )
        .page(
            "https://www.fsra.ae/1",
            detail_page("One").with_delay(Duration::from_millis(50)),
        )
        .page("https://www.fsra.ae/2", detail_page("Two"))
        .page(
            "https://www.fsra.ae/news?page=2",
            list_page(&[("Third", "/3", None)]),
        );

    let cancel = CancellationToken::new();
    let (events, mut received) = mpsc::unbounded_channel();
    let trigger = cancel.clone();
    let listener = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(event) = received.recv().await {
            if matches!(event, CrawlEvent::PageExtracted { page_number: 1, .. }) {
                trigger.cancel();
            }
            seen.push(event);
        }
        seen
    });

    let run = session(&config, &site)
        .with_cancellation(cancel)
        .with_events(events);
    let batch = run.collect().await.unwrap();
    drop(run);
    let seen = listener.await.unwrap();

    assert_eq!(batch.status().failure_reason(), Some("cancelled"));
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.records()[0].content(), "One");
    assert_eq!(batch.records()[1].content(), "");
    assert!(!site
        .visits()
        .iter()
        .any(|visit| visit.url.ends_with("page=2")));
    assert!(matches!(
        seen.last(),
        Some(CrawlEvent::Finished { records: 2, .. })
    ));
}

#[tokio::test]
async fn test_cancellation_on_final_page_fails_run() {
    let config = config(1, 1, "", FSRA_SITE);
    let site = StaticRenderer::new()
        .page(
            "https://www.fsra.ae/news",
            list_page(&[("First", "/1", None), ("Second", "/2", None)]),
        )
        .page(
            "https://www.fsra.ae/1",
            detail_page("One").with_delay(Duration::from_millis(50)),
        )
        .page("https://www.fsra.ae/2", detail_page("Two"));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let batch = session(&config, &site)
        .with_cancellation(cancel)
        .collect()
        .await
        .unwrap();

    // No page follows, yet the run must not report success
    assert_eq!(batch.status().failure_reason(), Some("cancelled"));
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.records()[0].content(), "One");
    assert_eq!(batch.records()[1].content(), "");
    assert_eq!(site.open_contexts(), 0);
}

#[tokio::test]
async fn test_blocked_page_rotates_identity() {
    let config = config(1, 1, "", FSRA_SITE);
    let site = fsra_site().block_agent("agent-a");

    let batch = session(&config, &site).collect().await.unwrap();

    assert!(batch.status().is_done());
    assert_eq!(batch.len(), 2);

    let visits = site.visits();
    assert_eq!(visits[0].url, "https://www.fsra.ae/news");
    assert_eq!(visits[0].user_agent.as_deref(), Some("agent-a"));
    assert_eq!(visits[1].url, "https://www.fsra.ae/news");
    assert_eq!(visits[1].user_agent.as_deref(), Some("agent-b"));
    assert!(visits[2..]
        .iter()
        .all(|visit| visit.user_agent.as_deref() == Some("agent-b")));
}

#[tokio::test]
async fn test_file_sink_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("fsra.json");
    let config = config(1, 1, "", FSRA_SITE);
    let site = fsra_site();

    let outcome = session(&config, &site)
        .with_config_hash("feedface")
        .run(&FileSink::new(&output))
        .await
        .unwrap();

    assert_eq!(outcome.summary.records, 2);
    assert_eq!(outcome.receipt.records, 2);

    let stored: CrawlBatch = json::from_json(&std::fs::read(&output).unwrap()).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored.records()[0].content(), "New framework for digital assets.");
    assert_eq!(stored.metadata().config_hash.as_deref(), Some("feedface"));
    assert_eq!(stored.status(), &BatchStatus::Done);
}

#[tokio::test]
async fn test_http_object_store_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/bucket/fsra_\d{8}_\d{6}\.json$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(1, 1, "", FSRA_SITE);
    let sink = ObjectStoreSink::new(
        Box::new(HttpObjectStore::new(
            reqwest::Client::new(),
            format!("{}/bucket", server.uri()),
        )),
        "fsra",
    );

    let outcome = session(&config, &fsra_site()).run(&sink).await.unwrap();

    assert!(outcome.receipt.location.starts_with(&server.uri()));
    let requests = server.received_requests().await.unwrap();
    let stored = json::from_json(&requests[0].body).unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn test_rejected_delivery_returns_batch() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = config(1, 1, "", FSRA_SITE);
    let sink = ObjectStoreSink::new(
        Box::new(HttpObjectStore::new(reqwest::Client::new(), server.uri())),
        "fsra",
    );

    let err = session(&config, &fsra_site()).run(&sink).await.unwrap_err();
    let failure = match err {
        GleanError::Delivery(failure) => failure,
        other => panic!("expected a delivery failure, got {}", other),
    };
    assert!(matches!(failure.error, SinkError::Rejected { status: 503, .. }));

    // The same batch can be delivered elsewhere without crawling again
    let batch = failure.into_batch();
    assert_eq!(batch.len(), 2);
    let dir = tempfile::tempdir().unwrap();
    let receipt = FileSink::new(dir.path().join("retry.json"))
        .write(batch)
        .await
        .unwrap();
    assert_eq!(receipt.records, 2);
}

fn robots_site(base: &str) -> String {
    format!(
        r#"
[[site]]
id = "local"
label = "Local"
landing-url = "{base}/news"
ready-selector = ".news-list"
item-selector = ".news-item"
detail-selectors = ["main"]

[site.fields]
title = ".title"
"#
    )
}

#[tokio::test]
async fn test_robots_disallowed_detail_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;

    let base = server.uri();
    let config = config(1, 1, "respect-robots = true", &robots_site(&base));
    let site = StaticRenderer::new()
        .page(
            format!("{}/news", base),
            list_page(&[("Open", "/public/a", None), ("Closed", "/private/b", None)]),
        )
        .page(format!("{}/public/a", base), detail_page("Visible"))
        .page(format!("{}/private/b", base), detail_page("Hidden"));

    let batch = session(&config, &site).collect().await.unwrap();

    assert!(batch.status().is_done());
    assert_eq!(batch.records()[0].content(), "Visible");
    assert_eq!(batch.records()[1].content(), "");
    assert!(batch
        .metadata()
        .errors
        .iter()
        .any(|issue| issue.message.contains("disallowed by robots.txt")));
    assert!(!site
        .visits()
        .iter()
        .any(|visit| visit.url.contains("/private/")));
}

#[tokio::test]
async fn test_robots_disallowed_landing_fails_before_browsing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .mount(&server)
        .await;

    let base = server.uri();
    let config = config(1, 1, "respect-robots = true", &robots_site(&base));
    let site = StaticRenderer::new().page(
        format!("{}/news", base),
        list_page(&[("Open", "/public/a", None)]),
    );

    let result = session(&config, &site).collect().await;

    assert!(matches!(result, Err(GleanError::RobotsDenied { .. })));
    assert!(site.visits().is_empty());
}

#[tokio::test]
async fn test_missing_robots_allows_everything() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let base = server.uri();
    let config = config(1, 1, "respect-robots = true", &robots_site(&base));
    let site = StaticRenderer::new()
        .page(
            format!("{}/news", base),
            list_page(&[("Open", "/public/a", None)]),
        )
        .page(format!("{}/public/a", base), detail_page("Visible"));

    let batch = session(&config, &site).collect().await.unwrap();

    assert!(batch.status().is_done());
    assert_eq!(batch.records()[0].content(), "Visible");
}
