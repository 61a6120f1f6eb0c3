//! End-to-end harvest runs against a scripted browser.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use threadwatch_browser::testing::{MockPage, MockSession};
use threadwatch_common::{HarvestConfig, Query, SessionGate};
use threadwatch_harvest::{search_url, Harvester, RunOutcome, POST_SELECTOR};

const BASE: &str = "https://x.com";

fn post(user: &str, id: u64, text: &str) -> String {
    format!(
        r#"<article data-testid="tweet">
             <div data-testid="User-Name"><a href="/{user}"><span>{user}</span></a></div>
             <a href="/{user}/status/{id}"><time datetime="2024-01-0{day}T12:00:00.000Z">t</time></a>
             <div data-testid="tweetText">{text}</div>
           </article>"#,
        day = (id % 9) + 1
    )
}

fn thread_url(user: &str, id: u64) -> String {
    format!("{BASE}/{user}/status/{id}")
}

fn config(dir: &Path) -> HarvestConfig {
    HarvestConfig {
        queries: vec![Query::new("Lula ONU", "pt"), Query::new("Lula UN", "pt")],
        links_per_query: 3,
        discovery_budget: Duration::from_secs(5),
        thread_budget: Duration::from_secs(5),
        output_dir: dir.to_path_buf(),
        file_stem: "hits".to_string(),
        ..HarvestConfig::default()
    }
}

/// First query finds three threads; the second thread has a reply by `grok_ai`.
fn scripted_site(config: &HarvestConfig) -> MockSession {
    let first = search_url(BASE, &config.queries[0]).unwrap();
    MockSession::new()
        .on_page(BASE, MockPage::new())
        .on_page(
            &first,
            MockPage::new().with_elements(
                POST_SELECTOR,
                vec![
                    post("ana", 1, "Lula discursou na ONU"),
                    post("bia", 2, "O que ele disse?"),
                    post("caio", 3, "Assisti ao vivo"),
                ],
            ),
        )
        .on_page(
            &thread_url("ana", 1),
            MockPage::new().with_elements(
                POST_SELECTOR,
                vec![post("ana", 1, "Lula discursou na ONU"), post("davi", 11, "concordo")],
            ),
        )
        .on_page(
            &thread_url("bia", 2),
            MockPage::new().with_elements(
                POST_SELECTOR,
                vec![
                    post("bia", 2, "O que ele disse?"),
                    post("edu", 21, "alguém sabe?"),
                    post("grok_ai", 22, "Ele falou sobre clima e paz."),
                ],
            ),
        )
        .on_page(
            &thread_url("caio", 3),
            MockPage::new().with_elements(POST_SELECTOR, vec![post("caio", 3, "Assisti ao vivo")]),
        )
}

#[tokio::test(start_paused = true)]
async fn end_to_end_single_match_from_first_query() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let session = Arc::new(scripted_site(&config));
    let harvester = Harvester::new(session.clone(), Arc::new(config));
    let (_trigger, mut gate) = SessionGate::channel();

    let report = harvester.run(&mut gate, std::future::pending()).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.results.len(), 1);
    let hit = &report.results[0];
    assert_eq!(hit.query, "Lula ONU lang:pt");
    assert_eq!(hit.grok_user.as_deref(), Some("grok_ai"));
    assert_eq!(hit.grok_tweet_id.as_deref(), Some("22"));
    assert_eq!(hit.root_tweet_id.as_deref(), Some("2"));
    assert_eq!(hit.root_user.as_deref(), Some("bia"));
    assert_eq!(hit.conversation.len(), 3);

    assert_eq!(report.stats.queries_run, 2);
    assert_eq!(report.stats.links_discovered, 3);
    assert_eq!(report.stats.matches, 1);
    assert_eq!(report.final_files.written.len(), 2);
    assert!(report.final_files.written.iter().all(|p| p.exists()));

    assert!(session.is_shut_down());
    assert_eq!(session.opened_contexts(), session.closed_contexts());
}

#[tokio::test(start_paused = true)]
async fn failed_query_is_skipped_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.queries.reverse();
    let failing = search_url(BASE, &config.queries[0]).unwrap();
    let session = Arc::new(scripted_site(&config).fail_navigation(&failing, usize::MAX));
    let harvester = Harvester::new(session.clone(), Arc::new(config));
    let (_trigger, mut gate) = SessionGate::channel();

    let report = harvester.run(&mut gate, std::future::pending()).await;

    assert_eq!(report.stats.queries_skipped, 1);
    assert_eq!(report.stats.queries_run, 1);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].query, "Lula ONU lang:pt");
}

#[tokio::test(start_paused = true)]
async fn interrupt_still_writes_final_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarvestConfig {
        thread_budget: Duration::from_secs(30),
        ..config(dir.path())
    };
    let session = Arc::new(
        scripted_site(&config).slow_navigation(&thread_url("caio", 3), Duration::from_secs(25)),
    );
    let harvester = Harvester::new(session.clone(), Arc::new(config));
    let (_trigger, mut gate) = SessionGate::channel();

    // Threads 1 and 2 take the full 30s budget each; interrupt during thread 3.
    let interrupt = tokio::time::sleep(Duration::from_secs(70));
    let report = harvester.run(&mut gate, interrupt).await;

    assert_eq!(report.outcome, RunOutcome::Interrupted);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.final_files.written.len(), 2);
    assert!(session.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn panic_mid_run_writes_final_files_then_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    // The third thread panics after the second one produced the match.
    let session = Arc::new(scripted_site(&config).panic_on_navigation(&thread_url("caio", 3)));
    let harvester = Harvester::new(session.clone(), Arc::new(config));
    let (_trigger, mut gate) = SessionGate::channel();

    let result = AssertUnwindSafe(harvester.run(&mut gate, std::future::pending()))
        .catch_unwind()
        .await;

    assert!(result.is_err());
    assert!(session.is_shut_down());
    let finals: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.starts_with("hits_") && !name.contains("partial"))
        .collect();
    assert_eq!(finals.len(), 2);
    assert!(finals.iter().any(|n| n.ends_with(".parquet")));
    assert!(finals.iter().any(|n| n.ends_with(".csv")));
}

#[tokio::test(start_paused = true)]
async fn checkpoint_written_during_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarvestConfig {
        checkpoint_every: 1,
        ..config(dir.path())
    };
    let session = Arc::new(scripted_site(&config));
    let harvester = Harvester::new(session, Arc::new(config));
    let (_trigger, mut gate) = SessionGate::channel();

    let report = harvester.run(&mut gate, std::future::pending()).await;

    assert_eq!(report.stats.checkpoints_written, 1);
    assert!(dir.path().join("hits_partial.parquet").exists());
}

#[tokio::test(start_paused = true)]
async fn no_matches_writes_no_final_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarvestConfig {
        target_marker: "nobody-says-this".to_string(),
        ..config(dir.path())
    };
    let session = Arc::new(scripted_site(&config));
    let harvester = Harvester::new(session.clone(), Arc::new(config));
    let (_trigger, mut gate) = SessionGate::channel();

    let report = harvester.run(&mut gate, std::future::pending()).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.results.is_empty());
    assert!(report.final_files.written.is_empty());
    assert!(session.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn login_timeout_fails_run_but_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarvestConfig {
        login_wait: threadwatch_common::LoginWait::Bounded(Duration::from_secs(10)),
        ..config(dir.path())
    };
    let session = Arc::new(
        MockSession::new().on_page(BASE, MockPage::new().redirecting_to("https://x.com/i/flow/login")),
    );
    let harvester = Harvester::new(session.clone(), Arc::new(config));
    let (_trigger, mut gate) = SessionGate::channel();

    let report = harvester.run(&mut gate, std::future::pending()).await;

    assert!(matches!(report.outcome, RunOutcome::Failed(_)));
    assert!(session.is_shut_down());
}
