use std::collections::HashSet;

use threadwatch_browser::{BrowserSession, ContextId};
use threadwatch_common::{HarvestConfig, Query, StatusLink};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::extract::{extract_status_href, POST_SELECTOR};
use crate::StopReason;

/// Unique thread links found for one query, in discovery order.
#[derive(Debug)]
pub struct Discovery {
    pub links: Vec<StatusLink>,
    pub stop: StopReason,
    pub rounds: usize,
}

/// Scroll the open search results and collect unique status links until
/// `config.discovery_target()` links are known or the discovery budget runs out.
pub async fn discover_links(
    session: &dyn BrowserSession,
    config: &HarvestConfig,
    query: &Query,
) -> Discovery {
    let target = config.discovery_target();
    let started = Instant::now();
    let deadline = started + config.discovery_budget;

    let mut links = Vec::new();
    let mut seen = HashSet::new();
    let mut rounds = 0;

    let scan = scan_results(session, config, target, &mut links, &mut seen, &mut rounds);
    let stop = tokio::time::timeout_at(deadline, scan)
        .await
        .unwrap_or(StopReason::DeadlineExceeded);

    info!(
        query = %query,
        links = links.len(),
        rounds,
        ?stop,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Link discovery finished"
    );
    Discovery { links, stop, rounds }
}

async fn scan_results(
    session: &dyn BrowserSession,
    config: &HarvestConfig,
    target: usize,
    links: &mut Vec<StatusLink>,
    seen: &mut HashSet<StatusLink>,
    rounds: &mut usize,
) -> StopReason {
    let ctx = ContextId::PRIMARY;
    loop {
        if links.len() >= target {
            return StopReason::TargetReached;
        }
        *rounds += 1;

        match session.query_all(ctx, POST_SELECTOR).await {
            Ok(handles) => {
                for handle in handles {
                    if links.len() >= target {
                        break;
                    }
                    let html = match session.element_html(&handle).await {
                        Ok(html) => html,
                        Err(e) => {
                            warn!(index = handle.index, error = %e, "Skipping unreadable result");
                            continue;
                        }
                    };
                    let Some(link) = extract_status_href(&html)
                        .and_then(|href| StatusLink::canonicalize(&href, &config.base_url))
                    else {
                        debug!(index = handle.index, "Result without a status link");
                        continue;
                    };
                    if seen.insert(link.clone()) {
                        links.push(link);
                    }
                }
            }
            Err(e) => warn!(error = %e, "Result query failed"),
        }

        if links.len() >= target {
            return StopReason::TargetReached;
        }
        if let Err(e) = session.scroll_by_viewport(ctx).await {
            warn!(error = %e, "Scroll failed");
        }
        tokio::time::sleep(config.scroll_pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use threadwatch_browser::testing::{MockPage, MockSession};

    const SEARCH: &str = "https://x.com/search";

    fn result(user: &str, id: u64) -> String {
        format!(
            r#"<article data-testid="tweet"><a href="/{user}">{user}</a><a href="/{user}/status/{id}"><time datetime="2024-01-01T00:00:00Z">t</time></a></article>"#
        )
    }

    async fn session_with(frames: Vec<Vec<String>>) -> MockSession {
        let session = MockSession::new()
            .on_page(SEARCH, MockPage::new().with_frames(POST_SELECTOR, frames));
        session
            .navigate(ContextId::PRIMARY, SEARCH, Duration::from_secs(1))
            .await
            .unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn deduplicates_across_scrolls() {
        let session = session_with(vec![
            vec![result("a", 1), result("b", 2)],
            vec![result("b", 2), result("c", 3)],
            vec![result("c", 3), result("a", 1)],
        ])
        .await;
        let config = HarvestConfig {
            links_per_query: 3,
            ..HarvestConfig::default()
        };

        let found = discover_links(&session, &config, &Query::new("q", "pt")).await;
        assert_eq!(found.stop, StopReason::TargetReached);
        let ids: Vec<_> = found.links.iter().filter_map(|l| l.status_id()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_target() {
        let session = session_with(vec![(1..=20).map(|i| result("u", i)).collect()]).await;
        let config = HarvestConfig {
            links_per_query: 5,
            ..HarvestConfig::default()
        };

        let found = discover_links(&session, &config, &Query::new("q", "pt")).await;
        assert_eq!(found.links.len(), 5);
        assert_eq!(found.rounds, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cap_applies_over_larger_request() {
        let session = session_with(vec![(1..=250).map(|i| result("u", i)).collect()]).await;
        let config = HarvestConfig::default();

        let found = discover_links(&session, &config, &Query::new("q", "pt")).await;
        assert_eq!(found.links.len(), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_discovery_budget() {
        let session = session_with(vec![vec![result("a", 1)]]).await;
        let config = HarvestConfig::default();
        let started = Instant::now();

        let found = discover_links(&session, &config, &Query::new("q", "pt")).await;
        assert_eq!(found.stop, StopReason::DeadlineExceeded);
        assert_eq!(found.links.len(), 1);
        assert!(started.elapsed() <= Duration::from_secs(90));
        assert!(found.rounds > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_elements_are_skipped() {
        let broken = result("x", 9);
        let session = MockSession::new()
            .on_page(
                SEARCH,
                MockPage::new().with_elements(
                    POST_SELECTOR,
                    vec![broken.clone(), "<article>no link</article>".into(), result("y", 10)],
                ),
            )
            .broken_element(&broken);
        session
            .navigate(ContextId::PRIMARY, SEARCH, Duration::from_secs(1))
            .await
            .unwrap();
        let config = HarvestConfig {
            links_per_query: 1,
            ..HarvestConfig::default()
        };

        let found = discover_links(&session, &config, &Query::new("q", "pt")).await;
        assert_eq!(found.links.len(), 1);
        assert_eq!(found.links[0].status_id(), Some("10"));
    }
}
