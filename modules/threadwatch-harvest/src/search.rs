use std::time::Duration;

use threadwatch_browser::{BrowserSession, ContextId};
use threadwatch_common::{HarvestConfig, HarvestError, Query};
use tracing::{info, warn};

/// Pause between the fallback home navigation and the retry.
const FALLBACK_PAUSE: Duration = Duration::from_secs(1);

/// Search URL for `query`, ordered by latest: `<base>/search?q=...&src=typed_query&f=live`.
pub fn search_url(base_url: &str, query: &Query) -> Result<String, HarvestError> {
    let mut url = url::Url::parse(base_url)
        .map_err(|e| HarvestError::Config(format!("invalid base url {base_url:?}: {e}")))?;
    url.set_path("/search");
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("q", &query.search_text())
        .append_pair("src", "typed_query")
        .append_pair("f", "live");
    Ok(url.to_string())
}

/// Open the search results for `query` in the primary context.
///
/// A failed navigation is retried once after passing through the base URL.
/// A second failure is returned and the caller skips the query.
pub async fn open_search(
    session: &dyn BrowserSession,
    config: &HarvestConfig,
    query: &Query,
) -> Result<String, HarvestError> {
    let url = search_url(&config.base_url, query)?;
    let ctx = ContextId::PRIMARY;

    match session.navigate(ctx, &url, config.navigation_timeout).await {
        Ok(()) => return Ok(url),
        Err(e) => warn!(query = %query, error = %e, "Search navigation failed, retrying via home"),
    }

    if let Err(e) = session
        .navigate(ctx, &config.base_url, config.fallback_timeout)
        .await
    {
        warn!(url = config.base_url.as_str(), error = %e, "Fallback navigation failed");
    }
    tokio::time::sleep(FALLBACK_PAUSE).await;

    session
        .navigate(ctx, &url, config.navigation_timeout)
        .await
        .map_err(|e| HarvestError::Navigation {
            url: url.clone(),
            reason: e.to_string(),
        })?;
    info!(query = %query, "Search opened on retry");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadwatch_browser::testing::{MockPage, MockSession};

    #[test]
    fn search_url_encodes_query_and_selects_latest() {
        let url = search_url("https://x.com", &Query::new("Lula ONU", "pt")).unwrap();
        assert_eq!(
            url,
            "https://x.com/search?q=Lula+ONU+lang%3Apt&src=typed_query&f=live"
        );
    }

    #[test]
    fn search_url_encodes_quotes() {
        let url = search_url("https://x.com/", &Query::new("\"Lula na onu\"", "pt")).unwrap();
        assert!(url.starts_with("https://x.com/search?q=%22Lula+na+onu%22+lang%3Apt"));
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = search_url("not a url", &Query::new("a", "pt")).unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_search_is_retried_through_home() {
        let config = HarvestConfig::default();
        let query = Query::new("Lula ONU", "pt");
        let url = search_url(&config.base_url, &query).unwrap();
        let session = MockSession::new()
            .on_page(&url, MockPage::new())
            .fail_navigation(&url, 1);

        let opened = open_search(&session, &config, &query).await.unwrap();
        assert_eq!(opened, url);
        assert_eq!(session.navigations(), vec![url.clone(), config.base_url.clone(), url]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_failure_is_returned() {
        let config = HarvestConfig::default();
        let query = Query::new("Lula ONU", "pt");
        let url = search_url(&config.base_url, &query).unwrap();
        let session = MockSession::new().fail_navigation(&url, usize::MAX);

        let err = open_search(&session, &config, &query).await.unwrap_err();
        assert!(matches!(err, HarvestError::Navigation { .. }));
    }
}
