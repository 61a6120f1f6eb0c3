use std::time::Duration;

use threadwatch_browser::{BrowserSession, ContextId};
use threadwatch_common::{ConversationRecord, HarvestConfig, HarvestError, StatusLink};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::extract::{read_post, POST_SELECTOR};
use crate::StopReason;

/// Tail of the thread budget kept back for closing the context.
const CLOSE_RESERVE: Duration = Duration::from_secs(2);

/// Posts collected for one thread and why collection ended.
#[derive(Debug)]
pub struct Traversal {
    pub conversation: ConversationRecord,
    pub stop: StopReason,
}

/// Collect up to `config.max_thread_posts` unique posts from `link` in a
/// fresh context, within `config.thread_budget`.
///
/// Never fails: navigation or driver errors end the traversal early and
/// whatever was collected is returned. Opening, collecting and closing all
/// share the one budget; the last `CLOSE_RESERVE` of it belongs to closing.
pub async fn traverse_thread(
    session: &dyn BrowserSession,
    config: &HarvestConfig,
    link: &StatusLink,
) -> Traversal {
    let started = Instant::now();
    let deadline = started + config.thread_budget;
    let collect_deadline = started + config.thread_budget.saturating_sub(CLOSE_RESERVE);
    let mut conversation = ConversationRecord::new(link.clone());

    let ctx = match tokio::time::timeout_at(collect_deadline, session.new_isolated_context()).await
    {
        Ok(Ok(ctx)) => ctx,
        Ok(Err(e)) => {
            warn!(link = %link, error = %e, "Could not open a context for thread");
            return Traversal {
                conversation,
                stop: StopReason::Exhausted,
            };
        }
        Err(_) => {
            warn!(link = %link, "Opening a context for thread timed out");
            return Traversal {
                conversation,
                stop: StopReason::DeadlineExceeded,
            };
        }
    };

    let collect = collect_posts(session, config, ctx, link, &mut conversation);
    let stop = match tokio::time::timeout_at(collect_deadline, collect).await {
        Ok(Ok(stop)) => stop,
        Ok(Err(e)) => {
            warn!(link = %link, error = %e, "Thread traversal ended early");
            StopReason::Exhausted
        }
        Err(_) => StopReason::DeadlineExceeded,
    };

    match tokio::time::timeout_at(deadline, session.close_context(ctx)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(link = %link, %ctx, error = %e, "Failed to close thread context"),
        Err(_) => warn!(link = %link, %ctx, "Closing thread context timed out"),
    }

    info!(
        link = %link,
        posts = conversation.len(),
        ?stop,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Thread collected"
    );
    Traversal { conversation, stop }
}

async fn collect_posts(
    session: &dyn BrowserSession,
    config: &HarvestConfig,
    ctx: ContextId,
    link: &StatusLink,
    conversation: &mut ConversationRecord,
) -> Result<StopReason, HarvestError> {
    let max = config.max_thread_posts;

    session
        .navigate(ctx, link.as_str(), config.navigation_timeout)
        .await
        .map_err(|e| HarvestError::Navigation {
            url: link.to_string(),
            reason: e.to_string(),
        })?;
    tokio::time::sleep(config.thread_settle).await;

    loop {
        let handles = session
            .query_all(ctx, POST_SELECTOR)
            .await
            .map_err(|e| HarvestError::Navigation {
                url: link.to_string(),
                reason: e.to_string(),
            })?;

        for handle in &handles {
            if conversation.len() >= max {
                break;
            }
            let Some(post) = read_post(session, handle).await else {
                continue;
            };
            if !conversation.push_unique(post) {
                debug!(index = handle.index, "Duplicate or unidentified post skipped");
            }
        }

        if conversation.len() >= max {
            return Ok(StopReason::TargetReached);
        }

        session
            .scroll_by_viewport(ctx)
            .await
            .map_err(|e| HarvestError::Navigation {
                url: link.to_string(),
                reason: e.to_string(),
            })?;
        tokio::time::sleep(config.thread_scroll_pause).await;
    }
}
