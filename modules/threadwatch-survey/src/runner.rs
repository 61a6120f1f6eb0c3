//! Drives one survey through the chat agent:
//! `Idle -> PromptBuilt -> Submitted -> Polling -> Captured -> Mapped`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use threadwatch_browser::{BrowserSession, ContextId};
use threadwatch_common::{await_login_wall, MappedResponse, SessionGate, SurveyConfig};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SurveyError};
use crate::mapper::map_text_to_score;
use crate::prompt::PromptBundle;

/// Words whose appearance on the page means the agent has started answering.
pub const REPLY_TOKENS: [&str; 2] = ["discordo", "concordo"];

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on the single page read made after the reply deadline.
const FALLBACK_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Text that only the echoed prompt contains; message elements holding it
/// are the question, not the answer.
const PROMPT_ECHO_MARK: &str = "responda agora com 1 linha";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyState {
    Idle,
    PromptBuilt,
    Submitted,
    Polling,
    Captured,
    Mapped,
}

/// The captured reply. `Fallback` is a raw page prefix taken when no
/// confident reply appeared in time; it is still mapped and saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    Confident(String),
    Fallback(String),
}

impl Capture {
    pub fn text(&self) -> &str {
        match self {
            Capture::Confident(t) | Capture::Fallback(t) => t,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Capture::Fallback(_))
    }
}

#[derive(Debug)]
pub struct SurveyOutcome {
    pub response: MappedResponse,
    pub capture: Capture,
}

pub struct SurveyRunner {
    session: Arc<dyn BrowserSession>,
    config: Arc<SurveyConfig>,
    state: SurveyState,
}

impl SurveyRunner {
    pub fn new(session: Arc<dyn BrowserSession>, config: Arc<SurveyConfig>) -> Self {
        Self {
            session,
            config,
            state: SurveyState::Idle,
        }
    }

    pub fn state(&self) -> SurveyState {
        self.state
    }

    fn advance(&mut self, next: SurveyState) {
        info!(from = ?self.state, to = ?next, "Survey state");
        self.state = next;
    }

    /// Open the agent, submit every question as one prompt, wait for the
    /// reply and map it line by line.
    pub async fn run(&mut self, gate: &mut SessionGate) -> Result<SurveyOutcome> {
        self.open_agent(gate).await?;

        let prompt = PromptBundle::build(&self.config.questions, self.config.persona.as_deref());
        self.advance(SurveyState::PromptBuilt);

        let submitted_at = self.submit(&prompt).await?;
        self.advance(SurveyState::Submitted);

        tokio::time::sleep(self.config.after_send_wait).await;
        self.advance(SurveyState::Polling);
        let capture = self.poll_for_reply().await;
        if capture.is_fallback() {
            warn!(chars = capture.text().chars().count(), "No confident reply; using page text");
        }
        self.advance(SurveyState::Captured);

        let mapped = map_text_to_score(capture.text());
        let response = MappedResponse {
            id: Uuid::new_v4(),
            timestamp: submitted_at,
            persona: prompt.persona().map(String::from),
            prompt: prompt.text().to_string(),
            raw_response: capture.text().to_string(),
            parsed_lines: mapped.lines,
            mapped_scores: mapped.scores,
        };
        self.advance(SurveyState::Mapped);
        info!(
            lines = response.parsed_lines.len(),
            questions = self.config.questions.len(),
            "Survey reply mapped"
        );
        Ok(SurveyOutcome { response, capture })
    }

    async fn open_agent(&self, gate: &mut SessionGate) -> Result<()> {
        let session = self.session.as_ref();
        let ctx = ContextId::PRIMARY;
        let home = &self.config.home_url;

        session
            .navigate(ctx, home, NAVIGATION_TIMEOUT)
            .await
            .map_err(|e| SurveyError::Navigation {
                url: home.clone(),
                reason: e.to_string(),
            })?;
        await_login_wall(session, ctx, gate, self.config.login_wait).await?;
        tokio::time::sleep(self.config.after_login_wait).await;

        for selector in &self.config.agent_entry_selectors {
            match session.click(ctx, selector).await {
                Ok(true) => {
                    info!(selector = selector.as_str(), "Agent opened");
                    return Ok(());
                }
                Ok(false) => debug!(selector = selector.as_str(), "Agent entry not found"),
                Err(e) => warn!(selector = selector.as_str(), error = %e, "Agent entry click failed"),
            }
        }
        gate.wait("Open the agent chat manually.", self.config.login_wait)
            .await?;
        Ok(())
    }

    async fn submit(&self, prompt: &PromptBundle) -> Result<DateTime<Utc>> {
        let session = self.session.as_ref();
        let ctx = ContextId::PRIMARY;

        for selector in &self.config.input_selectors {
            match session.fill(ctx, selector, prompt.text()).await {
                Ok(true) => {
                    session.press_enter(ctx, selector).await?;
                    info!(selector = selector.as_str(), chars = prompt.text().len(), "Prompt sent");
                    return Ok(Utc::now());
                }
                Ok(false) => debug!(selector = selector.as_str(), "Input not found"),
                Err(e) => warn!(selector = selector.as_str(), error = %e, "Input fill failed"),
            }
        }
        Err(SurveyError::NoInput(self.config.input_selectors.clone()))
    }

    async fn poll_for_reply(&self) -> Capture {
        let deadline = Instant::now() + self.config.max_response_wait;
        let confident = tokio::time::timeout_at(deadline, async {
            loop {
                if let Some(text) = self.try_capture().await {
                    return text;
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        })
        .await;

        match confident {
            Ok(text) => Capture::Confident(text),
            Err(_) => Capture::Fallback(self.page_prefix().await),
        }
    }

    /// The newest message-like element mentioning a reply token, once the
    /// page shows one.
    async fn try_capture(&self) -> Option<String> {
        let session = self.session.as_ref();
        let ctx = ContextId::PRIMARY;

        let page = match session.page_text(ctx).await {
            Ok(text) => text.to_lowercase(),
            Err(e) => {
                warn!(error = %e, "Reading page text failed");
                return None;
            }
        };
        if !REPLY_TOKENS.iter().any(|t| page.contains(t)) {
            return None;
        }

        let handles = match session.query_all(ctx, &self.config.message_selector).await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "Message query failed");
                return None;
            }
        };
        for handle in handles.iter().rev() {
            let Ok(text) = session.element_text(handle).await else {
                continue;
            };
            let lower = text.to_lowercase();
            if lower.contains(PROMPT_ECHO_MARK) {
                continue;
            }
            if REPLY_TOKENS.iter().any(|t| lower.contains(t)) {
                return Some(text.trim().to_string());
            }
        }
        None
    }

    async fn page_prefix(&self) -> String {
        let read = self.session.page_text(ContextId::PRIMARY);
        match tokio::time::timeout(FALLBACK_READ_TIMEOUT, read).await {
            Ok(Ok(text)) => text.chars().take(self.config.fallback_chars).collect(),
            Ok(Err(e)) => {
                warn!(error = %e, "Reading page text for fallback failed");
                String::new()
            }
            Err(_) => {
                warn!("Reading page text for fallback timed out");
                String::new()
            }
        }
    }
}
