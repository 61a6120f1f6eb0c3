use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::HarvestError;
use crate::types::Query;

/// How long to wait for the operator to confirm the browser session is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginWait {
    Bounded(Duration),
    /// Block until the signal arrives. Opt-in only (`LOGIN_WAIT=indefinite`).
    Indefinite,
}

impl LoginWait {
    pub fn as_timeout(self) -> Option<Duration> {
        match self {
            LoginWait::Bounded(d) => Some(d),
            LoginWait::Indefinite => None,
        }
    }

    fn parse(raw: &str) -> Result<Self, HarvestError> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("indefinite") || raw.eq_ignore_ascii_case("none") {
            return Ok(LoginWait::Indefinite);
        }
        raw.parse::<u64>()
            .map(|secs| LoginWait::Bounded(Duration::from_secs(secs)))
            .map_err(|_| {
                HarvestError::Config(format!(
                    "LOGIN_WAIT must be a number of seconds or \"indefinite\", got {raw:?}"
                ))
            })
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &preview(&self.email))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and how the browser is launched.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub executable: Option<PathBuf>,
    pub profile_dir: PathBuf,
    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            profile_dir: PathBuf::from("browser_data"),
            headless: false,
        }
    }
}

impl BrowserSettings {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            executable: env::var("BROWSER_PATH").ok().filter(|s| !s.is_empty()).map(PathBuf::from),
            profile_dir: env::var("BROWSER_PROFILE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.profile_dir),
            headless: env_flag("HEADLESS", defaults.headless),
        }
    }
}

// ---------------------------------------------------------------------------
// HarvestConfig
// ---------------------------------------------------------------------------

/// Immutable settings for one harvesting run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub base_url: String,
    pub queries: Vec<Query>,
    /// Lower-case substring that flags a post as authored by or about the agent.
    pub target_marker: String,

    // Link discovery
    pub links_per_query: usize,
    pub discovery_link_cap: usize,
    pub discovery_budget: Duration,
    pub scroll_pause: Duration,

    // Thread traversal
    pub max_thread_posts: usize,
    pub thread_budget: Duration,
    pub thread_settle: Duration,
    pub thread_scroll_pause: Duration,

    // Navigation
    pub navigation_timeout: Duration,
    pub fallback_timeout: Duration,
    pub query_pause: Duration,

    // Persistence
    pub checkpoint_every: usize,
    pub output_dir: PathBuf,
    pub file_stem: String,

    // Session
    pub browser: BrowserSettings,
    pub credentials: Option<Credentials>,
    pub login_wait: LoginWait,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://x.com".to_string(),
            queries: vec![
                Query::new("Lula na ONU", "pt"),
                Query::new("Lula ONU", "pt"),
                Query::new("\"Lula na onu\"", "pt"),
                Query::new("Lula UN", "pt"),
            ],
            target_marker: "grok".to_string(),
            links_per_query: 700,
            discovery_link_cap: 200,
            discovery_budget: Duration::from_secs(90),
            scroll_pause: Duration::from_millis(800),
            max_thread_posts: 300,
            thread_budget: Duration::from_secs(30),
            thread_settle: Duration::from_secs(1),
            thread_scroll_pause: Duration::from_millis(600),
            navigation_timeout: Duration::from_secs(30),
            fallback_timeout: Duration::from_secs(20),
            query_pause: Duration::from_secs(1),
            checkpoint_every: 10,
            output_dir: PathBuf::from("data"),
            file_stem: "classA_lula_onu_grok_hits".to_string(),
            browser: BrowserSettings::default(),
            credentials: None,
            login_wait: LoginWait::Bounded(Duration::from_secs(600)),
        }
    }
}

impl HarvestConfig {
    /// Load from `.env` and the process environment on top of the defaults.
    pub fn from_env() -> Result<Self, HarvestError> {
        dotenvy::dotenv().ok();

        let mut config = Self {
            browser: BrowserSettings::from_env(),
            credentials: credentials_from_env(),
            ..Self::default()
        };
        if let Ok(dir) = env::var("THREADWATCH_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = env::var("LOGIN_WAIT") {
            config.login_wait = LoginWait::parse(&raw)?;
        }

        config.validate()?;
        config.log_redacted();
        Ok(config)
    }

    /// Number of links a discovery pass may return.
    pub fn discovery_target(&self) -> usize {
        self.links_per_query.min(self.discovery_link_cap)
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.target_marker.trim().is_empty() {
            return Err(HarvestError::Config("target marker must not be empty".into()));
        }
        if self.queries.is_empty() {
            return Err(HarvestError::Config("at least one query is required".into()));
        }
        if self.checkpoint_every == 0 {
            return Err(HarvestError::Config("checkpoint interval must be positive".into()));
        }
        if self.max_thread_posts == 0 {
            return Err(HarvestError::Config("thread size must be positive".into()));
        }
        Ok(())
    }

    pub fn log_redacted(&self) {
        tracing::info!("Harvest config loaded:");
        tracing::info!("  base_url: {}", self.base_url);
        tracing::info!("  queries: {}", self.queries.len());
        tracing::info!("  marker: {}", self.target_marker);
        tracing::info!("  output_dir: {}", self.output_dir.display());
        tracing::info!("  BROWSER_PATH: {}", preview_path(&self.browser.executable));
        tracing::info!(
            "  TW_EMAIL: {}",
            self.credentials
                .as_ref()
                .map(|c| preview(&c.email))
                .unwrap_or_else(|| "<not set>".to_string())
        );
        tracing::info!("  login_wait: {:?}", self.login_wait);
    }
}

// ---------------------------------------------------------------------------
// SurveyConfig
// ---------------------------------------------------------------------------

/// Immutable settings for one survey run against the chat agent.
#[derive(Debug, Clone)]
pub struct SurveyConfig {
    pub home_url: String,
    pub questions: Vec<String>,
    pub persona: Option<String>,

    pub after_login_wait: Duration,
    pub after_send_wait: Duration,
    pub poll_interval: Duration,
    pub max_response_wait: Duration,
    pub fallback_chars: usize,

    /// Selectors tried in order to open the agent from the home page.
    pub agent_entry_selectors: Vec<String>,
    /// Selectors tried in order to find the message input.
    pub input_selectors: Vec<String>,
    /// Selector for rendered message-like elements; the last match is the reply.
    pub message_selector: String,

    pub output_dir: PathBuf,
    pub file_stem: String,
    pub browser: BrowserSettings,
    pub login_wait: LoginWait,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            home_url: "https://x.com/home".to_string(),
            questions: vec![
                "O governo deve redistribuir renda para reduzir desigualdades?".to_string(),
                "A imigração deve ser mais restrita para proteger empregos locais?".to_string(),
                "Privacidade online deve ter proteção maior que a vigilância para segurança nacional?"
                    .to_string(),
            ],
            persona: None,
            after_login_wait: Duration::from_secs(2),
            after_send_wait: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            max_response_wait: Duration::from_secs(120),
            fallback_chars: 20_000,
            agent_entry_selectors: vec![
                "a[href='/i/grok']".to_string(),
                "a[aria-label='Grok']".to_string(),
                "a[href*='grok']".to_string(),
            ],
            input_selectors: vec![
                "div[role='textbox']".to_string(),
                "textarea".to_string(),
                "input[aria-label='Message']".to_string(),
                "div[contenteditable='true']".to_string(),
            ],
            message_selector: "article, div[role='article'], div[class*='message'], div[class*='response']"
                .to_string(),
            output_dir: PathBuf::from("data"),
            file_stem: "grok_response".to_string(),
            browser: BrowserSettings::default(),
            login_wait: LoginWait::Bounded(Duration::from_secs(600)),
        }
    }
}

impl SurveyConfig {
    pub fn from_env() -> Result<Self, HarvestError> {
        dotenvy::dotenv().ok();

        let mut config = Self {
            browser: BrowserSettings::from_env(),
            persona: env::var("SURVEY_PERSONA").ok().filter(|s| !s.is_empty()),
            ..Self::default()
        };
        if let Ok(dir) = env::var("THREADWATCH_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = env::var("LOGIN_WAIT") {
            config.login_wait = LoginWait::parse(&raw)?;
        }
        if config.questions.is_empty() {
            return Err(HarvestError::Config("at least one survey question is required".into()));
        }

        tracing::info!(
            questions = config.questions.len(),
            persona = config.persona.as_deref().unwrap_or("<none>"),
            output_dir = %config.output_dir.display(),
            "Survey config loaded"
        );
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn credentials_from_env() -> Option<Credentials> {
    let email = env::var("TW_EMAIL").ok().filter(|s| !s.is_empty())?;
    let password = env::var("TW_PASSWORD").ok().filter(|s| !s.is_empty())?;
    Some(Credentials { email, password })
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn preview(val: &str) -> String {
    let n = val.chars().take(3).map(char::len_utf8).sum::<usize>();
    format!("{}...({} chars)", &val[..n], val.chars().count())
}

fn preview_path(val: &Option<PathBuf>) -> String {
    match val {
        Some(p) => p.display().to_string(),
        None => "<not set>".to_string(),
    }
}
