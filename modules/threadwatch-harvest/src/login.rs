use std::time::Duration;

use threadwatch_browser::{BrowserSession, ContextId};
use threadwatch_common::{await_login_wall, Credentials, HarvestConfig, HarvestError, SessionGate};
use tracing::{info, warn};

const IDENTIFIER_INPUT: &str = "input[name='text']";
const PASSWORD_INPUT: &str = "input[name='password']";
const STEP_PAUSE: Duration = Duration::from_secs(1);

/// Bring the primary context to a logged-in state.
///
/// With credentials, the login form is filled automatically; without, the
/// base URL is opened. Either way, if the browser still sits on a login page
/// the operator is asked to finish by hand and the gate is awaited.
pub async fn prepare_session(
    session: &dyn BrowserSession,
    config: &HarvestConfig,
    gate: &mut SessionGate,
) -> Result<(), HarvestError> {
    match config.credentials {
        Some(ref creds) => automated_login(session, config, creds).await,
        None => {
            if let Err(e) = session
                .navigate(ContextId::PRIMARY, &config.base_url, config.navigation_timeout)
                .await
            {
                warn!(url = config.base_url.as_str(), error = %e, "Could not open base URL");
            }
        }
    }
    await_login_wall(session, ContextId::PRIMARY, gate, config.login_wait).await?;
    Ok(())
}

async fn automated_login(session: &dyn BrowserSession, config: &HarvestConfig, creds: &Credentials) {
    let ctx = ContextId::PRIMARY;
    let login_url = format!("{}/login", config.base_url.trim_end_matches('/'));
    info!(url = login_url.as_str(), "Attempting automated login");

    if let Err(e) = session
        .navigate(ctx, &login_url, config.navigation_timeout)
        .await
    {
        warn!(error = %e, "Login page did not load");
        return;
    }
    tokio::time::sleep(STEP_PAUSE).await;

    for (field, selector, value) in [
        ("identifier", IDENTIFIER_INPUT, creds.email.as_str()),
        ("password", PASSWORD_INPUT, creds.password.as_str()),
    ] {
        match session.fill(ctx, selector, value).await {
            Ok(true) => {
                if let Err(e) = session.press_enter(ctx, selector).await {
                    warn!(field, error = %e, "Submitting login step failed");
                }
            }
            Ok(false) => warn!(field, "Login input not found"),
            Err(e) => warn!(field, error = %e, "Filling login input failed"),
        }
        tokio::time::sleep(STEP_PAUSE).await;
    }
}
