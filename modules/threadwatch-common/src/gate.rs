//! Session-ready gate: an external signal the pipelines await before touching
//! pages that need an authenticated session.
//!
//! The operator (or a test) fires the signal; the pipeline awaits it with the
//! configured `LoginWait`. The unbounded wait only happens when explicitly
//! configured. `await_login_wall` only waits when a context sits on a login
//! page.

use threadwatch_browser::{BrowserSession, ContextId};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::LoginWait;
use crate::error::HarvestError;

pub struct SessionGate {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Fires the gate. Each `ready()` releases one wait.
#[derive(Clone)]
pub struct GateTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl GateTrigger {
    pub fn ready(&self) {
        let _ = self.tx.send(());
    }
}

impl SessionGate {
    pub fn channel() -> (GateTrigger, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (GateTrigger { tx }, Self { rx })
    }

    /// A gate fired by the operator pressing Enter on stdin.
    pub fn stdin() -> Self {
        let (trigger, gate) = Self::channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => trigger.ready(),
                }
            }
        });
        gate
    }

    /// Wait for one signal. `reason` is shown to the operator.
    pub async fn wait(&mut self, reason: &str, wait: LoginWait) -> Result<(), HarvestError> {
        // Presses made before we were asked to wait do not count.
        while self.rx.try_recv().is_ok() {}

        info!(?wait, "{reason} Press Enter when done.");
        let signal = self.rx.recv();
        let received = match wait.as_timeout() {
            Some(limit) => match tokio::time::timeout(limit, signal).await {
                Ok(r) => r,
                Err(_) => {
                    warn!(secs = limit.as_secs(), "Session-ready signal timed out");
                    return Err(HarvestError::SessionNotReady(format!(
                        "no signal within {}s",
                        limit.as_secs()
                    )));
                }
            },
            None => signal.await,
        };

        received.ok_or_else(|| HarvestError::SessionNotReady("signal source closed".into()))
    }
}

/// If `context` shows a login page, wait for the operator's signal.
/// Returns whether a wait happened.
pub async fn await_login_wall(
    session: &dyn BrowserSession,
    context: ContextId,
    gate: &mut SessionGate,
    wait: LoginWait,
) -> Result<bool, HarvestError> {
    let url = match session.current_url(context).await {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Could not read current URL; assuming logged in");
            return Ok(false);
        }
    };
    if !url.contains("login") {
        return Ok(false);
    }
    gate.wait("Log in manually in the browser window.", wait).await?;
    info!("Session confirmed by operator");
    Ok(true)
}
