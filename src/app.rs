//! Wires the session, the playback controller and the host shell together.
//!
//! Hosts construct one [`App`], call [`App::startup`] once, then forward
//! every [`HostEvent`] through [`App::dispatch`].

use anyhow::Result;
use std::sync::Arc;

use crate::auth::AuthClient;
use crate::config::Config;
use crate::error::{ApiError, AuthError};
use crate::http::{ReqwestTransport, Transport};
use crate::playback::{PlaybackController, Toggled};
use crate::session::{SessionManager, SessionState};
use crate::shell::{HostEvent, Shell};
use crate::token_store::TokenStore;

/// Result of one dispatched host event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Toggled(Toggled),
    Skipped,
    WentBack,
    Session(SessionState),
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Toggled(t) => write!(f, "{}", t),
            Outcome::Skipped => write!(f, "skipped to next track"),
            Outcome::WentBack => write!(f, "skipped to previous track"),
            Outcome::Session(state) => write!(f, "session {}", state),
        }
    }
}

pub struct App {
    session: Arc<SessionManager>,
    playback: PlaybackController,
    shell: Arc<dyn Shell>,
}

impl App {
    /// Production wiring: reqwest transport and the default credential location.
    pub fn new(config: &Config, shell: Arc<dyn Shell>) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.api.request_timeout())?);
        let store = TokenStore::default_location()?;
        Ok(Self::with_parts(config, transport, store, shell))
    }

    pub fn with_parts(
        config: &Config,
        transport: Arc<dyn Transport>,
        store: TokenStore,
        shell: Arc<dyn Shell>,
    ) -> Self {
        let session = Arc::new(SessionManager::new(
            config.auth.clone(),
            AuthClient::new(transport.clone()),
            store,
            shell.clone(),
        ));
        let playback = PlaybackController::new(session.clone(), transport, &config.api.base_url);
        Self {
            session,
            playback,
            shell,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub async fn startup(&self) -> SessionState {
        self.session.startup().await
    }

    pub async fn on_play_pause(&self) -> Result<Toggled, ApiError> {
        self.refresh_if_needed().await;
        let result = self.playback.toggle().await;
        self.report(result).await
    }

    pub async fn on_next(&self) -> Result<(), ApiError> {
        self.refresh_if_needed().await;
        let result = self.playback.next().await;
        self.report(result).await
    }

    pub async fn on_previous(&self) -> Result<(), ApiError> {
        self.refresh_if_needed().await;
        let result = self.playback.previous().await;
        self.report(result).await
    }

    /// Handle a redirect; a redirect that only carries a refresh token is
    /// exchanged straight away.
    pub async fn on_redirect(&self, raw_url: &str) -> Result<SessionState, AuthError> {
        let state = self.session.handle_redirect(raw_url).await?;
        if state != SessionState::Authenticated && self.session.snapshot().await.refresh_token.is_some() {
            self.session.refresh().await?;
            return Ok(self.session.state().await);
        }
        Ok(state)
    }

    pub async fn dispatch(&self, event: HostEvent) -> Result<Outcome> {
        tracing::debug!(event = event.kind(), "Host event");
        let outcome = match event {
            HostEvent::PlayPause => Outcome::Toggled(self.on_play_pause().await?),
            HostEvent::Next => {
                self.on_next().await?;
                Outcome::Skipped
            }
            HostEvent::Previous => {
                self.on_previous().await?;
                Outcome::WentBack
            }
            HostEvent::Redirect(url) => Outcome::Session(self.on_redirect(&url).await?),
        };
        Ok(outcome)
    }

    async fn refresh_if_needed(&self) {
        if self.session.needs_refresh().await {
            tracing::info!("Access token about to expire, refreshing");
            if let Err(e) = self.session.refresh().await {
                tracing::warn!(error = %e, "Proactive refresh failed");
            }
        }
    }

    /// Surface a failed action to the host. A rejected token triggers one
    /// refresh so the next key press can succeed; the action is not retried.
    async fn report<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(ref e) = result {
            self.shell.playback_failed(e);
            if e.is_unauthorized() {
                if let Err(refresh_err) = self.session.refresh().await {
                    tracing::info!(error = %refresh_err, "Re-authentication needed");
                }
            }
        }
        result
    }
}
