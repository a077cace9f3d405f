//! Session lifecycle: stored refresh token → access token, interactive login,
//! and the redirect that completes it.
//!
//! ```text
//!   Unauthenticated ──initiate_login──▶ Authenticating ──redirect──▶ Authenticated
//!         ▲   ▲                                                         │    ▲
//!         │   └────────────────────── mark_expired (HTTP 401) ──────────┘    │
//!         │                                                                   │
//!    no stored token ◀── startup / refresh ──▶ Refreshing ──exchange ok──────┘
//!                                                   │
//!                                                   └──exchange failed──▶ Failed
//! ```
//!
//! All mutation happens under one mutex and never across a network await.
//! Each transition bumps a generation counter; a refresh only applies its
//! result if nothing else moved the session while the exchange was in flight.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::{AuthClient, TokenGrant};
use crate::config::AuthorizationConfig;
use crate::error::{AuthError, StorageError};
use crate::shell::Shell;
use crate::token_store::TokenStore;

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    /// Login page opened, waiting for the redirect
    Authenticating,
    /// Holding an access token (which the server may still reject)
    Authenticated,
    /// Exchanging the refresh token
    Refreshing,
    /// Stored credentials could not be used; interactive login needed
    Failed(String),
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Unauthenticated => write!(f, "unauthenticated"),
            SessionState::Authenticating => write!(f, "authenticating"),
            SessionState::Authenticated => write!(f, "authenticated"),
            SessionState::Refreshing => write!(f, "refreshing"),
            SessionState::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "<redacted>");
        f.debug_struct("Session")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Tokens parsed out of one redirect URL fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectPayload {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl RedirectPayload {
    /// Split the fragment (text after the first `#`) into `key=value` pairs.
    /// Unknown keys are ignored; a recognized key without a usable value is
    /// an error rather than being dropped.
    pub fn parse(raw_url: &str) -> Result<Self, AuthError> {
        let (_, fragment) = raw_url
            .split_once('#')
            .ok_or_else(|| AuthError::MalformedRedirect("no fragment in redirect URL".to_string()))?;

        let mut payload = RedirectPayload::default();
        for pair in fragment.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => (pair, None),
            };
            if !matches!(key, "access_token" | "refresh_token" | "expires_in") {
                continue;
            }

            let value = match value {
                Some(v) if !v.is_empty() => urlencoding::decode(v)
                    .map_err(|_| AuthError::MalformedRedirect(format!("{} is not valid UTF-8", key)))?
                    .into_owned(),
                _ => return Err(AuthError::MalformedRedirect(format!("{} has no value", key))),
            };

            match key {
                "access_token" => payload.access_token = Some(value),
                "refresh_token" => payload.refresh_token = Some(value),
                _ => {
                    let secs = value
                        .parse::<i64>()
                        .map_err(|_| AuthError::MalformedRedirect(format!("expires_in is not a number: {}", value)))?;
                    if secs <= 0 || expiry_from(secs).is_none() {
                        return Err(AuthError::MalformedRedirect(format!("expires_in out of range: {}", secs)));
                    }
                    payload.expires_in = Some(secs);
                }
            }
        }

        if payload.access_token.is_none() && payload.refresh_token.is_none() {
            return Err(AuthError::MalformedRedirect("redirect carried no tokens".to_string()));
        }
        Ok(payload)
    }
}

struct Inner {
    session: Session,
    state: SessionState,
    generation: u64,
}

impl Inner {
    fn transition(&mut self, state: SessionState) -> SessionState {
        if self.state != state {
            tracing::info!(from = %self.state, to = %state, "Session transition");
        }
        self.state = state.clone();
        self.generation += 1;
        state
    }
}

pub struct SessionManager {
    inner: Mutex<Inner>,
    config: AuthorizationConfig,
    auth: AuthClient,
    store: TokenStore,
    shell: Arc<dyn Shell>,
}

impl SessionManager {
    pub fn new(
        config: AuthorizationConfig,
        auth: AuthClient,
        store: TokenStore,
        shell: Arc<dyn Shell>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                session: Session::default(),
                state: SessionState::Unauthenticated,
                generation: 0,
            }),
            config,
            auth,
            store,
            shell,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner.lock().await.session.access_token.clone()
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.lock().await.session.clone()
    }

    /// True when the access token is known to expire within the margin and
    /// there is a refresh token to exchange. Tokens without a reported
    /// lifetime are only refreshed after a 401.
    pub async fn needs_refresh(&self) -> bool {
        let inner = self.inner.lock().await;
        let expiring = match (&inner.session.access_token, inner.session.expires_at) {
            (Some(_), Some(expires_at)) => expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) < Utc::now(),
            _ => false,
        };
        expiring && (inner.session.refresh_token.is_some() || self.store.load().is_ok())
    }

    /// Restore the session from the stored refresh token, if any. Never
    /// fails: on any problem the session falls back to needing a login.
    pub async fn startup(&self) -> SessionState {
        {
            let inner = self.inner.lock().await;
            if inner.session.access_token.is_some() {
                tracing::debug!("Already authenticated at startup");
                return inner.state.clone();
            }
        }

        if let Err(e) = self.refresh().await {
            tracing::info!(error = %e, "Could not restore session; interactive login required");
        }
        self.state().await
    }

    /// Exchange the refresh token (in memory, else from the store) for a new
    /// access token. This is the only retry point for a failed exchange.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let (refresh_token, config, generation) = {
            let mut inner = self.inner.lock().await;

            let refresh_token = match inner.session.refresh_token.clone() {
                Some(t) => t,
                None => match self.store.load() {
                    Ok(creds) => creds.refresh_token,
                    Err(StorageError::NotFound) if inner.session.access_token.is_some() => {
                        tracing::info!("No refresh token; keeping current access token");
                        return Err(AuthError::Storage(StorageError::NotFound));
                    }
                    Err(StorageError::NotFound) => {
                        tracing::info!("No stored refresh token");
                        let state = inner.transition(SessionState::Unauthenticated);
                        drop(inner);
                        self.notify_login_required(&state);
                        return Err(AuthError::Storage(StorageError::NotFound));
                    }
                    Err(e) if inner.session.access_token.is_some() => {
                        tracing::warn!(error = %e, "Stored refresh token unusable; keeping current access token");
                        return Err(AuthError::Storage(e));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Stored refresh token unusable");
                        let state = inner.transition(SessionState::Failed(e.to_string()));
                        drop(inner);
                        self.notify_login_required(&state);
                        return Err(AuthError::Storage(e));
                    }
                },
            };
            inner.session.refresh_token = Some(refresh_token.clone());

            let config = match self.config.resolve() {
                Ok(c) => c,
                Err(e) if inner.session.access_token.is_some() => {
                    tracing::error!(error = %e, "Configuration error; keeping current access token");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Configuration error; cannot refresh");
                    let state = inner.transition(SessionState::Failed(e.to_string()));
                    drop(inner);
                    self.notify_login_required(&state);
                    return Err(e);
                }
            };

            let state = inner.transition(SessionState::Refreshing);
            let generation = inner.generation;
            drop(inner);
            self.shell.session_changed(&state);
            (refresh_token, config, generation)
        };

        let result = self.auth.exchange_refresh_token(&config, &refresh_token).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            tracing::debug!("Refresh result superseded by a newer transition");
            return result.map(|_| ());
        }

        match result {
            Ok(grant) => {
                let rotated = apply_grant(&mut inner.session, grant);
                let state = inner.transition(SessionState::Authenticated);
                drop(inner);

                if let Some(token) = rotated {
                    if let Err(e) = self.store.save(&token) {
                        tracing::warn!(error = %e, "Could not persist rotated refresh token");
                    }
                }
                self.shell.session_changed(&state);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Refresh token exchange failed");
                if inner.session.access_token.is_some() {
                    // The previous token may still be good; keep using it
                    let state = inner.transition(SessionState::Authenticated);
                    drop(inner);
                    self.shell.session_changed(&state);
                } else {
                    let state = inner.transition(SessionState::Failed(e.to_string()));
                    drop(inner);
                    self.notify_login_required(&state);
                }
                Err(e)
            }
        }
    }

    /// Open the login page. Only meaningful while logged out.
    pub async fn initiate_login(&self) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Unauthenticated | SessionState::Failed(_) => {}
            ref other => {
                tracing::info!(state = %other, "Ignoring login request");
                return Ok(());
            }
        }

        let config = self.config.resolve().inspect_err(|e| {
            tracing::error!(error = %e, "Configuration error; cannot start login");
        })?;

        let url = AuthClient::build_authorization_url(&config);
        if let Err(e) = self.shell.open_url(&url) {
            tracing::warn!(error = %e, %url, "Could not open browser; open the login URL manually");
        }
        let state = inner.transition(SessionState::Authenticating);
        drop(inner);
        self.shell.session_changed(&state);
        Ok(())
    }

    /// Apply the tokens carried by an authorization redirect. Accepted in
    /// any state so late or duplicate redirects are harmless.
    pub async fn handle_redirect(&self, raw_url: &str) -> Result<SessionState, AuthError> {
        let payload = RedirectPayload::parse(raw_url).inspect_err(|e| {
            tracing::warn!(error = %e, "Rejected redirect");
        })?;

        let mut inner = self.inner.lock().await;
        let changed = if let Some(access_token) = payload.access_token {
            inner.session.access_token = Some(access_token);
            inner.session.expires_at = payload.expires_in.and_then(expiry_from);
            Some(inner.transition(SessionState::Authenticated))
        } else {
            None
        };
        if let Some(ref token) = payload.refresh_token {
            inner.session.refresh_token = Some(token.clone());
        }
        let state = inner.state.clone();
        drop(inner);

        if let Some(ref state) = changed {
            self.shell.session_changed(state);
        }
        if let Some(token) = payload.refresh_token {
            self.store.save(&token)?;
        }
        Ok(state)
    }

    /// The server rejected the access token. Drop it; the refresh token stays.
    pub async fn mark_expired(&self) {
        let mut inner = self.inner.lock().await;
        if inner.session.access_token.take().is_none() {
            return;
        }
        inner.session.expires_at = None;
        let state = inner.transition(SessionState::Unauthenticated);
        drop(inner);
        self.shell.session_changed(&state);
    }

    /// Forget every token, in memory and on disk.
    pub async fn logout(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        inner.session = Session::default();
        let state = inner.transition(SessionState::Unauthenticated);
        drop(inner);

        let cleared = self.store.clear();
        self.notify_login_required(&state);
        cleared
    }

    fn notify_login_required(&self, state: &SessionState) {
        self.shell.session_changed(state);
        self.shell.login_required();
    }
}

/// `now + secs`, or `None` when that is not representable.
fn expiry_from(secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}

/// Store a grant in the session; returns the rotated refresh token, if any.
fn apply_grant(session: &mut Session, grant: TokenGrant) -> Option<String> {
    session.access_token = Some(grant.access_token);
    session.expires_at = grant.expires_in.and_then(|secs| {
        let expiry = expiry_from(secs);
        if expiry.is_none() {
            tracing::warn!(expires_in = secs, "Ignoring out-of-range token lifetime");
        }
        expiry
    });
    match grant.refresh_token {
        Some(token) if session.refresh_token.as_deref() != Some(token.as_str()) => {
            session.refresh_token = Some(token.clone());
            Some(token)
        }
        _ => None,
    }
}
