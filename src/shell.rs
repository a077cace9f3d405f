//! The boundary between the core and whatever hosts it (menu bar, tray icon,
//! hotkey daemon, the bundled CLI).
//!
//! A host feeds [`HostEvent`]s in and implements [`Shell`] to hear back.

use anyhow::Result;

use crate::error::ApiError;
use crate::session::SessionState;

/// Callbacks the core makes into its host.
pub trait Shell: Send + Sync {
    /// Open the login page in the user's browser.
    fn open_url(&self, url: &str) -> Result<()>;

    /// The session moved to a new state (e.g. enable playback controls).
    fn session_changed(&self, _state: &SessionState) {}

    /// Show the "connect your account" affordance.
    fn login_required(&self) {}

    /// A user-triggered playback action failed.
    fn playback_failed(&self, _error: &ApiError) {}
}

/// Events a host delivers to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    PlayPause,
    Next,
    Previous,
    /// Raw URL intercepted by the OS URL-scheme handler
    Redirect(String),
}

impl HostEvent {
    /// Name safe to log; redirect URLs carry tokens.
    pub fn kind(&self) -> &'static str {
        match self {
            HostEvent::PlayPause => "playpause",
            HostEvent::Next => "next",
            HostEvent::Previous => "previous",
            HostEvent::Redirect(_) => "redirect",
        }
    }
}

impl std::str::FromStr for HostEvent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (word, rest) = match s.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (s, ""),
        };
        match word.to_lowercase().as_str() {
            "playpause" | "play" | "pause" | "toggle" => Ok(HostEvent::PlayPause),
            "next" => Ok(HostEvent::Next),
            "previous" | "prev" => Ok(HostEvent::Previous),
            "redirect" if !rest.is_empty() => Ok(HostEvent::Redirect(rest.to_string())),
            "redirect" => Err(anyhow::anyhow!("redirect needs a URL")),
            _ => Err(anyhow::anyhow!("Unknown event: {}", s)),
        }
    }
}

/// Host used by the bundled binary: opens the system browser and reports
/// state changes on stderr through tracing.
#[derive(Debug, Default)]
pub struct BrowserShell;

impl Shell for BrowserShell {
    fn open_url(&self, url: &str) -> Result<()> {
        webbrowser::open(url)?;
        Ok(())
    }

    fn session_changed(&self, state: &SessionState) {
        tracing::info!(%state, "Session state changed");
    }

    fn login_required(&self) {
        tracing::warn!("Not connected; run `mediakeys login` to connect your Spotify account");
    }

    fn playback_failed(&self, error: &ApiError) {
        tracing::error!(%error, "Playback command failed");
    }
}
