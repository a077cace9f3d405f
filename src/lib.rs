//! Media-key control for a remote Spotify account.
//!
//! The library owns the session lifecycle (stored refresh token, interactive
//! login, redirect handling) and turns playback intents into authenticated
//! Web API calls. Menu bars, media-key listeners and URL-scheme handlers live
//! in the host and talk to the core through [`shell::Shell`] and
//! [`shell::HostEvent`].

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod playback;
pub mod session;
pub mod shell;
pub mod token_store;

pub use app::{App, Outcome};
pub use config::Config;
pub use error::{ApiError, AuthError, StorageError};
pub use session::SessionState;
pub use shell::HostEvent;
