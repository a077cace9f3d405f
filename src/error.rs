use thiserror::Error;

/// Failures reading or writing the persisted refresh token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("No stored credential found")]
    NotFound,
    #[error("Stored credential is corrupt: {0}")]
    CorruptData(String),
    #[error("Failed to write credential: {0}")]
    WriteFailed(String),
}

/// Failures in the login / token exchange flow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Network error talking to auth server: {0}")]
    NetworkFailure(String),
    #[error("Token exchange failed with status {0}: {1}")]
    ExchangeFailed(u16, String),
    #[error("Malformed redirect: {0}")]
    MalformedRedirect(String),
    #[error("Missing configuration value: {0}")]
    MissingConfig(&'static str),
    #[error("Could not persist refresh token: {0}")]
    Storage(#[from] StorageError),
}

/// Failures issuing a playback command against the Web API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Network error talking to Spotify: {0}")]
    NetworkFailure(String),
    #[error("Unexpected response (status {0}): {1}")]
    UnexpectedResponse(u16, String),
}

impl ApiError {
    /// True when the server rejected the access token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::UnexpectedResponse(401, _))
    }
}

/// Failures below the HTTP layer (no status line was received).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for AuthError {
    fn from(e: TransportError) -> Self {
        AuthError::NetworkFailure(e.to_string())
    }
}

impl From<TransportError> for ApiError {
    fn from(e: TransportError) -> Self {
        ApiError::NetworkFailure(e.to_string())
    }
}
