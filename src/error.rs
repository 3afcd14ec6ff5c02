//! Error types for the campaign engine.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors that abort a whole campaign.
///
/// Per-recipient send failures are not represented here: they are recorded
/// in the [`CampaignReport`](crate::report::CampaignReport) and never
/// propagate.
#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("CSV must have '{column}' column")]
    Schema { column: String },

    #[error(
        "No valid recipients found in CSV. Make sure CSV has 'name' and 'phone' columns with data."
    )]
    NoValidRecipients,

    #[error("Failed to authenticate messaging session {session}")]
    Authentication { session: String },

    #[error("Messaging session unavailable: {0}")]
    Session(#[from] SessionError),
}

/// Messaging session client errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {session} failed to connect: {reason}")]
    ConnectFailed { session: String, reason: String },

    #[error("Failed to send message to {phone}: {reason}")]
    SendFailed { phone: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::Http(e.to_string())
    }
}

