/// Errors produced when delivering a message through the Send API.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Transport failure. The request URL is stripped since it carries the
    /// page access token.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Send API error ({status}): {message}")]
    Api { status: u16, message: String },
}
