use async_trait::async_trait;
use parley_core::types::{IntentQuery, IntentResponse};

use crate::auth::AuthError;

/// Turns a text query into the agent's fulfillment messages.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    /// Resolver name for logging and error messages.
    fn name(&self) -> &str;

    /// Run one intent detection. Responses and their messages keep the
    /// order the NLU service returned them in.
    async fn resolve(&self, query: &IntentQuery) -> Result<Vec<IntentResponse>, ResolveError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}
