use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A queue payload that is not a valid inbound event.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ParleyError {
    /// Short error code string used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ParleyError::Config(_) => "CONFIG_ERROR",
            ParleyError::Decode(_) => "DECODE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
