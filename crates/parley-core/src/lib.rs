pub mod config;
pub mod error;
pub mod types;

pub use config::{ParleyConfig, TextLinePolicy};
pub use error::{ParleyError, Result};
pub use types::{
    FulfillmentMessage, InboundEvent, IntentQuery, IntentResponse, OutboundPayload, QuickReply,
    SenderId,
};
