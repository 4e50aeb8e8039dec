//! Google Cloud clients: service account auth, Pub/Sub pull subscriber and
//! the Dialogflow intent resolver.

pub mod auth;
pub mod dialogflow;
pub mod pubsub;
pub mod resolver;

pub use auth::{AuthError, ServiceAccountAuth, StaticToken, TokenSource};
pub use dialogflow::DialogflowResolver;
pub use pubsub::{MessageSource, PubSubError, ReceivedMessage, SubscriptionClient};
pub use resolver::{IntentResolver, ResolveError};
