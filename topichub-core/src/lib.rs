pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod provider;
pub mod registry;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{ChannelRef, IdentityId, TopicName};
pub use provider::{ChannelProvider, ProviderMessage};
pub use registry::{IdentityRecord, QueueLifecycle, RegistryMetrics, TopicRegistry};
