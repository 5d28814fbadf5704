pub mod id;

pub use id::{ChannelRef, IdentityId, TopicName};
