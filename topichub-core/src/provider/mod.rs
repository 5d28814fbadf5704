// Module: provider
//
// Adapters for the managed queue/topic provider. The registry only calls
// the narrow `ChannelProvider` interface; queuing, delivery and durability
// live entirely on the provider side.

pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::MemoryProvider;
pub use redis::RedisChannelProvider;
pub use traits::{ChannelProvider, ProviderMessage, QUEUE_PROTOCOL};
