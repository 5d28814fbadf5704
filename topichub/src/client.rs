//! Demo client
//!
//! Drives a registry replica from a JSON actions file: registers an
//! identity when the file carries none, performs the listed subscriptions,
//! executes SEND/GET actions directly against the provider channels, and
//! finally unsubscribes.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use topichub_core::models::ChannelRef;
use topichub_core::provider::{ChannelProvider, RedisChannelProvider};

/// How long a GET action waits for a message, in seconds
const RECEIVE_WAIT_SECS: u64 = 5;

#[derive(Debug, Parser)]
#[command(name = "client", about = "drive a topichub registry from a JSON actions file")]
struct Args {
    /// JSON actions file
    #[arg(long, default_value = "demos/actions.json")]
    json: String,

    /// Registry server base URL
    #[arg(long, default_value = "http://localhost:1234")]
    server: String,

    /// Redis URL for direct channel traffic
    #[arg(long, default_value = "redis://localhost:6379")]
    redis_url: String,
}

#[derive(Debug, Deserialize)]
struct ActionsFile {
    #[serde(default)]
    user_id: String,
    /// Topics to subscribe before running the actions
    #[serde(default)]
    subscribe_topics: Vec<String>,
    /// Topics to unsubscribe after running the actions
    #[serde(default)]
    unsubscribe_topics: Vec<String>,
    /// SEND and GET actions
    #[serde(default)]
    actions: Vec<ActionItem>,
}

#[derive(Debug, Deserialize)]
struct ActionItem {
    action: String,
    topic: String,
    #[serde(default)]
    messages: Vec<String>,
    #[serde(default)]
    number: usize,
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    identity: String,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    channel: String,
}

struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}/api/{operation}", self.base_url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("error calling {operation}"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("{operation} failed with {status}: {detail}");
        }
        Ok(response.json().await?)
    }

    async fn generate_identity(&self) -> Result<String> {
        let response: IdentityResponse = self.call("identity", serde_json::json!({})).await?;
        Ok(response.identity)
    }

    async fn subscribe(&self, identity: &str, topic: &str) -> Result<String> {
        let response: ChannelResponse = self
            .call(
                "subscribe",
                serde_json::json!({"identity": identity, "topic": topic}),
            )
            .await?;
        Ok(response.channel)
    }

    async fn unsubscribe(&self, identity: &str, topic: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "unsubscribe",
                serde_json::json!({"identity": identity, "topic": topic}),
            )
            .await?;
        Ok(())
    }

    async fn resolve_channel(&self, identity: &str, topic: &str) -> Result<String> {
        let response: ChannelResponse = self
            .call(
                "channel",
                serde_json::json!({"identity": identity, "topic": topic}),
            )
            .await?;
        Ok(response.channel)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.json)
        .with_context(|| format!("failed to open actions file {}", args.json))?;
    let actions: ActionsFile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse actions file {}", args.json))?;

    let registry = RegistryClient::new(args.server.trim_end_matches('/').to_string());
    let provider: Arc<dyn ChannelProvider> = Arc::new(RedisChannelProvider::new(
        &args.redis_url,
        Duration::from_secs(5),
    )?);

    // Registration is blocking: nothing works without an identity.
    let identity = if actions.user_id.is_empty() {
        let identity = registry.generate_identity().await?;
        println!("user ID: {identity}");
        identity
    } else {
        actions.user_id.clone()
    };

    // Channel references cached per topic so each is resolved at most once.
    let mut channels: HashMap<String, String> = HashMap::new();

    for topic in &actions.subscribe_topics {
        let channel = registry.subscribe(&identity, topic).await?;
        println!("subscribed to {topic}: {channel}");
        channels.insert(topic.clone(), channel);
    }

    for item in &actions.actions {
        let channel = match channels.get(&item.topic) {
            Some(channel) => channel.clone(),
            None => {
                let channel = registry.resolve_channel(&identity, &item.topic).await?;
                channels.insert(item.topic.clone(), channel.clone());
                channel
            }
        };
        let reference = ChannelRef::from_string(channel);

        match item.action.as_str() {
            "SEND" => {
                for message in &item.messages {
                    let mut metadata = HashMap::new();
                    metadata.insert("author".to_string(), identity.clone());
                    provider.send(&reference, message, metadata).await?;
                    println!("sent message to {}", item.topic);
                }
            }
            "GET" => {
                for _ in 0..item.number {
                    let received = provider
                        .receive(&reference, Duration::from_secs(RECEIVE_WAIT_SECS))
                        .await?;
                    match received {
                        Some(message) => {
                            println!(
                                "received from {}: {} (author: {})",
                                item.topic,
                                message.body,
                                message
                                    .metadata
                                    .get("author")
                                    .map_or("unknown", String::as_str)
                            );
                            provider.delete_message(&reference, &message.handle).await?;
                        }
                        None => println!("no message on {} within {RECEIVE_WAIT_SECS}s", item.topic),
                    }
                }
            }
            other => bail!("unknown action {other:?} (expected SEND or GET)"),
        }
    }

    for topic in &actions.unsubscribe_topics {
        registry.unsubscribe(&identity, topic).await?;
        println!("unsubscribed from {topic}");
    }

    Ok(())
}
