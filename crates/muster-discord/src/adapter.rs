use std::sync::Arc;
use std::time::Duration;

use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tracing::{error, info, warn};

use muster_core::config::DiscordConfig;

use crate::context::MusterContext;
use crate::error::DiscordError;
use crate::handler::MusterHandler;

/// Discord gateway adapter.
///
/// Wraps a serenity `Client` and reconnects whenever the gateway drops.
/// Countdown edits go through a separate REST client and keep working
/// while the gateway is down.
pub struct DiscordAdapter {
    ctx: Arc<MusterContext>,
    config: DiscordConfig,
}

impl DiscordAdapter {
    pub fn new(config: &DiscordConfig, ctx: Arc<MusterContext>) -> Result<Self, DiscordError> {
        if config.bot_token.trim().is_empty() {
            return Err(DiscordError::NoToken);
        }
        Ok(Self {
            ctx,
            config: config.clone(),
        })
    }

    /// Connect and keep reconnecting. Never returns.
    pub async fn run(self) {
        // Button presses arrive as interactions; guild messages are not read.
        let intents = GatewayIntents::GUILDS;

        loop {
            let mut client = loop {
                match self.build_client(intents).await {
                    Ok(c) => break c,
                    Err(e) => {
                        error!(error = %e, "Discord: connect failed, retrying in 30s");
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            };

            info!("Discord: gateway connecting");
            if let Err(e) = client.start().await {
                warn!(error = %e, "Discord: gateway error, reconnecting in 5s");
            } else {
                info!("Discord: gateway stopped cleanly, reconnecting in 5s");
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    async fn build_client(&self, intents: GatewayIntents) -> Result<Client, DiscordError> {
        let handler = MusterHandler {
            ctx: Arc::clone(&self.ctx),
            config: self.config.clone(),
        };
        Ok(Client::builder(&self.config.bot_token, intents)
            .event_handler(handler)
            .await?)
    }
}
