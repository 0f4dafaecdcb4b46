use std::sync::Arc;

use chrono::Utc;
use serenity::all::ActivityData;
use serenity::async_trait;
use serenity::builder::{CreateInteractionResponse, CreateInteractionResponseFollowup};
use serenity::model::application::{ComponentInteraction, Interaction};
use serenity::model::gateway::Ready;
use serenity::model::user::OnlineStatus;
use serenity::prelude::{Context, EventHandler};
use tracing::{debug, error, info, warn};

use muster_attendance::RespondError;
use muster_core::config::DiscordConfig;
use muster_core::render::RenderRequest;
use muster_core::types::SubjectId;

use crate::buttons;
use crate::context::MusterContext;
use crate::view;

/// Serenity event handler for countdown messages.
pub struct MusterHandler {
    pub ctx: Arc<MusterContext>,
    pub config: DiscordConfig,
}

#[async_trait]
impl EventHandler for MusterHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        let status = parse_online_status(&self.config.status);
        let activity = self
            .config
            .activity_name
            .as_deref()
            .map(|name| ActivityData::watching(name));
        ctx.set_presence(activity, status);

        info!(name = %ready.user.name, guilds = ready.guilds.len(), "Discord bot connected");

        // `ready` fires again after every reconnect.
        if self.ctx.claim_scheduler_start() {
            let scheduler = self.ctx.scheduler.clone();
            tokio::spawn(async move {
                match scheduler.start().await {
                    Ok(n) => info!(scheduled = n, "countdowns loaded"),
                    Err(e) => {
                        error!(error = %e, "countdown startup load failed, resync will retry")
                    }
                }
            });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Component(component) = interaction {
            handle_component(&self.ctx, &ctx, &component).await;
        }
    }
}

/// Handle one button press.
///
/// The message is edited only with buckets from a successful reconciliation;
/// any failure leaves it as it was and tells the presser privately.
pub async fn handle_component(
    app: &MusterContext,
    ctx: &Context,
    component: &ComponentInteraction,
) {
    let Some(action) = buttons::parse_custom_id(&component.data.custom_id) else {
        debug!(custom_id = %component.data.custom_id, "ignoring foreign component");
        return;
    };

    let interaction_id = component.id.to_string();
    if !app.guard.claim(&interaction_id).await {
        debug!(interaction_id = %interaction_id, "duplicate interaction dropped");
        return;
    }

    if let Err(e) = component
        .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
        .await
    {
        warn!(interaction_id = %interaction_id, error = %e, "failed to acknowledge button");
        return;
    }

    let subject = SubjectId::from(component.user.id.to_string());
    let name = display_name(component);
    let recorded = match app
        .recorder
        .respond(&action.event_id, subject, &name, action.kind)
        .await
    {
        Ok(recorded) => recorded,
        Err(e) => {
            warn!(
                event_id = %action.event_id,
                user = %component.user.id,
                error = %e,
                "button response failed"
            );
            notify(ctx, component, failure_notice(&e)).await;
            return;
        }
    };

    let event = &recorded.event;
    let timezone = event
        .timezone
        .clone()
        .unwrap_or_else(|| app.default_timezone.clone());
    let rendered = app.renderer.render(&RenderRequest {
        event,
        buckets: &recorded.buckets,
        timezone: &timezone,
        finished: event.has_ended(Utc::now()),
    });
    if let Err(e) = component
        .edit_response(&ctx.http, view::edit_interaction(&rendered))
        .await
    {
        warn!(event_id = %event.id, error = %e, "failed to update roster message");
    }
}

async fn notify(ctx: &Context, component: &ComponentInteraction, text: &str) {
    let followup = CreateInteractionResponseFollowup::new()
        .content(text)
        .ephemeral(true);
    if let Err(e) = component.create_followup(&ctx.http, followup).await {
        warn!(error = %e, "failed to send ephemeral notice");
    }
}

fn failure_notice(err: &RespondError) -> &'static str {
    match err {
        RespondError::CircuitOpen => {
            "The roster database is unavailable right now. Your response was not saved, please try again in a minute."
        }
        RespondError::UnknownEvent(_) => "This event no longer exists.",
        RespondError::Reconcile(_) => {
            "Your response was saved, but the roster could not be refreshed. It will update shortly."
        }
        RespondError::EventLookup(_) | RespondError::Write(_) => {
            "Could not record your response. Please try again."
        }
    }
}

/// Server nickname, then global display name, then username.
fn display_name(component: &ComponentInteraction) -> String {
    if let Some(nick) = component.member.as_ref().and_then(|m| m.nick.clone()) {
        return nick;
    }
    component
        .user
        .global_name
        .clone()
        .unwrap_or_else(|| component.user.name.clone())
}

/// Parse a config status string into serenity's `OnlineStatus`.
fn parse_online_status(s: &str) -> OnlineStatus {
    match s.to_lowercase().as_str() {
        "idle" => OnlineStatus::Idle,
        "dnd" | "do_not_disturb" => OnlineStatus::DoNotDisturb,
        "invisible" => OnlineStatus::Invisible,
        _ => OnlineStatus::Online,
    }
}

#[cfg(test)]
mod tests {
    use muster_attendance::ReconcileError;
    use muster_core::types::EventId;

    use super::*;

    #[test]
    fn status_strings_map_to_presence() {
        assert_eq!(parse_online_status("idle"), OnlineStatus::Idle);
        assert_eq!(parse_online_status("DND"), OnlineStatus::DoNotDisturb);
        assert_eq!(parse_online_status("whatever"), OnlineStatus::Online);
    }

    #[test]
    fn saved_but_stale_is_distinguished_from_not_saved() {
        let stale = failure_notice(&RespondError::Reconcile(ReconcileError::CircuitOpen));
        assert!(stale.contains("was saved"));
        assert!(failure_notice(&RespondError::CircuitOpen).contains("not saved"));
        let gone = failure_notice(&RespondError::UnknownEvent(EventId::from("e1")));
        assert!(gone.contains("no longer"));
    }
}
