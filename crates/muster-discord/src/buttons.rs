//! Accept / decline / tentative buttons.
//!
//! Custom ids have the form `muster:<kind>:<event_id>`.

use serenity::builder::{CreateActionRow, CreateButton};
use serenity::model::application::ButtonStyle;

use muster_core::types::{EventId, ResponseKind};

const PREFIX: &str = "muster";

/// A decoded button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonAction {
    pub kind: ResponseKind,
    pub event_id: EventId,
}

fn kind_slug(kind: ResponseKind) -> &'static str {
    match kind {
        ResponseKind::Accepted | ResponseKind::RollCall => "accept",
        ResponseKind::Declined => "decline",
        ResponseKind::Tentative => "tentative",
    }
}

pub fn custom_id(kind: ResponseKind, event_id: &EventId) -> String {
    format!("{PREFIX}:{}:{}", kind_slug(kind), event_id)
}

/// Decode a custom id. Anything not produced by [`custom_id`] yields `None`.
pub fn parse_custom_id(raw: &str) -> Option<ButtonAction> {
    let mut parts = raw.splitn(3, ':');
    if parts.next()? != PREFIX {
        return None;
    }
    let kind = match parts.next()? {
        "accept" => ResponseKind::Accepted,
        "decline" => ResponseKind::Declined,
        "tentative" => ResponseKind::Tentative,
        _ => return None,
    };
    let event_id = parts.next().filter(|id| !id.is_empty())?;
    Some(ButtonAction {
        kind,
        event_id: EventId::from(event_id),
    })
}

/// The row of response buttons attached to an active event message.
pub fn action_row(event_id: &EventId) -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(custom_id(ResponseKind::Accepted, event_id))
            .label("Accept")
            .style(ButtonStyle::Success),
        CreateButton::new(custom_id(ResponseKind::Declined, event_id))
            .label("Decline")
            .style(ButtonStyle::Danger),
        CreateButton::new(custom_id(ResponseKind::Tentative, event_id))
            .label("Tentative")
            .style(ButtonStyle::Secondary),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_ids_round_trip() {
        let id = EventId::from("7f1c2d9e-0000-4000-8000-000000000001");
        for kind in [
            ResponseKind::Accepted,
            ResponseKind::Declined,
            ResponseKind::Tentative,
        ] {
            let parsed = parse_custom_id(&custom_id(kind, &id)).unwrap();
            assert_eq!(parsed.kind, kind);
            assert_eq!(parsed.event_id, id);
        }
    }

    #[test]
    fn event_ids_may_contain_colons() {
        let parsed = parse_custom_id("muster:decline:guild:42").unwrap();
        assert_eq!(parsed.event_id.as_str(), "guild:42");
    }

    #[test]
    fn foreign_ids_are_ignored() {
        assert!(parse_custom_id("other:accept:e1").is_none());
        assert!(parse_custom_id("muster:maybe:e1").is_none());
        assert!(parse_custom_id("muster:accept:").is_none());
        assert!(parse_custom_id("muster:accept").is_none());
        assert!(parse_custom_id("").is_none());
    }
}
