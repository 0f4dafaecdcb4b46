//! [`RenderedView`] → serenity builders.

use serenity::builder::{
    CreateActionRow, CreateEmbed, CreateEmbedFooter, EditInteractionResponse, EditMessage,
};

use muster_core::render::RenderedView;

use crate::buttons;

pub fn embed(view: &RenderedView) -> CreateEmbed {
    let mut e = CreateEmbed::new()
        .title(&view.title)
        .description(&view.description)
        .colour(view.color);
    for field in &view.fields {
        e = e.field(&field.name, &field.value, field.inline);
    }
    if let Some(ref footer) = view.footer {
        e = e.footer(CreateEmbedFooter::new(footer));
    }
    if let Some(ref url) = view.image_url {
        e = e.image(url);
    }
    e
}

/// Button rows for the view. Empty once the event is over, which removes
/// the buttons from the message.
pub fn components(view: &RenderedView) -> Vec<CreateActionRow> {
    if view.interactive {
        vec![buttons::action_row(&view.event_id)]
    } else {
        Vec::new()
    }
}

pub fn edit_message(view: &RenderedView) -> EditMessage {
    let mut edit = EditMessage::new()
        .embed(embed(view))
        .components(components(view));
    if let Some(ref content) = view.content {
        edit = edit.content(content);
    }
    edit
}

/// Same edit, applied through a deferred component interaction.
pub fn edit_interaction(view: &RenderedView) -> EditInteractionResponse {
    let mut edit = EditInteractionResponse::new()
        .embed(embed(view))
        .components(components(view));
    if let Some(ref content) = view.content {
        edit = edit.content(content);
    }
    edit
}
