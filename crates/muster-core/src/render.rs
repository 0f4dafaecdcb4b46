//! Render boundary between attendance data and the chat platform.
//!
//! The scheduler and the interaction handler only ever hand a [`Renderer`]
//! fully reconciled buckets. The produced [`RenderedView`] is platform
//! neutral; the Discord crate turns it into an embed plus button rows.

use serde::{Deserialize, Serialize};

use crate::types::{Event, EventId, ResponseBuckets};

/// One embed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Platform-neutral rendering of an event message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedView {
    /// Event the buttons act on.
    pub event_id: EventId,
    /// Plain message text above the embed.
    pub content: Option<String>,
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<ViewField>,
    pub footer: Option<String>,
    pub image_url: Option<String>,
    /// Whether the accept/decline/tentative buttons are attached.
    pub interactive: bool,
}

/// Everything a renderer needs for one pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub event: &'a Event,
    pub buckets: &'a ResponseBuckets,
    pub timezone: &'a str,
    /// The event has concluded: show the finished state and drop controls.
    pub finished: bool,
}

pub trait Renderer: Send + Sync {
    fn render(&self, request: &RenderRequest<'_>) -> RenderedView;
}
