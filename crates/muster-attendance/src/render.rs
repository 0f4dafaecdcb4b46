//! Default roster renderer.

use std::fmt::Write as _;

use muster_core::render::{RenderRequest, RenderedView, Renderer, ViewField};
use muster_core::types::RosterEntry;

/// Discord caps embed field values at 1024 characters.
const FIELD_LIMIT: usize = 1024;

const ACTIVE_COLOR: u32 = 0x2ecc71;
const FINISHED_COLOR: u32 = 0x95a5a6;

/// Renders the countdown embed: event times as Discord timestamps (shown in
/// each reader's local zone), one field per response bucket, and the
/// creator in the footer.
#[derive(Debug, Default, Clone)]
pub struct RosterRenderer;

impl Renderer for RosterRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> RenderedView {
        let event = request.event;
        let buckets = request.buckets;
        let start = event.start_time.timestamp();
        let end = event.end_time.timestamp();

        let mut description = event.description.trim().to_string();
        if !description.is_empty() {
            description.push_str("\n\n");
        }
        if request.finished {
            let _ = write!(description, "**Event finished** <t:{end}:f>");
        } else {
            let _ = write!(
                description,
                "**Start:** <t:{start}:F> (<t:{start}:R>)\n**End:** <t:{end}:F>"
            );
        }

        let mut fields = vec![
            bucket_field("Accepted", &buckets.accepted),
            bucket_field("Declined", &buckets.declined),
            bucket_field("Tentative", &buckets.tentative),
        ];
        if event.track_no_response {
            fields.push(bucket_field("No response", &buckets.no_response));
        }

        let mut footer = format!(
            "Times shown in your local zone, published in {}",
            request.timezone
        );
        if let Some(creator) = &event.creator {
            footer = match &creator.board_number {
                Some(board) => format!("Created by {board} {} | {footer}", creator.name),
                None => format!("Created by {} | {footer}", creator.name),
            };
        }

        RenderedView {
            event_id: event.id.clone(),
            content: None,
            title: event.title.clone(),
            description,
            color: if request.finished {
                FINISHED_COLOR
            } else {
                ACTIVE_COLOR
            },
            fields,
            footer: Some(footer),
            image_url: event.image_url.clone(),
            interactive: !request.finished,
        }
    }
}

fn bucket_field(label: &str, entries: &[RosterEntry]) -> ViewField {
    ViewField {
        name: format!("{label} ({})", entries.len()),
        value: roster_lines(entries),
        inline: true,
    }
}

fn roster_line(entry: &RosterEntry) -> String {
    let mut line = String::new();
    if let Some(board) = &entry.board_number {
        let _ = write!(line, "`{board}` ");
    }
    line.push_str(&entry.display_name);
    if let Some(squadron) = &entry.squadron {
        let tag = squadron.designation.as_deref().unwrap_or(&squadron.name);
        let _ = write!(line, " ({tag})");
    }
    line
}

/// One line per entry, cut off with an "and N more" marker before the
/// field limit.
fn roster_lines(entries: &[RosterEntry]) -> String {
    if entries.is_empty() {
        return "-".to_string();
    }
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let line = roster_line(entry);
        let remaining = entries.len() - i - 1;
        // Room for the line itself, a newline, and a worst-case marker.
        let marker_room = if remaining > 0 { 24 } else { 0 };
        if out.len() + line.len() + 1 + marker_room > FIELD_LIMIT {
            let _ = write!(out, "...and {} more", entries.len() - i);
            return out;
        }
        out.push_str(&line);
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}
