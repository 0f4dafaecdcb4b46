use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::{Http, HttpError};
use serenity::model::id::{ChannelId, MessageId};
use tracing::debug;

use muster_core::render::RenderedView;
use muster_core::types::MessageRef;
use muster_countdown::{MessageError, MessageStore};

use crate::view;

/// Discord JSON error codes that mean the target is gone.
const UNKNOWN_CHANNEL: isize = 10003;
const UNKNOWN_MESSAGE: isize = 10008;

/// [`MessageStore`] over Discord's REST client.
///
/// `Http` is independent of the gateway, so one instance survives reconnects.
pub struct SerenityMessageStore {
    http: Arc<Http>,
}

impl SerenityMessageStore {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MessageStore for SerenityMessageStore {
    async fn edit_message(
        &self,
        message: &MessageRef,
        rendered: &RenderedView,
    ) -> Result<(), MessageError> {
        ChannelId::new(message.channel_id)
            .edit_message(
                &self.http,
                MessageId::new(message.message_id),
                view::edit_message(rendered),
            )
            .await
            .map_err(classify)?;
        debug!(message = %message, "countdown message edited");
        Ok(())
    }
}

/// Map a serenity error onto the scheduler's taxonomy: only "gone" is
/// [`MessageError::NotFound`].
pub fn classify(err: serenity::Error) -> MessageError {
    if is_not_found(&err) {
        MessageError::NotFound
    } else {
        MessageError::Other(err.to_string())
    }
}

pub fn is_not_found(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            is_gone(response.status_code.as_u16(), response.error.code)
        }
        _ => false,
    }
}

/// An HTTP status and Discord JSON error code that mean the message is gone.
fn is_gone(status: u16, code: isize) -> bool {
    status == 404 || matches!(code, UNKNOWN_CHANNEL | UNKNOWN_MESSAGE)
}
