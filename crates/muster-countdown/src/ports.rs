use async_trait::async_trait;

use muster_core::render::RenderedView;
use muster_core::types::MessageRef;

use crate::error::MessageError;

/// Where rendered views end up. Implemented over serenity in `muster-discord`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Replace the message's embed and controls with `view`.
    ///
    /// Must return [`MessageError::NotFound`] (and only then) when the
    /// message or its channel no longer exists.
    async fn edit_message(
        &self,
        message: &MessageRef,
        view: &RenderedView,
    ) -> Result<(), MessageError>;
}
