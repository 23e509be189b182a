use shared::domain::ConversationId;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Failures surfaced by store operations. Optimistic state is never left
/// dangling: by the time one of these reaches the caller the affected entry
/// has been confirmed, marked failed, or rolled back.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a send is already in flight for conversation {0}")]
    SendInFlight(ConversationId),
    #[error("send for conversation {0} was aborted before it resolved")]
    SendAborted(ConversationId),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
