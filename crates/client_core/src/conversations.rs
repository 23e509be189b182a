use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use shared::{
    domain::{Conversation, ConversationId, ConversationSummary, Message},
    protocol::MessageExchange,
};
use tokio::{sync::Mutex, task::AbortHandle};
use tracing::{debug, info, warn};

use crate::{
    error::StoreError,
    gateway::{BackendGateway, GatewayError},
};

const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Where a message entry stands relative to the backend: appended locally
/// and still awaiting the server (`Pending`), echoed back by the server
/// (`Confirmed`), or resolved without an answer (`Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEntry {
    pub message: Message,
    pub delivery: DeliveryState,
}

impl MessageEntry {
    fn pending(message: Message) -> Self {
        Self {
            message,
            delivery: DeliveryState::Pending,
        }
    }

    fn confirmed(message: Message) -> Self {
        Self {
            message,
            delivery: DeliveryState::Confirmed,
        }
    }

    fn failed(message: Message) -> Self {
        Self {
            message,
            delivery: DeliveryState::Failed,
        }
    }
}

/// Full view of the one conversation currently open: its title and message
/// log, each entry tagged with its delivery state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationDetail {
    pub id: ConversationId,
    pub title: String,
    pub entries: Vec<MessageEntry>,
}

impl From<Conversation> for ConversationDetail {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id,
            title: conversation.title,
            entries: conversation
                .messages
                .into_iter()
                .map(MessageEntry::confirmed)
                .collect(),
        }
    }
}

/// Result of a send that did not error: either the exchange came back, or a
/// precondition short-circuited the call before any request was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered(MessageExchange),
    Skipped(SendSkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendSkipReason {
    EmptyText,
    NotSelected,
    NothingToRetry,
}

struct SendFlight {
    seq: u64,
    abort: Option<AbortHandle>,
}

enum FlightResolution {
    Delivered(MessageExchange),
    Failed(GatewayError),
    Superseded,
}

struct ConversationState {
    summaries: Vec<ConversationSummary>,
    selected: Option<ConversationDetail>,
    in_flight: HashMap<ConversationId, SendFlight>,
    next_flight_seq: u64,
}

impl ConversationState {
    fn selected_mut(&mut self, conversation_id: ConversationId) -> Option<&mut ConversationDetail> {
        self.selected
            .as_mut()
            .filter(|detail| detail.id == conversation_id)
    }

    fn confirm_exchange(&mut self, conversation_id: ConversationId, exchange: &MessageExchange) {
        if let Some(detail) = self.selected_mut(conversation_id) {
            match detail
                .entries
                .iter()
                .position(|entry| entry.delivery == DeliveryState::Pending)
            {
                Some(index) => {
                    detail.entries[index] =
                        MessageEntry::confirmed(exchange.user_message.clone());
                    detail
                        .entries
                        .insert(index + 1, MessageEntry::confirmed(exchange.ai_message.clone()));
                }
                None => {
                    // Selection was refreshed mid-flight; the canonical pair
                    // still belongs at the end of the log.
                    detail
                        .entries
                        .push(MessageEntry::confirmed(exchange.user_message.clone()));
                    detail
                        .entries
                        .push(MessageEntry::confirmed(exchange.ai_message.clone()));
                }
            }
        }

        if let Some(summary) = self
            .summaries
            .iter_mut()
            .find(|summary| summary.id == conversation_id)
        {
            summary.updated_at = Utc::now();
        }
    }

    fn mark_pending_failed(&mut self, conversation_id: ConversationId) {
        if let Some(detail) = self.selected_mut(conversation_id) {
            if let Some(entry) = detail
                .entries
                .iter_mut()
                .find(|entry| entry.delivery == DeliveryState::Pending)
            {
                entry.delivery = DeliveryState::Failed;
            }
        }
    }
}

/// Owns the conversation summary list and the currently selected detail.
/// All mutation funnels through these operations; reads are snapshots.
///
/// Sends are optimistic: the user's entry lands in the log before any I/O,
/// then a successful response replaces it with the canonical echo plus the
/// assistant reply (net two confirmed entries), while a failure leaves it
/// marked `Failed` for retry or discard. At most one send per conversation
/// is in flight; the gate is enforced here, not in the UI.
pub struct ConversationStore {
    gateway: Arc<dyn BackendGateway>,
    inner: Mutex<ConversationState>,
}

impl ConversationStore {
    pub fn new(gateway: Arc<dyn BackendGateway>) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            inner: Mutex::new(ConversationState {
                summaries: Vec::new(),
                selected: None,
                in_flight: HashMap::new(),
                next_flight_seq: 0,
            }),
        })
    }

    pub async fn summaries(&self) -> Vec<ConversationSummary> {
        self.inner.lock().await.summaries.clone()
    }

    pub async fn selected(&self) -> Option<ConversationDetail> {
        self.inner.lock().await.selected.clone()
    }

    pub async fn selected_id(&self) -> Option<ConversationId> {
        self.inner.lock().await.selected.as_ref().map(|d| d.id)
    }

    /// True while a send against `conversation_id` is outstanding.
    pub async fn is_sending(&self, conversation_id: ConversationId) -> bool {
        self.inner
            .lock()
            .await
            .in_flight
            .contains_key(&conversation_id)
    }

    /// Replaces the local summary list with the server's. On error the
    /// prior list is left untouched.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let summaries = self.gateway.list_conversations().await?;
        let mut state = self.inner.lock().await;
        state.summaries = summaries.clone();
        Ok(summaries)
    }

    /// Creates a conversation and selects it. A blank title falls back to
    /// "New Conversation". The new entry is prepended to the summary list
    /// and the selected detail starts with an empty log.
    pub async fn create_conversation(&self, title: &str) -> Result<ConversationDetail, StoreError> {
        let title = title.trim();
        let title = if title.is_empty() {
            DEFAULT_CONVERSATION_TITLE
        } else {
            title
        };

        let conversation = self.gateway.create_conversation(title).await?;
        info!(conversation_id = %conversation.id, "conversation created");

        let mut state = self.inner.lock().await;
        let summary = conversation.summary();
        let detail = ConversationDetail::from(conversation);
        state.summaries.insert(0, summary);
        state.selected = Some(detail.clone());
        Ok(detail)
    }

    /// Fetches the detail for `conversation_id` and makes it the selection,
    /// discarding whatever was selected before. On error the previous
    /// selection stays in place.
    pub async fn select_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<ConversationDetail, StoreError> {
        let conversation = self.gateway.get_conversation(conversation_id).await?;
        let mut state = self.inner.lock().await;
        let detail = ConversationDetail::from(conversation);
        state.selected = Some(detail.clone());
        Ok(detail)
    }

    /// Deletes on the server first; only a confirmed delete removes the
    /// summary locally and, if it was selected, clears the selection. Any
    /// send still in flight for the conversation is aborted.
    pub async fn delete_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), StoreError> {
        self.gateway.delete_conversation(conversation_id).await?;

        let mut state = self.inner.lock().await;
        if let Some(flight) = state.in_flight.remove(&conversation_id) {
            if let Some(handle) = flight.abort {
                handle.abort();
            }
        }
        state.summaries.retain(|summary| summary.id != conversation_id);
        if state
            .selected
            .as_ref()
            .is_some_and(|detail| detail.id == conversation_id)
        {
            state.selected = None;
        }
        info!(conversation_id = %conversation_id, "conversation deleted");
        Ok(())
    }

    /// Sends `text` against the selected conversation.
    ///
    /// Blank text or a stale `conversation_id` returns `Skipped` without
    /// touching anything. Otherwise the user's entry is appended as
    /// `Pending` and the single-flight gate for the conversation is claimed
    /// before the request goes out; a second send while one is outstanding
    /// fails with `SendInFlight` and leaves no trace. The request itself
    /// runs on a spawned task so `abort_send` can cancel it; resolution
    /// (confirm or mark failed) happens on that task, keyed to this flight,
    /// which keeps a late response from touching state a newer selection or
    /// retry now owns.
    pub async fn send_message(
        self: &Arc<Self>,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<SendOutcome, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SendOutcome::Skipped(SendSkipReason::EmptyText));
        }

        let flight_seq;
        {
            let mut state = self.inner.lock().await;
            if state.selected_mut(conversation_id).is_none() {
                return Ok(SendOutcome::Skipped(SendSkipReason::NotSelected));
            }
            if state.in_flight.contains_key(&conversation_id) {
                return Err(StoreError::SendInFlight(conversation_id));
            }

            flight_seq = state.next_flight_seq;
            state.next_flight_seq += 1;
            state
                .in_flight
                .insert(conversation_id, SendFlight { seq: flight_seq, abort: None });

            // Optimistic append, under the same lock as the gate claim.
            if let Some(detail) = state.selected_mut(conversation_id) {
                detail.entries.push(MessageEntry::pending(Message::user(text)));
            }
        }
        debug!(conversation_id = %conversation_id, "send dispatched");

        let task = tokio::spawn({
            let store = Arc::clone(self);
            let text = text.to_string();
            async move {
                let result = store.gateway.send_message(conversation_id, &text).await;
                store.resolve_send(conversation_id, flight_seq, result).await
            }
        });

        {
            let mut state = self.inner.lock().await;
            if let Some(flight) = state.in_flight.get_mut(&conversation_id) {
                if flight.seq == flight_seq {
                    flight.abort = Some(task.abort_handle());
                }
            }
        }

        match task.await {
            Ok(FlightResolution::Delivered(exchange)) => Ok(SendOutcome::Delivered(exchange)),
            Ok(FlightResolution::Failed(error)) => Err(StoreError::Gateway(error)),
            Ok(FlightResolution::Superseded) => Err(StoreError::SendAborted(conversation_id)),
            Err(join_error) => {
                // Aborted mid-request, or the request task died; either way
                // the flight must not be left holding the gate.
                if !join_error.is_cancelled() {
                    warn!(conversation_id = %conversation_id, %join_error, "send task failed");
                }
                self.finish_dead_flight(conversation_id, flight_seq).await;
                Err(StoreError::SendAborted(conversation_id))
            }
        }
    }

    /// Cancels the in-flight send for `conversation_id`, if any. The
    /// optimistic entry is marked `Failed` and the gate is released; returns
    /// whether there was anything to abort.
    pub async fn abort_send(&self, conversation_id: ConversationId) -> bool {
        let mut state = self.inner.lock().await;
        let Some(flight) = state.in_flight.remove(&conversation_id) else {
            return false;
        };
        if let Some(handle) = flight.abort {
            handle.abort();
        }
        state.mark_pending_failed(conversation_id);
        info!(conversation_id = %conversation_id, "send aborted");
        true
    }

    /// Re-submits the oldest failed entry's text through the normal send
    /// path. The failed entry is removed first; if the gate turns out to be
    /// claimed it is restored so no text is lost.
    pub async fn retry_failed_send(
        self: &Arc<Self>,
        conversation_id: ConversationId,
    ) -> Result<SendOutcome, StoreError> {
        let text = {
            let mut state = self.inner.lock().await;
            if state.in_flight.contains_key(&conversation_id) {
                return Err(StoreError::SendInFlight(conversation_id));
            }
            let Some(detail) = state.selected_mut(conversation_id) else {
                return Ok(SendOutcome::Skipped(SendSkipReason::NotSelected));
            };
            let Some(index) = detail
                .entries
                .iter()
                .position(|entry| entry.delivery == DeliveryState::Failed)
            else {
                return Ok(SendOutcome::Skipped(SendSkipReason::NothingToRetry));
            };
            detail.entries.remove(index).message.content
        };

        match self.send_message(conversation_id, &text).await {
            Err(StoreError::SendInFlight(id)) => {
                // Another send claimed the gate between the two locks;
                // restore the entry rather than dropping its text.
                let mut state = self.inner.lock().await;
                if let Some(detail) = state.selected_mut(id) {
                    detail.entries.push(MessageEntry::failed(Message::user(&text)));
                }
                Err(StoreError::SendInFlight(id))
            }
            outcome => outcome,
        }
    }

    /// Drops every failed entry from the selected conversation's log.
    /// Returns how many were removed.
    pub async fn discard_failed(&self, conversation_id: ConversationId) -> usize {
        let mut state = self.inner.lock().await;
        let Some(detail) = state.selected_mut(conversation_id) else {
            return 0;
        };
        let before = detail.entries.len();
        detail
            .entries
            .retain(|entry| entry.delivery != DeliveryState::Failed);
        before - detail.entries.len()
    }

    /// Runs on the request task once the gateway call finishes. Only the
    /// flight still registered under its own sequence number may touch
    /// state; anything else resolved concurrently (abort, delete) already
    /// cleaned up, so the result is dropped.
    async fn resolve_send(
        &self,
        conversation_id: ConversationId,
        flight_seq: u64,
        result: Result<MessageExchange, GatewayError>,
    ) -> FlightResolution {
        let mut state = self.inner.lock().await;
        let registered = state
            .in_flight
            .get(&conversation_id)
            .is_some_and(|flight| flight.seq == flight_seq);
        if !registered {
            return FlightResolution::Superseded;
        }
        state.in_flight.remove(&conversation_id);

        match result {
            Ok(exchange) => {
                state.confirm_exchange(conversation_id, &exchange);
                debug!(conversation_id = %conversation_id, "send confirmed");
                FlightResolution::Delivered(exchange)
            }
            Err(error) => {
                state.mark_pending_failed(conversation_id);
                warn!(conversation_id = %conversation_id, %error, "send failed");
                FlightResolution::Failed(error)
            }
        }
    }

    /// Cleanup for a flight whose request task never got to resolve itself.
    async fn finish_dead_flight(&self, conversation_id: ConversationId, flight_seq: u64) {
        let mut state = self.inner.lock().await;
        let registered = state
            .in_flight
            .get(&conversation_id)
            .is_some_and(|flight| flight.seq == flight_seq);
        if registered {
            state.in_flight.remove(&conversation_id);
            state.mark_pending_failed(conversation_id);
        }
    }
}

#[cfg(test)]
#[path = "tests/conversations_tests.rs"]
mod tests;
