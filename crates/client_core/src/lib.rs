//! Client-side synchronization layer for the assistant's single-page UI:
//! optimistic conversation and task stores reconciled against the backend
//! through a swappable HTTP gateway, plus the two-mode view state.

pub mod conversations;
pub mod error;
pub mod gateway;
pub mod tasks;
pub mod ui_mode;

pub use conversations::{
    ConversationDetail, ConversationStore, DeliveryState, MessageEntry, SendOutcome,
    SendSkipReason,
};
pub use error::StoreError;
pub use gateway::{BackendGateway, GatewayError, HttpBackendGateway};
pub use tasks::{CreateOutcome, TaskStore};
pub use ui_mode::{UiMode, UiModeController};
